use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::ClassbookAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, SqlError, Target};

pub struct ClassbookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<ClassbookQueryParser>,
}

impl ClassbookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(ClassbookQueryParser),
        }
    }

    /// Parse, execute and record RED metrics for one statement.
    async fn run(&self, sql: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::SelectClassrooms => {
                let schema = Arc::new(classrooms_schema(format));
                let rows: Vec<PgWireResult<_>> = engine
                    .list_classrooms()
                    .iter()
                    .map(|classroom| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&classroom.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                )))
            }
            Command::SelectAvailability {
                booking_date,
                start_time,
                end_time,
            } => {
                let report = engine
                    .search_availability(booking_date, &start_time, &end_time)
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema(format));
                let available = report.available_classrooms.iter().map(|c| (c, true));
                let unavailable = report.unavailable_classrooms.iter().map(|c| (c, false));
                let rows: Vec<PgWireResult<_>> = available
                    .chain(unavailable)
                    .map(|(classroom, free)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&classroom.to_string())?;
                        encoder.encode_field(&free)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                )))
            }
            Command::SelectBooking { id, name } => {
                let booking = engine.get_booking(id, &name).map_err(engine_err)?;
                bookings_response(&[booking], format)
            }
            Command::SelectBookingsByOwner { name } => {
                bookings_response(&engine.bookings_for(&name), format)
            }
            Command::SelectFreeSlots {
                classroom,
                booking_date,
            } => {
                let free = engine
                    .free_slots(&classroom, booking_date)
                    .map_err(engine_err)?;
                let schema = Arc::new(slot_schema(format));
                let room = free.classroom.to_string();
                let rows: Vec<PgWireResult<_>> = free
                    .slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&room)?;
                        encoder.encode_field(&slot.start.format(TIME_FORMAT).to_string())?;
                        encoder.encode_field(&slot.end.format(TIME_FORMAT).to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                )))
            }
            Command::InsertBooking(request) => {
                let booking = engine.create_booking(request).await.map_err(engine_err)?;
                bookings_response(&[booking], format)
            }
            Command::UpdateBooking { id, name, patch } => {
                let booking = engine
                    .update_booking(id, &name, patch)
                    .await
                    .map_err(engine_err)?;
                bookings_response(&[booking], format)
            }
            Command::DeleteBooking { id, name } => {
                engine.delete_booking(id, &name).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
        }
    }
}

fn bookings_response(bookings: &[Booking], format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(booking_schema(format));
    let rows: Vec<PgWireResult<_>> = bookings
        .iter()
        .map(|b| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&i64::from(b.id))?;
            encoder.encode_field(&b.name)?;
            encoder.encode_field(&b.classroom)?;
            encoder.encode_field(&b.booking_date.format(DATE_FORMAT).to_string())?;
            encoder.encode_field(&b.start_time.format(TIME_FORMAT).to_string())?;
            encoder.encode_field(&b.end_time.format(TIME_FORMAT).to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

// ── Schemas ──────────────────────────────────────────────────────

/// Field list with each column in the format the client asked for.
fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn classrooms_schema(format: &Format) -> Vec<FieldInfo> {
    fields(&[("classroom", Type::VARCHAR)], format)
}

fn availability_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[("classroom", Type::VARCHAR), ("available", Type::BOOL)],
        format,
    )
}

fn booking_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::INT8),
            ("name", Type::VARCHAR),
            ("classroom", Type::VARCHAR),
            ("booking_date", Type::VARCHAR),
            ("start_time", Type::VARCHAR),
            ("end_time", Type::VARCHAR),
        ],
        format,
    )
}

fn slot_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("classroom", Type::VARCHAR),
            ("start_time", Type::VARCHAR),
            ("end_time", Type::VARCHAR),
        ],
        format,
    )
}

/// Result columns for a statement that may still hold `$N` placeholders,
/// chosen by the table the statement targets.
fn schema_for_sql(sql: &str, format: &Format) -> Vec<FieldInfo> {
    match sql::parse_target(sql) {
        Ok(Target::Select(table)) => match table.as_str() {
            "classrooms" => classrooms_schema(format),
            "availability" => availability_schema(format),
            "bookings" => booking_schema(format),
            "free_slots" => slot_schema(format),
            _ => vec![],
        },
        Ok(Target::Insert(table)) | Ok(Target::Update(table)) if table == "bookings" => {
            booking_schema(format)
        }
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for ClassbookHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ClassbookQueryParser;

#[async_trait]
impl QueryParser for ClassbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_sql(
            stmt,
            column_format.unwrap_or(&Format::UnifiedText),
        ))
    }
}

#[async_trait]
impl ExtendedQueryHandler for ClassbookHandler {
    type Statement = String;
    type QueryParser = ClassbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = bind_params(&portal.statement.statement, &portal.parameters);
        self.run(&sql, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_sql(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_sql(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Byte range and 1-based index of every `$N` placeholder outside quoted
/// literals and identifiers.
fn placeholders(sql: &str) -> Vec<(Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                // Doubled quotes re-enter the literal on the next pass.
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'$' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start..i, n));
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql)
        .into_iter()
        .map(|(_, n)| n)
        .max()
        .unwrap_or(0)
}

/// Inline bound text parameters as quoted literals in one pass over the
/// template, so parameter text is never rescanned.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut bound = String::with_capacity(sql.len());
    let mut copied = 0;
    for (range, n) in placeholders(sql) {
        bound.push_str(&sql[copied..range.start]);
        match params.get(n - 1) {
            Some(Some(value)) => {
                bound.push('\'');
                bound.push_str(&String::from_utf8_lossy(value.as_ref()).replace('\'', "''"));
                bound.push('\'');
            }
            Some(None) => bound.push_str("NULL"),
            // Unbound: leave the token for the parser to reject.
            None => bound.push_str(&sql[range.clone()]),
        }
        copied = range.end;
    }
    bound.push_str(&sql[copied..]);
    bound
}

// ── Factory ──────────────────────────────────────────────────────

pub struct ClassbookFactory {
    handler: Arc<ClassbookHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<ClassbookAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl ClassbookFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        Self {
            handler: Arc::new(ClassbookHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                ClassbookAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ClassbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(ClassbookFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[&str]) -> Vec<Option<Vec<u8>>> {
        values.iter().map(|v| Some(v.as_bytes().to_vec())).collect()
    }

    #[test]
    fn count_params_finds_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM classrooms"), 0);
        assert_eq!(
            count_params("SELECT * FROM bookings WHERE id = $2 AND name = $1"),
            2
        );
        assert_eq!(count_params("INSERT INTO bookings VALUES ($1, $2, $3, $4, $10)"), 10);
        assert_eq!(count_params("SELECT '$'"), 0);
        assert_eq!(count_params("SELECT * FROM bookings WHERE name = '$7'"), 0);
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let sql = "INSERT INTO bookings VALUES ($1, $2, $3, $4, $5)";
        let params = text(&["A401", "Lee$1", "2026-10-17", "08:00", "09:30"]);
        assert_eq!(
            bind_params(sql, &params),
            "INSERT INTO bookings VALUES ('A401', 'Lee$1', '2026-10-17', '08:00', '09:30')"
        );
    }

    #[test]
    fn bound_values_are_quoted() {
        let sql = "SELECT * FROM bookings WHERE name = $1";
        assert_eq!(
            bind_params(sql, &text(&["O'Brien $1 '); DROP"])),
            "SELECT * FROM bookings WHERE name = 'O''Brien $1 ''); DROP'"
        );
    }

    #[test]
    fn two_digit_placeholders_bind_whole() {
        let sql = "SELECT $1, $10";
        let mut params = text(&["a"; 10]);
        params[9] = Some(b"j".to_vec());
        assert_eq!(bind_params(sql, &params), "SELECT 'a', 'j'");
    }

    #[test]
    fn placeholders_inside_literals_are_left_alone() {
        let sql = "SELECT * FROM bookings WHERE name = 'it''s $1' AND id = $1";
        assert_eq!(
            bind_params(sql, &text(&["7"])),
            "SELECT * FROM bookings WHERE name = 'it''s $1' AND id = '7'"
        );
    }

    #[test]
    fn null_and_missing_parameters() {
        let params: Vec<Option<Vec<u8>>> = vec![None];
        assert_eq!(bind_params("SELECT $1, $2", &params), "SELECT NULL, $2");
    }

    #[test]
    fn schema_follows_target_table() {
        let text = Format::UnifiedText;
        assert_eq!(schema_for_sql("SELECT * FROM classrooms", &text).len(), 1);
        assert_eq!(
            schema_for_sql("select * from availability where booking_date = $1", &text).len(),
            2
        );
        assert_eq!(
            schema_for_sql(
                "INSERT INTO bookings (name, classroom, booking_date, start_time, end_time) VALUES ($1, $2, $3, $4, $5)",
                &text
            )
            .len(),
            6
        );
        assert_eq!(
            schema_for_sql("SELECT * FROM free_slots WHERE classroom = $1", &text).len(),
            3
        );
        assert!(schema_for_sql("DELETE FROM bookings WHERE id = $1", &text).is_empty());
    }

    #[test]
    fn schema_ignores_table_names_in_literals() {
        let text = Format::UnifiedText;
        let sql = "SELECT * FROM bookings WHERE id = $1 AND name = 'free_slots'";
        assert_eq!(schema_for_sql(sql, &text).len(), 6);
        let sql = "UPDATE bookings SET classroom = 'availability' WHERE id = $1 AND name = $2";
        assert_eq!(schema_for_sql(sql, &text).len(), 6);
    }

    #[test]
    fn engine_errors_keep_their_sqlstate() {
        let err = engine_err(EngineError::Conflict(12_345_678));
        let rendered = format!("{err:?}");
        assert!(rendered.contains("23P01"), "{rendered}");
        assert!(rendered.contains("12345678"), "{rendered}");
    }
}
