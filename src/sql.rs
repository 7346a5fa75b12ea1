use chrono::NaiveDate;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectClassrooms,
    SelectAvailability {
        booking_date: NaiveDate,
        start_time: String,
        end_time: String,
    },
    SelectBooking {
        id: BookingId,
        name: String,
    },
    SelectBookingsByOwner {
        name: String,
    },
    SelectFreeSlots {
        classroom: String,
        booking_date: NaiveDate,
    },
    InsertBooking(NewBooking),
    UpdateBooking {
        id: BookingId,
        name: String,
        patch: BookingPatch,
    },
    DeleteBooking {
        id: BookingId,
        name: String,
    },
}

/// Column order for `INSERT INTO bookings VALUES (...)` without a column list.
const BOOKING_INSERT_COLUMNS: [&str; 5] =
    ["name", "classroom", "booking_date", "start_time", "end_time"];

/// Statement verb and the table it addresses.
#[derive(Debug, PartialEq, Eq)]
pub enum Target {
    Select(String),
    Insert(String),
    Update(String),
    Delete(String),
}

fn parse_statement(sql: &str) -> Result<Statement, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut stmts =
        Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    Ok(stmts.swap_remove(0))
}

/// Resolve the target table without evaluating literals, so `$N`
/// placeholders are accepted anywhere a value may appear.
pub fn parse_target(sql: &str) -> Result<Target, SqlError> {
    match &parse_statement(sql)? {
        Statement::Insert(insert) => Ok(Target::Insert(insert_table_name(insert)?)),
        Statement::Update { table, .. } => Ok(Target::Update(table_factor_name(&table.relation)?)),
        Statement::Delete(delete) => Ok(Target::Delete(delete_table_name(delete)?)),
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => match select.from.first() {
                Some(from) => Ok(Target::Select(table_factor_name(&from.relation)?)),
                None => Err(SqlError::Parse("SELECT without FROM".into())),
            },
            _ => Err(SqlError::Unsupported("non-SELECT query".into())),
        },
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    match &parse_statement(sql)? {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_values(insert)?;

    let columns: Vec<String> = if insert.columns.is_empty() {
        BOOKING_INSERT_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("bookings", columns.len(), values.len()));
    }

    let mut fields = Filters::default();
    for (column, value) in columns.into_iter().zip(values.iter()) {
        if !BOOKING_INSERT_COLUMNS.contains(&column.as_str()) {
            return Err(SqlError::UnknownColumn(column));
        }
        fields.0.push((column, literal_text(value)?));
    }

    Ok(Command::InsertBooking(NewBooking {
        name: fields.require("name")?.to_string(),
        classroom: fields.require("classroom")?.to_string(),
        booking_date: parse_date(fields.require("booking_date")?)?,
        start_time: fields.require("start_time")?.to_string(),
        end_time: fields.require("end_time")?.to_string(),
    }))
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let filters = Filters::from_selection(selection)?;
    let id = parse_id(filters.require("id")?)?;
    let name = filters.require("name")?.to_string();

    let mut patch = BookingPatch::default();
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(col) => object_name_last(col)
                .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        let value = literal_text(&assignment.value)?;
        match column.as_str() {
            "name" => patch.name = Some(value),
            "classroom" => patch.classroom = Some(value),
            "booking_date" => patch.booking_date = Some(parse_date(&value)?),
            "start_time" => patch.start_time = Some(value),
            "end_time" => patch.end_time = Some(value),
            _ => return Err(SqlError::UnknownColumn(column)),
        }
    }

    Ok(Command::UpdateBooking { id, name, patch })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let filters = Filters::from_selection(&delete.selection)?;
    Ok(Command::DeleteBooking {
        id: parse_id(filters.require("id")?)?,
        name: filters.require("name")?.to_string(),
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = Filters::from_selection(&select.selection)?;

    match table.as_str() {
        "classrooms" => Ok(Command::SelectClassrooms),
        "availability" => {
            let date = filters
                .get("booking_date")
                .or_else(|| filters.get("search_date"))
                .ok_or(SqlError::MissingFilter("booking_date"))?;
            let start = filters
                .get("start_time")
                .or_else(|| filters.get("start_time_str"))
                .ok_or(SqlError::MissingFilter("start_time"))?;
            let end = filters
                .get("end_time")
                .or_else(|| filters.get("end_time_str"))
                .ok_or(SqlError::MissingFilter("end_time"))?;
            Ok(Command::SelectAvailability {
                booking_date: parse_date(date)?,
                start_time: start.to_string(),
                end_time: end.to_string(),
            })
        }
        "bookings" => {
            let name = filters.require("name")?.to_string();
            match filters.get("id") {
                Some(id) => Ok(Command::SelectBooking {
                    id: parse_id(id)?,
                    name,
                }),
                None => Ok(Command::SelectBookingsByOwner { name }),
            }
        }
        "free_slots" => Ok(Command::SelectFreeSlots {
            classroom: filters.require("classroom")?.to_string(),
            booking_date: parse_date(filters.require("booking_date")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Filters ───────────────────────────────────────────────────

/// `column = literal` pairs from a WHERE clause joined by AND.
#[derive(Debug, Default)]
struct Filters(Vec<(String, String)>);

impl Filters {
    fn from_selection(selection: &Option<Expr>) -> Result<Self, SqlError> {
        let mut filters = Filters::default();
        if let Some(expr) = selection {
            filters.collect(expr)?;
        }
        Ok(filters)
    }

    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::And,
                right,
            } => {
                self.collect(left)?;
                self.collect(right)
            }
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => {
                let column = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
                self.0.push((column, literal_text(right)?));
                Ok(())
            }
            Expr::Nested(inner) => self.collect(inner),
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, column: &'static str) -> Result<&str, SqlError> {
        self.get(column).ok_or(SqlError::MissingFilter(column))
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.len() {
            0 => Err(SqlError::Parse("empty VALUES".into())),
            1 => Ok(values.rows[0].clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// Text of a string or numeric literal.
fn literal_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(Value::Null) => Err(SqlError::Parse("NULL is not allowed here".into())),
        Some(value) => Err(SqlError::Parse(format!("expected literal, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_id(raw: &str) -> Result<BookingId, SqlError> {
    raw.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad booking id {raw:?}: {e}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, SqlError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| SqlError::Parse(format!("bad date {raw:?} (expected YYYY-MM-DD): {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
