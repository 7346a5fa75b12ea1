use std::net::SocketAddr;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use classbook::engine::{Clock, Engine};
use classbook::wire;

const PASSWORD: &str = "classbook";
const TOMORROW: &str = "2026-10-17";

// ── Test infrastructure ──────────────────────────────────────

fn pinned_engine() -> Arc<Engine> {
    let now = NaiveDate::from_ymd_opt(2026, 10, 16)
        .unwrap()
        .and_hms_opt(12, 10, 0)
        .unwrap();
    Arc::new(Engine::with_clock(Clock::Fixed(now)))
}

async fn start_test_server(engine: Arc<Engine>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, PASSWORD.to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("classbook")
        .user("lee")
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap_or_else(|e| panic!("{sql}: {e}"))
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

/// SQLSTATE of a statement that is expected to fail.
async fn sqlstate(client: &tokio_postgres::Client, sql: &str) -> String {
    let err = client
        .simple_query(sql)
        .await
        .err()
        .unwrap_or_else(|| panic!("expected {sql} to fail"));
    err.code()
        .map(|c| c.code().to_string())
        .unwrap_or_else(|| panic!("no SQLSTATE on {err}"))
}

fn insert_sql(name: &str, classroom: &str, date: &str, start: &str, end: &str) -> String {
    format!(
        "INSERT INTO bookings (name, classroom, booking_date, start_time, end_time) \
         VALUES ('{name}', '{classroom}', '{date}', '{start}', '{end}')"
    )
}

async fn book(
    client: &tokio_postgres::Client,
    name: &str,
    classroom: &str,
    start: &str,
    end: &str,
) -> SimpleQueryRow {
    let mut created = rows(client, &insert_sql(name, classroom, TOMORROW, start, end)).await;
    assert_eq!(created.len(), 1);
    created.remove(0)
}

fn id_of(row: &SimpleQueryRow) -> u32 {
    row.get("id").unwrap().parse().unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn lists_all_classrooms_in_order() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    let classrooms = rows(&client, "SELECT * FROM classrooms").await;
    assert_eq!(classrooms.len(), 48);
    assert_eq!(classrooms[0].get(0), Some("A101"));
    assert_eq!(classrooms[47].get(0), Some("C404"));
}

#[tokio::test]
async fn create_returns_row_and_can_be_read_back() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    let created = book(&client, "Lee", "a401", "08:00", "09:30").await;
    let id = id_of(&created);
    assert!((10_000_000..=99_999_999).contains(&id));
    assert_eq!(created.get("classroom"), Some("A401"));
    assert_eq!(created.get("booking_date"), Some(TOMORROW));
    assert_eq!(created.get("start_time"), Some("08:00"));
    assert_eq!(created.get("end_time"), Some("09:30"));

    let fetched = rows(
        &client,
        &format!("SELECT * FROM bookings WHERE id = {id} AND name = 'lee'"),
    )
    .await;
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].get("name"), Some("Lee"));

    let state = sqlstate(
        &client,
        &format!("SELECT * FROM bookings WHERE id = {id} AND name = 'Sami'"),
    )
    .await;
    assert_eq!(state, "42501");
    let state = sqlstate(&client, "SELECT * FROM bookings WHERE id = 1 AND name = 'Lee'").await;
    assert_eq!(state, "P0002");
}

#[tokio::test]
async fn bound_parameters_are_stored_verbatim() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    let name = "Lee$1 O'Brien $2";
    let created = client
        .query(
            "INSERT INTO bookings (name, classroom, booking_date, start_time, end_time) \
             VALUES ($1, $2, $3, $4, $5)",
            &[&name, &"A401", &TOMORROW, &"08:00", &"09:30"],
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    let id: i64 = created[0].get("id");
    assert!((10_000_000..=99_999_999).contains(&id));
    assert_eq!(created[0].get::<_, &str>("name"), name);
    assert_eq!(created[0].get::<_, &str>("classroom"), "A401");

    let fetched = client
        .query(
            "SELECT * FROM bookings WHERE id = $1 AND name = $2",
            &[&id.to_string(), &name],
        )
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].get::<_, i64>("id"), id);
    assert_eq!(fetched[0].get::<_, &str>("start_time"), "08:00");

    // Only the one booking exists; the injected text did not add rows.
    let owned = rows(&client, "SELECT * FROM bookings WHERE name = 'Lee$1 O''Brien $2'").await;
    assert_eq!(owned.len(), 1);
}

#[tokio::test]
async fn overlapping_insert_is_a_conflict() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    book(&client, "Lee", "A401", "08:00", "09:30").await;
    let state = sqlstate(
        &client,
        &insert_sql("Sami", "A401", TOMORROW, "09:00", "10:00"),
    )
    .await;
    assert_eq!(state, "23P01");

    // Touching end-to-start is not an overlap.
    book(&client, "Sami", "A401", "09:30", "10:30").await;
}

#[tokio::test]
async fn invalid_requests_map_to_sqlstates() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    let cases = [
        insert_sql("Lee", "A401", TOMORROW, "07:15", "08:15"),
        insert_sql("Lee", "A401", TOMORROW, "06:00", "07:30"),
        insert_sql("Lee", "A401", TOMORROW, "08:00", "08:30"),
        insert_sql("Lee", "A401", TOMORROW, "8am", "9am"),
        insert_sql("Lee", "Z999", TOMORROW, "08:00", "09:00"),
        insert_sql("Lee", "A401", "2026-10-15", "08:00", "09:00"),
        insert_sql("", "A401", TOMORROW, "08:00", "09:00"),
    ];
    for sql in &cases {
        assert_eq!(sqlstate(&client, sql).await, "22023", "{sql}");
    }

    assert_eq!(sqlstate(&client, "SELECT * FROM rooms").await, "42601");
    assert_eq!(sqlstate(&client, "DROP TABLE bookings").await, "42601");
}

#[tokio::test]
async fn availability_reports_every_classroom() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    book(&client, "Lee", "A401", "08:00", "09:30").await;
    let report = rows(
        &client,
        &format!(
            "SELECT * FROM availability WHERE booking_date = '{TOMORROW}' \
             AND start_time = '09:00' AND end_time = '10:00'"
        ),
    )
    .await;
    assert_eq!(report.len(), 48);
    let a401 = report
        .iter()
        .find(|r| r.get("classroom") == Some("A401"))
        .unwrap();
    assert_eq!(a401.get("available"), Some("f"));
    let free = report.iter().filter(|r| r.get("available") == Some("t")).count();
    assert_eq!(free, 47);

    let state = sqlstate(
        &client,
        "SELECT * FROM availability WHERE booking_date = '2026-10-15' \
         AND start_time = '09:00' AND end_time = '10:00'",
    )
    .await;
    assert_eq!(state, "22023");
}

#[tokio::test]
async fn update_then_delete_lifecycle() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    let id = id_of(&book(&client, "Lee", "B204", "10:00", "11:00").await);
    book(&client, "Sami", "B204", "12:00", "13:00").await;

    let updated = rows(
        &client,
        &format!("UPDATE bookings SET end_time = '12:00' WHERE id = {id} AND name = 'Lee'"),
    )
    .await;
    assert_eq!(updated[0].get("start_time"), Some("10:00"));
    assert_eq!(updated[0].get("end_time"), Some("12:00"));

    let state = sqlstate(
        &client,
        &format!("UPDATE bookings SET end_time = '12:30' WHERE id = {id} AND name = 'Lee'"),
    )
    .await;
    assert_eq!(state, "23P01");

    let state = sqlstate(
        &client,
        &format!("DELETE FROM bookings WHERE id = {id} AND name = 'Sami'"),
    )
    .await;
    assert_eq!(state, "42501");

    client
        .simple_query(&format!("DELETE FROM bookings WHERE id = {id} AND name = 'LEE'"))
        .await
        .unwrap();
    let state = sqlstate(
        &client,
        &format!("SELECT * FROM bookings WHERE id = {id} AND name = 'Lee'"),
    )
    .await;
    assert_eq!(state, "P0002");
}

#[tokio::test]
async fn owner_listing_and_free_slots() {
    let addr = start_test_server(pinned_engine()).await;
    let client = connect(addr).await;

    book(&client, "Lee", "C301", "13:00", "14:00").await;
    book(&client, "Lee", "A401", "08:00", "09:30").await;
    book(&client, "Sami", "A401", "12:00", "17:30").await;

    let mine = rows(&client, "SELECT * FROM bookings WHERE name = 'lee'").await;
    let starts: Vec<_> = mine.iter().map(|r| r.get("start_time").unwrap()).collect();
    assert_eq!(starts, vec!["08:00", "13:00"]);

    let slots = rows(
        &client,
        &format!("SELECT * FROM free_slots WHERE classroom = 'a401' AND booking_date = '{TOMORROW}'"),
    )
    .await;
    let windows: Vec<_> = slots
        .iter()
        .map(|r| (r.get("start_time").unwrap(), r.get("end_time").unwrap()))
        .collect();
    assert_eq!(windows, vec![("07:00", "08:00"), ("09:30", "12:00")]);
    assert!(slots.iter().all(|r| r.get("classroom") == Some("A401")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_admit_one_booking_per_slot() {
    let engine = pinned_engine();
    let addr = start_test_server(engine.clone()).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        handles.push(tokio::spawn(async move {
            let client = connect(addr).await;
            client
                .simple_query(&insert_sql(
                    &format!("user{i}"),
                    "C404",
                    TOMORROW,
                    "14:00",
                    "15:30",
                ))
                .await
                .is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(engine.booking_count(), 1);
}
