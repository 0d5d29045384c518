//! Integration tests for the `crosscheck-db` data layer.
//!
//! These tests require a live `PostgreSQL` instance. Run with:
//!
//! ```bash
//! docker run -d --name crosscheck-pg -p 5432:5432 \
//!     -e POSTGRES_USER=crosscheck -e POSTGRES_PASSWORD=crosscheck_dev \
//!     -e POSTGRES_DB=crosscheck postgres:16
//! cargo test -p crosscheck-db -- --ignored
//! ```
//!
//! Every test creates its own uniquely named tables and drops them at the
//! end, so tests can run in parallel against one database.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use chrono::{NaiveDate, NaiveDateTime};
use crosscheck_core::config::{DatabaseSettings, Settings};
use crosscheck_core::forwarder::{CycleOutcome, Forwarder};
use crosscheck_core::materializer::Materializer;
use crosscheck_core::settings::SettingsCell;
use crosscheck_core::store::ForwardingStore;
use crosscheck_db::ident::qualified;
use crosscheck_db::schema::ensure_tables;
use crosscheck_db::{ConnectionProvider, DailyStatsStore, ItemLogStore, PgForwardingStore};
use crosscheck_types::{DailyStats, ItemLogRecord};
use sqlx::{Connection, PgConnection};

// =============================================================================
// Helpers
// =============================================================================

fn settings(test: &str) -> DatabaseSettings {
    DatabaseSettings {
        server: "localhost".to_owned(),
        port: 5432,
        database_name: "crosscheck".to_owned(),
        username: "crosscheck".to_owned(),
        password: "crosscheck_dev".to_owned(),
        schema: "public".to_owned(),
        item_log_table: format!("item_log_{test}_{}", std::process::id()),
        daily_stats_table: format!("daily_stats_{test}_{}", std::process::id()),
        connect_timeout_ms: 5_000,
    }
}

async fn setup(test: &str) -> (DatabaseSettings, PgConnection) {
    let db = settings(test);
    let mut conn = ConnectionProvider::new(&db)
        .open()
        .await
        .expect("Failed to connect to PostgreSQL -- is it running?");
    ensure_tables(&mut conn, &db)
        .await
        .expect("Failed to create tables");
    (db, conn)
}

async fn teardown(db: &DatabaseSettings, mut conn: PgConnection) {
    for table in [&db.item_log_table, &db.daily_stats_table] {
        let sql = format!("DROP TABLE IF EXISTS {}", qualified(&db.schema, table));
        sqlx::query(&sql).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
}

async fn insert(conn: &mut PgConnection, db: &DatabaseSettings, r: &ItemLogRecord) {
    let sql = format!(
        "INSERT INTO {} (id, date_time_stamp, sku, pallet_number, ocr_description_1, quantity, \
         batch_number, barcode, ocr_description_2, cross_check, label_printed, label_applied, \
         check_scan_result, valid, sent, image_sent, duplicate, complete) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        qualified(&db.schema, &db.item_log_table)
    );
    sqlx::query(&sql)
        .bind(r.id)
        .bind(r.date_time_stamp)
        .bind(&r.sku)
        .bind(r.pallet_number)
        .bind(&r.ocr_description_1)
        .bind(r.quantity)
        .bind(&r.batch_number)
        .bind(&r.barcode)
        .bind(&r.ocr_description_2)
        .bind(r.cross_check)
        .bind(r.label_printed)
        .bind(r.label_applied)
        .bind(&r.check_scan_result)
        .bind(r.valid)
        .bind(r.sent)
        .bind(r.image_sent)
        .bind(r.duplicate)
        .bind(r.complete)
        .execute(conn)
        .await
        .expect("Failed to insert item log row");
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    jan(day).and_hms_opt(hour, minute, 0).unwrap()
}

// =============================================================================
// Selection and marking
// =============================================================================

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn selection_returns_lowest_unsent_id() {
    let (db, mut conn) = setup("select").await;
    let mut sent = ItemLogRecord::new(1, at(1, 8, 0));
    sent.sent = true;
    insert(&mut conn, &db, &sent).await;
    for id in [7, 3, 5] {
        insert(&mut conn, &db, &ItemLogRecord::new(id, at(1, 8, 0))).await;
    }

    let row = PgForwardingStore::new()
        .select_oldest_unsent(&db)
        .await
        .unwrap()
        .expect("expected a row");
    assert_eq!(row.id, 3);
    assert!(!row.sent);

    teardown(&db, conn).await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn selection_skips_rows_locked_by_another_session() {
    let (db, mut conn) = setup("locked").await;
    for id in [1, 2] {
        insert(&mut conn, &db, &ItemLogRecord::new(id, at(1, 8, 0))).await;
    }

    let mut tx = conn.begin().await.unwrap();
    let lock = format!(
        "SELECT id FROM {} WHERE id = 1 FOR UPDATE",
        qualified(&db.schema, &db.item_log_table)
    );
    sqlx::query(&lock).execute(&mut *tx).await.unwrap();

    let row = PgForwardingStore::new()
        .select_oldest_unsent(&db)
        .await
        .unwrap()
        .expect("expected the unlocked row");
    assert_eq!(row.id, 2);

    tx.rollback().await.unwrap();
    let row = PgForwardingStore::new()
        .select_oldest_unsent(&db)
        .await
        .unwrap()
        .expect("expected the released row");
    assert_eq!(row.id, 1);

    teardown(&db, conn).await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn concurrent_marks_have_exactly_one_winner() {
    let (db, mut conn) = setup("race").await;
    insert(&mut conn, &db, &ItemLogRecord::new(42, at(1, 8, 0))).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { PgForwardingStore::new().mark_sent(&db, 42).await })
        })
        .collect();
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }
    assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);

    let row = ItemLogStore::new(&mut conn, &db).get(42).await.unwrap().unwrap();
    assert!(row.sent);
    assert!(!PgForwardingStore::new().mark_sent(&db, 404).await.unwrap());

    teardown(&db, conn).await;
}

// =============================================================================
// Daily statistics
// =============================================================================

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn refresh_matches_in_memory_tally() {
    let (db, mut conn) = setup("stats").await;

    let mut rows = Vec::new();
    let mut a = ItemLogRecord::new(1, at(1, 0, 0));
    a.sku = Some("SKU1".to_owned());
    a.ocr_description_1 = Some("LOT1".to_owned());
    a.ocr_description_2 = Some(String::new());
    a.cross_check = true;
    a.check_scan_result = Some("OK".to_owned());
    a.valid = true;
    a.sent = true;
    rows.push(a);
    let mut b = ItemLogRecord::new(2, at(1, 23, 59));
    b.pallet_number = Some(4);
    b.quantity = Some(12);
    b.check_scan_result = Some(String::new());
    b.duplicate = true;
    rows.push(b);
    let mut c = ItemLogRecord::new(3, at(2, 0, 0));
    c.sku = Some("next day".to_owned());
    rows.push(c);
    for row in &rows {
        insert(&mut conn, &db, row).await;
    }

    let written = PgForwardingStore::new()
        .refresh_daily_stats(&db, jan(1))
        .await
        .unwrap();
    assert_eq!(written, 1);

    let stored = DailyStatsStore::new(&mut conn, &db)
        .load(jan(1))
        .await
        .unwrap()
        .expect("stats row should exist");
    assert_eq!(stored, DailyStats::tally(jan(1), &rows));

    teardown(&db, conn).await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn refresh_is_idempotent_and_zero_fills_empty_days() {
    let (db, mut conn) = setup("idem").await;
    let rows = [ItemLogRecord::new(1, at(1, 9, 0))];
    insert(&mut conn, &db, &rows[0]).await;

    let store = PgForwardingStore::new();
    store.refresh_daily_stats(&db, jan(1)).await.unwrap();
    store.refresh_daily_stats(&db, jan(1)).await.unwrap();
    store.refresh_daily_stats(&db, jan(5)).await.unwrap();

    let mut stats = DailyStatsStore::new(&mut conn, &db);
    assert_eq!(
        stats.load(jan(1)).await.unwrap().unwrap(),
        DailyStats::tally(jan(1), &rows)
    );
    assert_eq!(stats.load(jan(5)).await.unwrap().unwrap(), DailyStats::empty(jan(5)));
    assert!(stats.load(jan(9)).await.unwrap().is_none());

    teardown(&db, conn).await;
}

// =============================================================================
// Full cycle
// =============================================================================

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn forwarder_delivers_through_postgres() {
    let (db, mut conn) = setup("cycle").await;
    let mut row = ItemLogRecord::new(1, at(1, 10, 0));
    row.sku = Some("A,B".to_owned());
    insert(&mut conn, &db, &row).await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.database = db.clone();
    settings.upload_service.csv_output_folder = dir.path().to_path_buf();

    let mut forwarder = Forwarder::new(
        PgForwardingStore::new(),
        Materializer::new(),
        SettingsCell::new(settings.clone()),
    )
    .with_clock(|| jan(1));

    let outcome = forwarder.run_cycle(&settings).await;
    assert!(matches!(outcome, CycleOutcome::Delivered { id: 1, stats_refreshed: true, .. }));
    assert!(matches!(forwarder.run_cycle(&settings).await, CycleOutcome::Idle));

    let content =
        std::fs::read_to_string(dir.path().join("record_1_20240101_100000.csv")).unwrap();
    assert!(content.starts_with("1,2024-01-01T10:00:00,\"A,B\","));

    let mut items = ItemLogStore::new(&mut conn, &db);
    assert_eq!(items.count_unsent().await.unwrap(), 0);
    let stats = DailyStatsStore::new(&mut conn, &db)
        .load(jan(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.get(crosscheck_types::StatCounter::SentCount), 1);

    teardown(&db, conn).await;
}
