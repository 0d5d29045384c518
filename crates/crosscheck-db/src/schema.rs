//! Table definitions for fresh installations and test databases.
//!
//! Production tables are usually created by the plant's line software; the
//! agent only needs the columns below. Names come from settings and are
//! quoted like every other statement.

use sqlx::PgConnection;

use crosscheck_core::config::DatabaseSettings;
use crosscheck_types::StatCounter;

use crate::error::DbError;
use crate::ident::{qualified, quote_ident};

/// Create the schema and both tables if they do not exist.
///
/// # Errors
///
/// Returns [`DbError::Postgres`] if any DDL statement fails.
pub async fn ensure_tables(
    conn: &mut PgConnection,
    settings: &DatabaseSettings,
) -> Result<(), DbError> {
    if !settings.schema.trim().is_empty() {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&settings.schema));
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    for sql in create_table_statements(settings) {
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    tracing::info!(
        item_log = %settings.item_log_table,
        daily_stats = %settings.daily_stats_table,
        "Ensured item log and daily statistics tables"
    );
    Ok(())
}

/// `CREATE TABLE IF NOT EXISTS` for the item log and statistics tables.
pub fn create_table_statements(settings: &DatabaseSettings) -> [String; 2] {
    let item_log = qualified(&settings.schema, &settings.item_log_table);
    let daily_stats = qualified(&settings.schema, &settings.daily_stats_table);

    let item_log_sql = format!(
        "CREATE TABLE IF NOT EXISTS {item_log} (
            id                BIGSERIAL PRIMARY KEY,
            date_time_stamp   TIMESTAMP(0) NOT NULL,
            sku               TEXT,
            pallet_number     INTEGER,
            ocr_description_1 TEXT,
            quantity          INTEGER,
            batch_number      TEXT,
            barcode           TEXT,
            ocr_description_2 TEXT,
            cross_check       BOOLEAN NOT NULL DEFAULT false,
            label_printed     BOOLEAN NOT NULL DEFAULT false,
            label_applied     BOOLEAN NOT NULL DEFAULT false,
            check_scan_result TEXT,
            valid             BOOLEAN NOT NULL DEFAULT false,
            sent              BOOLEAN NOT NULL DEFAULT false,
            image_sent        BOOLEAN NOT NULL DEFAULT false,
            duplicate         BOOLEAN NOT NULL DEFAULT false,
            complete          BOOLEAN NOT NULL DEFAULT false
        )"
    );

    let counters = StatCounter::ALL
        .iter()
        .map(|c| format!("{} BIGINT NOT NULL DEFAULT 0", c.column()))
        .collect::<Vec<_>>()
        .join(",\n            ");
    let daily_stats_sql = format!(
        "CREATE TABLE IF NOT EXISTS {daily_stats} (
            stat_date DATE PRIMARY KEY,
            {counters}
        )"
    );

    [item_log_sql, daily_stats_sql]
}
