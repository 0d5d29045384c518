//! Daily statistics recomputation.
//!
//! A refresh is one statement: every counter is a filtered aggregate over
//! the item log rows stamped on the requested day, and the result is
//! upserted on `stat_date`. Counters are never incremented in place, so a
//! refresh can be repeated or run concurrently without drift.

use chrono::NaiveDate;
use sqlx::{PgConnection, Row};

use crosscheck_core::config::DatabaseSettings;
use crosscheck_types::{DailyStats, StatCounter};

use crate::error::DbError;
use crate::ident::qualified;

/// Operations on the daily statistics table.
pub struct DailyStatsStore<'c> {
    conn: &'c mut PgConnection,
    item_log: String,
    daily_stats: String,
}

impl<'c> DailyStatsStore<'c> {
    /// Bind a store to an open connection and the configured tables.
    pub fn new(conn: &'c mut PgConnection, settings: &DatabaseSettings) -> Self {
        Self {
            conn,
            item_log: qualified(&settings.schema, &settings.item_log_table),
            daily_stats: qualified(&settings.schema, &settings.daily_stats_table),
        }
    }

    /// Recompute and upsert the statistics row for `date`.
    ///
    /// A day without rows still gets a row of zeros. Returns the number of
    /// statistics rows written (always one on success).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the statement fails.
    pub async fn refresh(&mut self, date: NaiveDate) -> Result<u64, DbError> {
        let sql = refresh_sql(&self.item_log, &self.daily_stats);
        let result = sqlx::query(&sql).bind(date).execute(&mut *self.conn).await?;

        tracing::debug!(
            %date,
            rows_affected = result.rows_affected(),
            "Refreshed daily statistics"
        );
        Ok(result.rows_affected())
    }

    /// Load the stored statistics for `date`, if a refresh has run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails or a counter column
    /// is missing.
    pub async fn load(&mut self, date: NaiveDate) -> Result<Option<DailyStats>, DbError> {
        let columns = StatCounter::ALL
            .iter()
            .map(|c| c.column())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM {} WHERE stat_date = $1",
            self.daily_stats
        );
        let Some(row) = sqlx::query(&sql)
            .bind(date)
            .fetch_optional(&mut *self.conn)
            .await?
        else {
            return Ok(None);
        };

        let mut stats = DailyStats::empty(date);
        for counter in StatCounter::ALL {
            let value: i64 = row.try_get(counter.column())?;
            stats.set(counter, value);
        }
        Ok(Some(stats))
    }
}

/// SQL aggregate computing `counter` over the filtered item log rows.
///
/// Mirrors [`StatCounter::matches`].
fn aggregate(counter: StatCounter) -> &'static str {
    match counter {
        StatCounter::TotalScans => "COUNT(*)",
        StatCounter::SkuCount => "COUNT(*) FILTER (WHERE sku IS NOT NULL)",
        StatCounter::PalletCount => "COUNT(*) FILTER (WHERE pallet_number IS NOT NULL)",
        StatCounter::OcrDescription1Count => {
            "COUNT(*) FILTER (WHERE ocr_description_1 IS NOT NULL)"
        }
        StatCounter::QuantityCount => "COUNT(*) FILTER (WHERE quantity IS NOT NULL)",
        StatCounter::BatchNumberCount => "COUNT(*) FILTER (WHERE batch_number IS NOT NULL)",
        StatCounter::BarcodeCount => "COUNT(*) FILTER (WHERE barcode IS NOT NULL)",
        StatCounter::OcrDescription2Count => {
            "COUNT(*) FILTER (WHERE ocr_description_2 IS NOT NULL)"
        }
        StatCounter::CrossCheckCount => "COUNT(*) FILTER (WHERE cross_check)",
        StatCounter::LabelPrintedCount => "COUNT(*) FILTER (WHERE label_printed)",
        StatCounter::LabelAppliedCount => "COUNT(*) FILTER (WHERE label_applied)",
        StatCounter::CheckScanResultCount => {
            "COUNT(*) FILTER (WHERE check_scan_result IS NOT NULL)"
        }
        StatCounter::ValidCount => "COUNT(*) FILTER (WHERE valid)",
        StatCounter::SentCount => "COUNT(*) FILTER (WHERE sent)",
        StatCounter::ImageSentCount => "COUNT(*) FILTER (WHERE image_sent)",
        StatCounter::DuplicateCount => "COUNT(*) FILTER (WHERE duplicate)",
        StatCounter::CompleteCount => "COUNT(*) FILTER (WHERE complete)",
        StatCounter::Ic1GoodReadCount => "COUNT(*) FILTER (WHERE ocr_description_1 <> '')",
        StatCounter::Ic1NoReadCount => {
            "COUNT(*) FILTER (WHERE COALESCE(ocr_description_1, '') = '')"
        }
        StatCounter::Ic2GoodReadCount => "COUNT(*) FILTER (WHERE ocr_description_2 <> '')",
        StatCounter::Ic2NoReadCount => {
            "COUNT(*) FILTER (WHERE COALESCE(ocr_description_2, '') = '')"
        }
        StatCounter::CrossCheckFailCount => "COUNT(*) FILTER (WHERE NOT cross_check)",
        StatCounter::CheckScanGoodReadCount => {
            "COUNT(*) FILTER (WHERE check_scan_result <> '')"
        }
        StatCounter::CheckScanNoReadCount => {
            "COUNT(*) FILTER (WHERE COALESCE(check_scan_result, '') = '')"
        }
    }
}

/// The single upsert statement. `$1` is the statistics date.
fn refresh_sql(item_log: &str, daily_stats: &str) -> String {
    let columns = StatCounter::ALL
        .iter()
        .map(|c| c.column())
        .collect::<Vec<_>>()
        .join(", ");
    let aggregates = StatCounter::ALL
        .iter()
        .map(|c| aggregate(*c))
        .collect::<Vec<_>>()
        .join(",\n       ");
    let updates = StatCounter::ALL
        .iter()
        .map(|c| format!("{0} = EXCLUDED.{0}", c.column()))
        .collect::<Vec<_>>()
        .join(",\n    ");

    format!(
        "INSERT INTO {daily_stats} (stat_date, {columns})\n\
         SELECT $1::date,\n       {aggregates}\n\
         FROM {item_log}\n\
         WHERE date_time_stamp >= $1::date::timestamp\n  \
           AND date_time_stamp < ($1::date + 1)::timestamp\n\
         ON CONFLICT (stat_date) DO UPDATE SET\n    {updates}"
    )
}
