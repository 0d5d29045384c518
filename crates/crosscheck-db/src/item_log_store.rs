//! Row selection and delivery marking on the item log table.
//!
//! Selection skips rows another session holds a lock on instead of waiting
//! for them, and marking is a conditional update, so several agents can
//! drain the same table and each row is marked by exactly one of them.

use chrono::NaiveDateTime;
use sqlx::PgConnection;

use crosscheck_core::config::DatabaseSettings;
use crosscheck_types::ItemLogRecord;

use crate::error::DbError;
use crate::ident::qualified;

/// Select list shared by every item log query, in artifact column order.
const SELECT_COLUMNS: &str = "id, date_time_stamp, sku, pallet_number, ocr_description_1, \
     quantity, batch_number, barcode, ocr_description_2, cross_check, label_printed, \
     label_applied, check_scan_result, valid, sent, image_sent, duplicate, complete";

/// Operations on the item log table.
pub struct ItemLogStore<'c> {
    conn: &'c mut PgConnection,
    table: String,
}

impl<'c> ItemLogStore<'c> {
    /// Bind a store to an open connection and the configured table.
    pub fn new(conn: &'c mut PgConnection, settings: &DatabaseSettings) -> Self {
        Self {
            conn,
            table: qualified(&settings.schema, &settings.item_log_table),
        }
    }

    /// The unsent row with the smallest id, skipping locked rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn select_oldest_unsent(&mut self) -> Result<Option<ItemLogRecord>, DbError> {
        let sql = select_oldest_unsent_sql(&self.table);
        let row = sqlx::query_as::<_, ItemLogRow>(&sql)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(row.map(ItemLogRecord::from))
    }

    /// Set `sent = true` on `id` if it is still false.
    ///
    /// Returns `true` only when this call flipped the flag; `false` when the
    /// row was already sent or does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn mark_sent(&mut self, id: i64) -> Result<bool, DbError> {
        let sql = mark_sent_sql(&self.table);
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.conn).await?;

        Ok(result.rows_affected() == 1)
    }

    /// Load one row by id, regardless of its `sent` flag.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get(&mut self, id: i64) -> Result<Option<ItemLogRecord>, DbError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM {} WHERE id = $1", self.table);
        let row = sqlx::query_as::<_, ItemLogRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(row.map(ItemLogRecord::from))
    }

    /// Number of rows still waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_unsent(&mut self) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE sent = false", self.table);
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&mut *self.conn).await?;
        Ok(count)
    }
}

fn select_oldest_unsent_sql(table: &str) -> String {
    format!(
        "SELECT {SELECT_COLUMNS} FROM {table} \
         WHERE sent = false \
         ORDER BY id \
         LIMIT 1 \
         FOR SHARE SKIP LOCKED"
    )
}

fn mark_sent_sql(table: &str) -> String {
    format!("UPDATE {table} SET sent = true WHERE id = $1 AND sent = false")
}

/// A row from the item log table.
#[derive(Debug, Clone, sqlx::FromRow)]
#[allow(clippy::struct_excessive_bools)]
pub struct ItemLogRow {
    /// Store-assigned id.
    pub id: i64,
    /// When the item was scanned.
    pub date_time_stamp: NaiveDateTime,
    /// Product code.
    pub sku: Option<String>,
    /// Pallet number.
    pub pallet_number: Option<i32>,
    /// First OCR read.
    pub ocr_description_1: Option<String>,
    /// Item quantity.
    pub quantity: Option<i32>,
    /// Batch number.
    pub batch_number: Option<String>,
    /// Barcode.
    pub barcode: Option<String>,
    /// Second OCR read.
    pub ocr_description_2: Option<String>,
    /// Cross-check passed.
    pub cross_check: bool,
    /// Label printed.
    pub label_printed: bool,
    /// Label applied.
    pub label_applied: bool,
    /// Check scan result text.
    pub check_scan_result: Option<String>,
    /// Overall validity.
    pub valid: bool,
    /// Delivered flag.
    pub sent: bool,
    /// Image delivered flag.
    pub image_sent: bool,
    /// Duplicate scan.
    pub duplicate: bool,
    /// Processing complete.
    pub complete: bool,
}

impl From<ItemLogRow> for ItemLogRecord {
    fn from(row: ItemLogRow) -> Self {
        Self {
            id: row.id,
            date_time_stamp: row.date_time_stamp,
            sku: row.sku,
            pallet_number: row.pallet_number,
            ocr_description_1: row.ocr_description_1,
            quantity: row.quantity,
            batch_number: row.batch_number,
            barcode: row.barcode,
            ocr_description_2: row.ocr_description_2,
            cross_check: row.cross_check,
            label_printed: row.label_printed,
            label_applied: row.label_applied,
            check_scan_result: row.check_scan_result,
            valid: row.valid,
            sent: row.sent,
            image_sent: row.image_sent,
            duplicate: row.duplicate,
            complete: row.complete,
        }
    }
}
