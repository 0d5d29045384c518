//! The item log row: one scanned and cross-checked item.
//!
//! Rows are written by the line controller upstream of this agent. The
//! agent only ever reads them and flips [`ItemLogRecord::sent`] once the
//! row has been materialized.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Column names of the item log table, in artifact order.
///
/// The CSV line, the optional CSV header, and the `SELECT` list of the row
/// selector all follow this order.
pub const COLUMN_NAMES: [&str; 18] = [
    "id",
    "date_time_stamp",
    "sku",
    "pallet_number",
    "ocr_description_1",
    "quantity",
    "batch_number",
    "barcode",
    "ocr_description_2",
    "cross_check",
    "label_printed",
    "label_applied",
    "check_scan_result",
    "valid",
    "sent",
    "image_sent",
    "duplicate",
    "complete",
];

/// One row of the item log table.
///
/// The boolean status flags mirror the line controller's inspection
/// stages; the optional fields are whatever the scanners and OCR cameras
/// managed to read.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLogRecord {
    /// Store-assigned identifier, strictly increasing with insertion order.
    pub id: i64,
    /// When the item was scanned (line-local time, second precision).
    pub date_time_stamp: NaiveDateTime,
    /// Stock keeping unit code.
    pub sku: Option<String>,
    /// Pallet the item was stacked on.
    pub pallet_number: Option<i32>,
    /// Text read by the first OCR camera.
    pub ocr_description_1: Option<String>,
    /// Item quantity.
    pub quantity: Option<i32>,
    /// Production batch number.
    pub batch_number: Option<String>,
    /// Decoded barcode.
    pub barcode: Option<String>,
    /// Text read by the second OCR camera.
    pub ocr_description_2: Option<String>,
    /// Whether the cross-check between the two reads passed.
    pub cross_check: bool,
    /// Whether a label was printed.
    pub label_printed: bool,
    /// Whether the printed label was applied.
    pub label_applied: bool,
    /// Result of the secondary check scan.
    pub check_scan_result: Option<String>,
    /// Whether the item was judged valid overall.
    pub valid: bool,
    /// Whether the row has been forwarded. Never reverts once true.
    pub sent: bool,
    /// Whether the item images have been forwarded.
    pub image_sent: bool,
    /// Whether the item was flagged as a duplicate scan.
    pub duplicate: bool,
    /// Whether all inspection stages completed.
    pub complete: bool,
}

impl ItemLogRecord {
    /// Create an unsent row with every optional field empty and every flag
    /// cleared.
    pub const fn new(id: i64, date_time_stamp: NaiveDateTime) -> Self {
        Self {
            id,
            date_time_stamp,
            sku: None,
            pallet_number: None,
            ocr_description_1: None,
            quantity: None,
            batch_number: None,
            barcode: None,
            ocr_description_2: None,
            cross_check: false,
            label_printed: false,
            label_applied: false,
            check_scan_result: None,
            valid: false,
            sent: false,
            image_sent: false,
            duplicate: false,
            complete: false,
        }
    }

    /// The calendar day this row counts towards in the daily statistics.
    pub fn stat_date(&self) -> NaiveDate {
        self.date_time_stamp.date()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    #[test]
    fn new_row_is_unsent_and_empty() {
        let row = ItemLogRecord::new(7, stamp());
        assert_eq!(row.id, 7);
        assert!(!row.sent);
        assert!(row.sku.is_none());
        assert!(row.check_scan_result.is_none());
    }

    #[test]
    fn stat_date_drops_time_of_day() {
        let row = ItemLogRecord::new(1, stamp());
        assert_eq!(row.stat_date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn column_order_starts_with_identity_and_ends_with_flags() {
        assert_eq!(COLUMN_NAMES.first(), Some(&"id"));
        assert_eq!(COLUMN_NAMES.get(1), Some(&"date_time_stamp"));
        assert_eq!(COLUMN_NAMES.get(14), Some(&"sent"));
        assert_eq!(COLUMN_NAMES.last(), Some(&"complete"));
    }

    #[test]
    fn serde_roundtrip_keeps_nulls() {
        let mut row = ItemLogRecord::new(3, stamp());
        row.sku = Some("A,B".to_owned());
        let json = serde_json::to_string(&row).unwrap();
        let back: ItemLogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
