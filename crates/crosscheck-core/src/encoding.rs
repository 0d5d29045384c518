//! Flat-file encoding of item log rows.
//!
//! One row becomes one comma-separated line with the 18 columns in
//! [`COLUMN_NAMES`] order. Text is quoted only when it has to be, flags are
//! `0`/`1`, and missing values are empty. Lines end in CRLF.

use std::borrow::Cow;
use std::io;

use chrono::NaiveDateTime;
use crosscheck_types::{COLUMN_NAMES, ItemLogRecord};

/// Field separator.
pub const DELIMITER: u8 = b',';

/// Characters that cannot appear in a file name on the plant's file shares.
const INVALID_FILE_NAME_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Errors raised while rendering rows.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A record could not be written to the buffer.
    #[error("failed to encode CSV record: {source}")]
    Record {
        /// The underlying CSV error.
        #[from]
        source: csv::Error,
    },

    /// The buffered writer could not be flushed.
    #[error("failed to flush CSV buffer: {source}")]
    Flush {
        /// The underlying I/O error.
        source: io::Error,
    },
}

/// Render one row as file content: an optional header line, then the data
/// line.
///
/// # Errors
///
/// Returns [`EncodeError`] if the writer fails.
pub fn to_csv(record: &ItemLogRecord, include_header: bool) -> Result<Vec<u8>, EncodeError> {
    encode_records(std::slice::from_ref(record), include_header)
}

/// Render rows as file content, one line per row, in slice order.
///
/// A value containing the delimiter, a double quote, CR, or LF is wrapped in
/// double quotes with inner quotes doubled; anything else is emitted
/// verbatim. `None` and the empty string both render as nothing.
///
/// # Errors
///
/// Returns [`EncodeError`] if the writer fails.
pub fn encode_records(
    records: &[ItemLogRecord],
    include_header: bool,
) -> Result<Vec<u8>, EncodeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    if include_header {
        writer.write_record(COLUMN_NAMES)?;
    }
    for record in records {
        let fields = fields(record);
        writer.write_record(fields.iter().map(|f| f.as_bytes()))?;
    }

    writer.into_inner().map_err(|e| EncodeError::Flush {
        source: e.into_error(),
    })
}

/// The 18 column values of one row, unquoted.
fn fields(record: &ItemLogRecord) -> [Cow<'_, str>; 18] {
    [
        Cow::Owned(record.id.to_string()),
        Cow::Owned(format_timestamp(record.date_time_stamp)),
        text(record.sku.as_deref()),
        optional_int(record.pallet_number),
        text(record.ocr_description_1.as_deref()),
        optional_int(record.quantity),
        text(record.batch_number.as_deref()),
        text(record.barcode.as_deref()),
        text(record.ocr_description_2.as_deref()),
        bit(record.cross_check),
        bit(record.label_printed),
        bit(record.label_applied),
        text(record.check_scan_result.as_deref()),
        bit(record.valid),
        bit(record.sent),
        bit(record.image_sent),
        bit(record.duplicate),
        bit(record.complete),
    ]
}

/// `yyyy-MM-ddTHH:mm:ss`, no fractional seconds, no zone.
pub fn format_timestamp(stamp: NaiveDateTime) -> String {
    stamp.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Artifact file name for one row: `record_{id}_{yyyyMMdd_HHmmss}.csv`.
pub fn record_file_name(record: &ItemLogRecord) -> String {
    sanitize_file_name(&format!(
        "record_{}_{}.csv",
        record.id,
        record.date_time_stamp.format("%Y%m%d_%H%M%S")
    ))
}

/// Replace every character that is not allowed in a file name with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_control() || INVALID_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn text(value: Option<&str>) -> Cow<'_, str> {
    Cow::Borrowed(value.unwrap_or_default())
}

fn optional_int(value: Option<i32>) -> Cow<'static, str> {
    value.map_or(Cow::Borrowed(""), |v| Cow::Owned(v.to_string()))
}

const fn bit(flag: bool) -> Cow<'static, str> {
    if flag { Cow::Borrowed("1") } else { Cow::Borrowed("0") }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    /// The data line of `row` without its terminator.
    fn line(row: &ItemLogRecord) -> String {
        let content = String::from_utf8(to_csv(row, false).unwrap()).unwrap();
        content.strip_suffix("\r\n").unwrap().to_owned()
    }

    /// How a text value renders in the `sku` column.
    fn sku_field(value: Option<&str>) -> String {
        let mut row = ItemLogRecord::new(1, stamp());
        row.sku = value.map(str::to_owned);
        let rendered = line(&row);
        let rest = rendered.strip_prefix("1,2024-01-01T10:00:00,").unwrap();
        rest.strip_suffix(",,,,,,,0,0,0,,0,0,0,0,0").unwrap().to_owned()
    }

    #[test]
    fn bare_row_renders_empty_optionals_and_zero_flags() {
        let row = ItemLogRecord::new(1, stamp());
        assert_eq!(line(&row), "1,2024-01-01T10:00:00,,,,,,,,0,0,0,,0,0,0,0,0");
    }

    #[test]
    fn populated_row_keeps_column_order() {
        let mut row = ItemLogRecord::new(42, stamp());
        row.sku = Some("A,B".to_owned());
        row.pallet_number = Some(7);
        row.ocr_description_1 = Some("LOT1".to_owned());
        row.quantity = Some(-3);
        row.batch_number = Some("B9".to_owned());
        row.barcode = Some("501".to_owned());
        row.ocr_description_2 = Some("LOT2".to_owned());
        row.cross_check = true;
        row.label_applied = true;
        row.check_scan_result = Some("OK".to_owned());
        row.valid = true;
        row.complete = true;

        let rendered = line(&row);
        assert_eq!(
            rendered,
            "42,2024-01-01T10:00:00,\"A,B\",7,LOT1,-3,B9,501,LOT2,1,0,1,OK,1,0,0,0,1"
        );
        assert_eq!(rendered.split(',').count(), 19); // one quoted comma
    }

    #[test]
    fn quoting_rules() {
        assert_eq!(sku_field(None), "");
        assert_eq!(sku_field(Some("")), "");
        assert_eq!(sku_field(Some("plain text")), "plain text");
        assert_eq!(sku_field(Some("a,b")), "\"a,b\"");
        assert_eq!(sku_field(Some("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(sku_field(Some("two\nlines")), "\"two\nlines\"");
        assert_eq!(sku_field(Some("cr\ronly")), "\"cr\ronly\"");
        assert_eq!(sku_field(Some("#hash;semi")), "#hash;semi");
    }

    #[test]
    fn tricky_field_round_trips_through_a_csv_reader() {
        let text = "Box, \"large\"\nsecond line";
        let mut row = ItemLogRecord::new(9, stamp());
        row.barcode = Some(text.to_owned());

        let content = to_csv(&row, false).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(content.as_slice());
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();

        assert_eq!(records.len(), 1);
        let parsed = &records[0];
        assert_eq!(parsed.len(), 18);
        assert_eq!(&parsed[0], "9");
        assert_eq!(&parsed[7], text);
        assert_eq!(&parsed[2], "");
    }

    #[test]
    fn header_is_opt_in_and_lines_end_in_crlf() {
        let row = ItemLogRecord::new(1, stamp());
        let data_only = String::from_utf8(to_csv(&row, false).unwrap()).unwrap();
        assert!(data_only.starts_with("1,"));
        assert!(data_only.ends_with("\r\n"));
        assert_eq!(data_only.matches("\r\n").count(), 1);

        let with_header = String::from_utf8(to_csv(&row, true).unwrap()).unwrap();
        assert!(with_header.starts_with("id,date_time_stamp,sku,"));
        assert_eq!(with_header.matches("\r\n").count(), 2);
    }

    #[test]
    fn several_rows_share_one_header() {
        let rows = [ItemLogRecord::new(1, stamp()), ItemLogRecord::new(2, stamp())];
        let content = String::from_utf8(encode_records(&rows, true).unwrap()).unwrap();
        let lines: Vec<&str> = content.split_terminator("\r\n").collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMN_NAMES.join(","));
        assert!(lines[1].starts_with("1,"));
        assert!(lines[2].starts_with("2,"));
    }

    #[test]
    fn file_name_uses_id_and_compact_timestamp() {
        let row = ItemLogRecord::new(1234, stamp());
        assert_eq!(record_file_name(&row), "record_1234_20240101_100000.csv");
    }

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_file_name("a:b/c\\d|e?f*g<h>i\"j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_file_name("tab\there"), "tab_here");
        assert_eq!(sanitize_file_name("record_1.csv"), "record_1.csv");
    }
}
