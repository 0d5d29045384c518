//! Per-day aggregate statistics over the item log.
//!
//! Each [`StatCounter`] is one predicate over an [`ItemLogRecord`]. A
//! [`DailyStats`] row holds, for one calendar day, how many rows stamped on
//! that day satisfy each predicate. Rows are always recomputed from scratch
//! rather than incremented, so a stored row is exactly the tally of the
//! source table at the moment it was refreshed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::ItemLogRecord;

/// One counter column of the daily statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatCounter {
    /// Every row of the day.
    TotalScans,
    /// `sku` present.
    SkuCount,
    /// `pallet_number` present.
    PalletCount,
    /// `ocr_description_1` present.
    OcrDescription1Count,
    /// `quantity` present.
    QuantityCount,
    /// `batch_number` present.
    BatchNumberCount,
    /// `barcode` present.
    BarcodeCount,
    /// `ocr_description_2` present.
    OcrDescription2Count,
    /// `cross_check` set.
    CrossCheckCount,
    /// `label_printed` set.
    LabelPrintedCount,
    /// `label_applied` set.
    LabelAppliedCount,
    /// `check_scan_result` present.
    CheckScanResultCount,
    /// `valid` set.
    ValidCount,
    /// `sent` set.
    SentCount,
    /// `image_sent` set.
    ImageSentCount,
    /// `duplicate` set.
    DuplicateCount,
    /// `complete` set.
    CompleteCount,
    /// First OCR camera produced non-empty text.
    Ic1GoodReadCount,
    /// First OCR camera produced nothing.
    Ic1NoReadCount,
    /// Second OCR camera produced non-empty text.
    Ic2GoodReadCount,
    /// Second OCR camera produced nothing.
    Ic2NoReadCount,
    /// `cross_check` cleared.
    CrossCheckFailCount,
    /// Check scan produced a non-empty result.
    CheckScanGoodReadCount,
    /// Check scan produced nothing.
    CheckScanNoReadCount,
}

impl StatCounter {
    /// Every counter, in column order of the statistics table.
    pub const ALL: [Self; 24] = [
        Self::TotalScans,
        Self::SkuCount,
        Self::PalletCount,
        Self::OcrDescription1Count,
        Self::QuantityCount,
        Self::BatchNumberCount,
        Self::BarcodeCount,
        Self::OcrDescription2Count,
        Self::CrossCheckCount,
        Self::LabelPrintedCount,
        Self::LabelAppliedCount,
        Self::CheckScanResultCount,
        Self::ValidCount,
        Self::SentCount,
        Self::ImageSentCount,
        Self::DuplicateCount,
        Self::CompleteCount,
        Self::Ic1GoodReadCount,
        Self::Ic1NoReadCount,
        Self::Ic2GoodReadCount,
        Self::Ic2NoReadCount,
        Self::CrossCheckFailCount,
        Self::CheckScanGoodReadCount,
        Self::CheckScanNoReadCount,
    ];

    /// Column name in the statistics table.
    pub const fn column(self) -> &'static str {
        match self {
            Self::TotalScans => "total_scans",
            Self::SkuCount => "sku_count",
            Self::PalletCount => "pallet_count",
            Self::OcrDescription1Count => "ocr_description_1_count",
            Self::QuantityCount => "quantity_count",
            Self::BatchNumberCount => "batch_number_count",
            Self::BarcodeCount => "barcode_count",
            Self::OcrDescription2Count => "ocr_description_2_count",
            Self::CrossCheckCount => "cross_check_count",
            Self::LabelPrintedCount => "label_printed_count",
            Self::LabelAppliedCount => "label_applied_count",
            Self::CheckScanResultCount => "check_scan_result_count",
            Self::ValidCount => "valid_count",
            Self::SentCount => "sent_count",
            Self::ImageSentCount => "image_sent_count",
            Self::DuplicateCount => "duplicate_count",
            Self::CompleteCount => "complete_count",
            Self::Ic1GoodReadCount => "ic1_good_read_count",
            Self::Ic1NoReadCount => "ic1_no_read_count",
            Self::Ic2GoodReadCount => "ic2_good_read_count",
            Self::Ic2NoReadCount => "ic2_no_read_count",
            Self::CrossCheckFailCount => "cross_check_fail_count",
            Self::CheckScanGoodReadCount => "check_scan_good_read_count",
            Self::CheckScanNoReadCount => "check_scan_no_read_count",
        }
    }

    /// Whether `record` is counted by this counter.
    pub fn matches(self, record: &ItemLogRecord) -> bool {
        match self {
            Self::TotalScans => true,
            Self::SkuCount => record.sku.is_some(),
            Self::PalletCount => record.pallet_number.is_some(),
            Self::OcrDescription1Count => record.ocr_description_1.is_some(),
            Self::QuantityCount => record.quantity.is_some(),
            Self::BatchNumberCount => record.batch_number.is_some(),
            Self::BarcodeCount => record.barcode.is_some(),
            Self::OcrDescription2Count => record.ocr_description_2.is_some(),
            Self::CrossCheckCount => record.cross_check,
            Self::LabelPrintedCount => record.label_printed,
            Self::LabelAppliedCount => record.label_applied,
            Self::CheckScanResultCount => record.check_scan_result.is_some(),
            Self::ValidCount => record.valid,
            Self::SentCount => record.sent,
            Self::ImageSentCount => record.image_sent,
            Self::DuplicateCount => record.duplicate,
            Self::CompleteCount => record.complete,
            Self::Ic1GoodReadCount => has_text(record.ocr_description_1.as_deref()),
            Self::Ic1NoReadCount => !has_text(record.ocr_description_1.as_deref()),
            Self::Ic2GoodReadCount => has_text(record.ocr_description_2.as_deref()),
            Self::Ic2NoReadCount => !has_text(record.ocr_description_2.as_deref()),
            Self::CrossCheckFailCount => !record.cross_check,
            Self::CheckScanGoodReadCount => has_text(record.check_scan_result.as_deref()),
            Self::CheckScanNoReadCount => !has_text(record.check_scan_result.as_deref()),
        }
    }
}

/// A read counts as good when it is present and not the empty string.
fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.is_empty())
}

/// One row of the daily statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// The calendar day these counters describe.
    pub stat_date: NaiveDate,
    counts: [i64; 24],
}

impl DailyStats {
    /// An all-zero row for `stat_date`.
    pub const fn empty(stat_date: NaiveDate) -> Self {
        Self {
            stat_date,
            counts: [0; 24],
        }
    }

    /// Recompute every counter for `stat_date` from `records`.
    ///
    /// Records stamped on other days are ignored, so the whole table can be
    /// passed in.
    pub fn tally<'a, I>(stat_date: NaiveDate, records: I) -> Self
    where
        I: IntoIterator<Item = &'a ItemLogRecord>,
    {
        let mut stats = Self::empty(stat_date);
        for record in records {
            if record.stat_date() != stat_date {
                continue;
            }
            for (slot, counter) in stats.counts.iter_mut().zip(StatCounter::ALL) {
                if counter.matches(record) {
                    *slot = slot.saturating_add(1);
                }
            }
        }
        stats
    }

    /// Value of one counter.
    pub fn get(&self, counter: StatCounter) -> i64 {
        index_of(counter)
            .and_then(|i| self.counts.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite one counter, e.g. when decoding a stored row.
    pub fn set(&mut self, counter: StatCounter, value: i64) {
        if let Some(slot) = index_of(counter).and_then(|i| self.counts.get_mut(i)) {
            *slot = value;
        }
    }

    /// Iterate `(counter, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (StatCounter, i64)> + '_ {
        StatCounter::ALL.into_iter().zip(self.counts.iter().copied())
    }
}

fn index_of(counter: StatCounter) -> Option<usize> {
    StatCounter::ALL.iter().position(|c| *c == counter)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        day(d).and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn columns_are_unique() {
        let mut names: Vec<_> = StatCounter::ALL.iter().map(|c| c.column()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), StatCounter::ALL.len());
    }

    #[test]
    fn tally_counts_only_the_requested_day() {
        let rows = vec![
            ItemLogRecord::new(1, at(1, 8)),
            ItemLogRecord::new(2, at(1, 23)),
            ItemLogRecord::new(3, at(2, 0)),
        ];
        let stats = DailyStats::tally(day(1), &rows);
        assert_eq!(stats.get(StatCounter::TotalScans), 2);
        assert_eq!(DailyStats::tally(day(2), &rows).get(StatCounter::TotalScans), 1);
        assert_eq!(DailyStats::tally(day(3), &rows), DailyStats::empty(day(3)));
    }

    #[test]
    fn tally_matches_every_predicate() {
        let mut full = ItemLogRecord::new(1, at(1, 9));
        full.sku = Some("SKU-1".to_owned());
        full.pallet_number = Some(4);
        full.ocr_description_1 = Some("LOT 42".to_owned());
        full.quantity = Some(12);
        full.batch_number = Some("B-9".to_owned());
        full.barcode = Some("5012345678900".to_owned());
        full.ocr_description_2 = Some(String::new());
        full.cross_check = true;
        full.label_printed = true;
        full.label_applied = true;
        full.check_scan_result = Some("OK".to_owned());
        full.valid = true;
        full.sent = true;
        full.image_sent = true;
        full.duplicate = true;
        full.complete = true;

        let mut bare = ItemLogRecord::new(2, at(1, 10));
        bare.check_scan_result = Some(String::new());

        let stats = DailyStats::tally(day(1), [&full, &bare]);

        let expected = [
            (StatCounter::TotalScans, 2),
            (StatCounter::SkuCount, 1),
            (StatCounter::PalletCount, 1),
            (StatCounter::OcrDescription1Count, 1),
            (StatCounter::QuantityCount, 1),
            (StatCounter::BatchNumberCount, 1),
            (StatCounter::BarcodeCount, 1),
            // present but empty still counts as present
            (StatCounter::OcrDescription2Count, 1),
            (StatCounter::CrossCheckCount, 1),
            (StatCounter::LabelPrintedCount, 1),
            (StatCounter::LabelAppliedCount, 1),
            (StatCounter::CheckScanResultCount, 2),
            (StatCounter::ValidCount, 1),
            (StatCounter::SentCount, 1),
            (StatCounter::ImageSentCount, 1),
            (StatCounter::DuplicateCount, 1),
            (StatCounter::CompleteCount, 1),
            (StatCounter::Ic1GoodReadCount, 1),
            (StatCounter::Ic1NoReadCount, 1),
            (StatCounter::Ic2GoodReadCount, 0),
            (StatCounter::Ic2NoReadCount, 2),
            (StatCounter::CrossCheckFailCount, 1),
            (StatCounter::CheckScanGoodReadCount, 1),
            (StatCounter::CheckScanNoReadCount, 1),
        ];
        assert_eq!(expected.len(), StatCounter::ALL.len());
        for (counter, value) in expected {
            assert_eq!(stats.get(counter), value, "{}", counter.column());
        }
    }

    #[test]
    fn set_then_get() {
        let mut stats = DailyStats::empty(day(5));
        stats.set(StatCounter::SentCount, 9);
        assert_eq!(stats.get(StatCounter::SentCount), 9);
        assert_eq!(stats.get(StatCounter::TotalScans), 0);
        assert_eq!(stats.iter().count(), 24);
    }
}
