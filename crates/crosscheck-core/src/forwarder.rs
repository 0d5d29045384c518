//! The forwarding loop.
//!
//! One cycle moves at most one row through select, materialize, mark, and
//! refresh. [`Forwarder::run_cycle`] returns a [`CycleOutcome`] instead of
//! propagating errors; [`Forwarder::run`] repeats cycles with a sleep in
//! between until the cancellation token fires.
//!
//! The row is marked sent only after the primary artifact exists, so a crash
//! between the two steps produces a duplicate file on restart, never a lost
//! row.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::Settings;
use crate::error::{ForwardError, Stage};
use crate::materializer::Materializer;
use crate::settings::SettingsCell;
use crate::store::ForwardingStore;

/// What a single cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// No unsent row was visible.
    Idle,
    /// The row was written and marked sent.
    Delivered {
        /// Row id.
        id: i64,
        /// Primary artifact path.
        primary: PathBuf,
        /// Whether every statistics refresh succeeded.
        stats_refreshed: bool,
    },
    /// The artifact was written but another worker had already marked the row.
    AlreadySent {
        /// Row id.
        id: i64,
    },
    /// A step failed; the row (if any) is retried next cycle.
    Failed {
        /// Row id, when selection got that far.
        id: Option<i64>,
        /// The failure.
        error: ForwardError,
    },
}

impl CycleOutcome {
    /// The failing step, for [`CycleOutcome::Failed`].
    pub const fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Failed { error, .. } => Some(error.stage()),
            _ => None,
        }
    }
}

/// Counters accumulated over a [`Forwarder::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderSummary {
    /// Cycles started.
    pub cycles: u64,
    /// Rows delivered and marked by this worker.
    pub delivered: u64,
    /// Rows another worker marked first.
    pub already_sent: u64,
    /// Cycles that ended in a failure.
    pub failed: u64,
}

impl ForwarderSummary {
    const fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles = self.cycles.saturating_add(1);
        match outcome {
            CycleOutcome::Idle => {}
            CycleOutcome::Delivered { .. } => self.delivered = self.delivered.saturating_add(1),
            CycleOutcome::AlreadySent { .. } => {
                self.already_sent = self.already_sent.saturating_add(1);
            }
            CycleOutcome::Failed { .. } => self.failed = self.failed.saturating_add(1),
        }
    }
}

/// Tracks consecutive failures of the same row.
#[derive(Debug, Default)]
struct StallTracker {
    row: Option<i64>,
    streak: u32,
}

impl StallTracker {
    /// Count a failure of `id` and return the streak length.
    fn failed(&mut self, id: i64) -> u32 {
        if self.row == Some(id) {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.row = Some(id);
            self.streak = 1;
        }
        self.streak
    }

    const fn clear(&mut self) {
        self.row = None;
        self.streak = 0;
    }
}

/// Single sequential worker draining the unsent backlog.
pub struct Forwarder<S> {
    store: S,
    materializer: Materializer,
    settings: SettingsCell,
    stall: StallTracker,
    today: fn() -> NaiveDate,
}

impl<S: ForwardingStore> Forwarder<S> {
    /// Create a worker reading settings from `settings` every cycle.
    pub fn new(store: S, materializer: Materializer, settings: SettingsCell) -> Self {
        Self {
            store,
            materializer,
            settings,
            stall: StallTracker::default(),
            today: local_today,
        }
    }

    /// Replace the source of "today" used for the second statistics refresh.
    #[must_use]
    pub const fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Run one cycle against a settings snapshot.
    pub async fn run_cycle(&mut self, settings: &Settings) -> CycleOutcome {
        let db = &settings.database;

        let record = match self.store.select_oldest_unsent(db).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No unsent rows");
                return CycleOutcome::Idle;
            }
            Err(e) => {
                error!(error = %e, "Row selection failed; treating cycle as empty");
                return CycleOutcome::Failed {
                    id: None,
                    error: ForwardError::Selection(e),
                };
            }
        };
        let id = record.id;
        debug!(row_id = id, "Selected row");

        let materialized = match self
            .materializer
            .materialize(&record, &settings.upload_service)
            .await
        {
            Ok(m) => m,
            Err(e) => return self.fail(settings, id, ForwardError::from(e)),
        };

        match self.store.mark_sent(db, id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    row_id = id,
                    path = %materialized.primary.display(),
                    "Row was already marked sent by another worker"
                );
                self.stall.clear();
                return CycleOutcome::AlreadySent { id };
            }
            Err(e) => return self.fail(settings, id, ForwardError::Marking(e)),
        }
        self.stall.clear();

        let stats_refreshed = self.refresh_stats(settings, record.stat_date()).await;

        info!(
            row_id = id,
            path = %materialized.primary.display(),
            stats_refreshed,
            "Row delivered"
        );
        CycleOutcome::Delivered {
            id,
            primary: materialized.primary,
            stats_refreshed,
        }
    }

    /// Refresh the row's day and today's row; `false` if any refresh failed.
    async fn refresh_stats(&self, settings: &Settings, row_date: NaiveDate) -> bool {
        let today = (self.today)();
        let dates = if today == row_date {
            vec![row_date]
        } else {
            vec![row_date, today]
        };

        let mut all_ok = true;
        for date in dates {
            match self
                .store
                .refresh_daily_stats(&settings.database, date)
                .await
            {
                Ok(rows_affected) => debug!(%date, rows_affected, "Daily statistics refreshed"),
                Err(e) => {
                    let error = ForwardError::AggregateRefresh(e);
                    error!(
                        %date,
                        stage = %error.stage(),
                        error = %error,
                        "Daily statistics refresh failed; row stays sent"
                    );
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    fn fail(&mut self, settings: &Settings, id: i64, error: ForwardError) -> CycleOutcome {
        let streak = self.stall.failed(id);
        let alert_after = settings.upload_service.stall_alert_after;
        // A zero threshold disables escalation.
        let stalled = streak.checked_rem(alert_after) == Some(0);

        if stalled {
            error!(
                row_id = id,
                streak,
                stalled,
                stage = %error.stage(),
                connection = error.is_connection(),
                error = %error,
                "Row keeps failing; backlog is stalled behind it"
            );
        } else {
            error!(
                row_id = id,
                streak,
                stage = %error.stage(),
                connection = error.is_connection(),
                error = %error,
                "Cycle failed; row will be retried"
            );
        }

        CycleOutcome::Failed {
            id: Some(id),
            error,
        }
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Each cycle takes a fresh settings snapshot and sleeps for that
    /// snapshot's interval afterwards. Cancellation interrupts both the
    /// sleep and an in-flight cycle.
    pub async fn run(mut self, cancel: CancellationToken) -> ForwarderSummary {
        let mut summary = ForwarderSummary::default();
        let snapshot = self.settings.current();

        info!(
            interval_ms = snapshot.upload_service.interval_ms,
            output = %snapshot.upload_service.csv_output_folder.display(),
            replica = ?snapshot.upload_service.replica_output_folder,
            "Forwarding loop starting"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let settings = self.settings.current();
            let cycle = summary.cycles.saturating_add(1);
            let span = info_span!("cycle", cycle);

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.run_cycle(&settings).instrument(span) => outcome,
            };
            summary.record(&outcome);

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(settings.upload_service.interval()) => {}
            }
        }

        info!(
            cycles = summary.cycles,
            delivered = summary.delivered,
            already_sent = summary.already_sent,
            failed = summary.failed,
            "Forwarding loop stopped"
        );
        summary
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::NaiveDateTime;
    use crosscheck_types::{ItemLogRecord, StatCounter};

    use super::*;
    use crate::config::DatabaseSettings;
    use crate::memory_store::MemoryStore;
    use crate::store::StoreError;

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        jan(day).and_hms_opt(hour, 0, 0).unwrap()
    }

    fn jan_first() -> NaiveDate {
        jan(1)
    }

    fn jan_second() -> NaiveDate {
        jan(2)
    }

    /// Flips the row to sent between selection and marking, like a second
    /// worker would.
    struct Racing(MemoryStore);

    #[async_trait::async_trait]
    impl ForwardingStore for Racing {
        async fn select_oldest_unsent(
            &self,
            db: &DatabaseSettings,
        ) -> Result<Option<ItemLogRecord>, StoreError> {
            let row = self.0.select_oldest_unsent(db).await?;
            if let Some(r) = &row {
                self.0.mark_sent(db, r.id).await?;
            }
            Ok(row)
        }

        async fn mark_sent(
            &self,
            db: &DatabaseSettings,
            id: i64,
        ) -> Result<bool, StoreError> {
            self.0.mark_sent(db, id).await
        }

        async fn refresh_daily_stats(
            &self,
            db: &DatabaseSettings,
            date: NaiveDate,
        ) -> Result<u64, StoreError> {
            self.0.refresh_daily_stats(db, date).await
        }
    }

    /// In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        /// Route this thread's events into the capture until the guard drops.
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .without_time()
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_owned)
                .collect()
        }

        fn count(&self, needle: &str) -> usize {
            self.lines().iter().filter(|l| l.contains(needle)).count()
        }
    }

    fn settings_for(primary: &Path, replica: Option<&Path>) -> Settings {
        let mut settings = Settings::default();
        settings.upload_service.csv_output_folder = primary.to_path_buf();
        settings.upload_service.replica_output_folder = replica.map(Path::to_path_buf);
        settings.upload_service.interval_ms = 100;
        settings
    }

    fn forwarder(store: &MemoryStore, settings: &Settings) -> Forwarder<MemoryStore> {
        Forwarder::new(
            store.clone(),
            Materializer::new(),
            SettingsCell::new(settings.clone()),
        )
        .with_clock(jan_first)
    }

    #[tokio::test]
    async fn delivers_row_and_refreshes_its_day() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        let mut row = ItemLogRecord::new(1, at(1, 10));
        row.sku = Some("A,B".to_owned());
        row.valid = true;
        store.insert(row);

        let mut fwd = forwarder(&store, &settings);
        let outcome = fwd.run_cycle(&settings).await;

        let CycleOutcome::Delivered { id, primary, stats_refreshed } = outcome else {
            panic!("expected delivery");
        };
        assert_eq!(id, 1);
        assert!(stats_refreshed);
        assert_eq!(primary, dir.path().join("record_1_20240101_100000.csv"));
        assert_eq!(
            std::fs::read_to_string(&primary).unwrap(),
            "1,2024-01-01T10:00:00,\"A,B\",,,,,,,0,0,0,,1,0,0,0,0\r\n"
        );
        assert!(store.row(1).unwrap().sent);

        let stats = store.stats(jan(1)).unwrap();
        assert_eq!(stats.get(StatCounter::TotalScans), 1);
        assert_eq!(stats.get(StatCounter::SkuCount), 1);
        assert_eq!(stats.get(StatCounter::SentCount), 1);
        assert_eq!(stats.get(StatCounter::ValidCount), 1);
        assert_eq!(store.refreshed_dates(), vec![jan(1)]);
    }

    #[tokio::test]
    async fn older_row_also_refreshes_today() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(3, at(1, 23)));

        let mut fwd = forwarder(&store, &settings).with_clock(jan_second);
        assert!(matches!(
            fwd.run_cycle(&settings).await,
            CycleOutcome::Delivered { .. }
        ));
        assert_eq!(store.refreshed_dates(), vec![jan(1), jan(2)]);
    }

    #[tokio::test]
    async fn empty_backlog_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&dir.path().join("csv"), None);
        let store = MemoryStore::new();

        let mut fwd = forwarder(&store, &settings);
        assert!(matches!(fwd.run_cycle(&settings).await, CycleOutcome::Idle));
        assert!(!dir.path().join("csv").exists());
        assert!(store.refreshed_dates().is_empty());
    }

    #[tokio::test]
    async fn broken_replica_still_marks_row() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let settings = settings_for(&dir.path().join("csv"), Some(&blocker.join("replica")));
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(4, at(1, 9)));

        let mut fwd = forwarder(&store, &settings);
        assert!(matches!(
            fwd.run_cycle(&settings).await,
            CycleOutcome::Delivered { id: 4, .. }
        ));
        assert!(store.row(4).unwrap().sent);
    }

    #[tokio::test]
    async fn broken_primary_leaves_row_unsent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let settings = settings_for(&blocker.join("csv"), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(5, at(1, 9)));

        let mut fwd = forwarder(&store, &settings);
        let outcome = fwd.run_cycle(&settings).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Materializing));
        assert!(!store.row(5).unwrap().sent);
        assert!(store.refreshed_dates().is_empty());
    }

    #[tokio::test]
    async fn lost_mark_race_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);

        let inner = MemoryStore::new();
        inner.insert(ItemLogRecord::new(6, at(1, 9)));
        let mut fwd = Forwarder::new(
            Racing(inner.clone()),
            Materializer::new(),
            SettingsCell::new(settings.clone()),
        );

        assert!(matches!(
            fwd.run_cycle(&settings).await,
            CycleOutcome::AlreadySent { id: 6 }
        ));
        assert!(inner.refreshed_dates().is_empty());
    }

    #[tokio::test]
    async fn failed_mark_is_retried_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(8, at(1, 9)));
        store.fail_next_marks(1);

        let mut fwd = forwarder(&store, &settings);
        let first = fwd.run_cycle(&settings).await;
        assert_eq!(first.failed_stage(), Some(Stage::Marking));
        assert!(matches!(first, CycleOutcome::Failed { id: Some(8), .. }));
        assert!(!store.row(8).unwrap().sent);

        assert!(matches!(
            fwd.run_cycle(&settings).await,
            CycleOutcome::Delivered { id: 8, .. }
        ));
        assert!(!store.mark_sent(&settings.database, 8).await.unwrap());
    }

    #[tokio::test]
    async fn selection_failure_is_reported_without_row() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        store.fail_next_selects(1);

        let mut fwd = forwarder(&store, &settings);
        let outcome = fwd.run_cycle(&settings).await;
        assert!(matches!(outcome, CycleOutcome::Failed { id: None, .. }));
        assert_eq!(outcome.failed_stage(), Some(Stage::Selecting));
    }

    #[tokio::test]
    async fn refresh_failure_keeps_row_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(9, at(1, 9)));
        store.fail_next_refreshes(1);

        let mut fwd = forwarder(&store, &settings);
        assert!(matches!(
            fwd.run_cycle(&settings).await,
            CycleOutcome::Delivered { id: 9, stats_refreshed: false, .. }
        ));
        assert!(store.row(9).unwrap().sent);
    }

    #[tokio::test]
    async fn rows_are_delivered_in_ascending_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        for id in [30, 10, 20] {
            store.insert(ItemLogRecord::new(id, at(1, 9)));
        }

        let mut fwd = forwarder(&store, &settings);
        let mut order = Vec::new();
        while let CycleOutcome::Delivered { id, .. } = fwd.run_cycle(&settings).await {
            order.push(id);
        }
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn row_failures_are_logged_as_errors() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let settings = settings_for(&blocker.join("csv"), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(5, at(1, 9)));
        store.fail_next_selects(1);

        let mut fwd = forwarder(&store, &settings);
        assert_eq!(fwd.run_cycle(&settings).await.failed_stage(), Some(Stage::Selecting));
        assert_eq!(
            fwd.run_cycle(&settings).await.failed_stage(),
            Some(Stage::Materializing)
        );

        assert_eq!(logs.count("ERROR crosscheck_core"), 2);
        assert_eq!(logs.count("WARN crosscheck_core"), 0);
        assert_eq!(logs.count("Row selection failed"), 1);
        assert_eq!(logs.count("Cycle failed; row will be retried"), 1);
        assert!(logs.lines().iter().any(|l| l.contains("row_id=5") && l.contains("streak=1")));
    }

    #[tokio::test]
    async fn refresh_failure_is_logged_as_error() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(9, at(1, 9)));
        store.fail_next_refreshes(1);

        let mut fwd = forwarder(&store, &settings);
        fwd.run_cycle(&settings).await;

        assert_eq!(logs.count("ERROR crosscheck_core"), 1);
        assert_eq!(logs.count("Daily statistics refresh failed"), 1);
    }

    #[tokio::test]
    async fn lost_mark_race_is_only_a_warning() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let inner = MemoryStore::new();
        inner.insert(ItemLogRecord::new(6, at(1, 9)));
        let mut fwd = Forwarder::new(
            Racing(inner.clone()),
            Materializer::new(),
            SettingsCell::new(settings.clone()),
        );
        fwd.run_cycle(&settings).await;

        assert_eq!(logs.count("ERROR crosscheck_core"), 0);
        assert_eq!(logs.count("WARN crosscheck_core"), 1);
        assert_eq!(logs.count("already marked sent"), 1);
    }

    #[tokio::test]
    async fn stalled_row_escalates_at_each_multiple_of_threshold() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), None);
        settings.upload_service.stall_alert_after = 3;
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(11, at(1, 9)));
        store.fail_next_marks(7);

        let mut fwd = forwarder(&store, &settings);
        for _ in 0..7 {
            assert_eq!(fwd.run_cycle(&settings).await.failed_stage(), Some(Stage::Marking));
        }

        let stalled: Vec<String> = logs
            .lines()
            .into_iter()
            .filter(|l| l.contains("backlog is stalled"))
            .collect();
        assert_eq!(stalled.len(), 2);
        assert!(stalled[0].contains("streak=3"));
        assert!(stalled[1].contains("streak=6"));
        assert_eq!(logs.count("ERROR crosscheck_core"), 7);

        assert!(matches!(
            fwd.run_cycle(&settings).await,
            CycleOutcome::Delivered { id: 11, .. }
        ));
    }

    #[tokio::test]
    async fn zero_threshold_never_escalates() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), None);
        settings.upload_service.stall_alert_after = 0;
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(12, at(1, 9)));
        store.fail_next_marks(5);

        let mut fwd = forwarder(&store, &settings);
        for _ in 0..5 {
            fwd.run_cycle(&settings).await;
        }

        assert_eq!(logs.count("backlog is stalled"), 0);
        assert_eq!(logs.count("Cycle failed; row will be retried"), 5);
    }

    #[test]
    fn stall_streak_resets_on_new_row() {
        let mut tracker = StallTracker::default();
        assert_eq!(tracker.failed(1), 1);
        assert_eq!(tracker.failed(1), 2);
        assert_eq!(tracker.failed(2), 1);
        tracker.clear();
        assert_eq!(tracker.failed(2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), None);
        settings.upload_service.interval_ms = 60_000;
        let store = MemoryStore::new();
        let fwd = forwarder(&store, &settings);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(fwd.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(summary.cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_reread_every_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(dir.path(), None);
        settings.upload_service.interval_ms = 10_000;
        let store = MemoryStore::new();
        let cell = SettingsCell::new(settings.clone());
        let fwd = Forwarder::new(store.clone(), Materializer::new(), cell.clone());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(fwd.run(cancel.clone()));
        // First cycle runs at t=0 and sleeps 10s under the old snapshot.
        tokio::time::sleep(Duration::from_millis(5)).await;
        settings.upload_service.interval_ms = 1_000;
        cell.publish(settings);

        // t=10s: second cycle, then 1s sleeps.
        tokio::time::sleep(Duration::from_millis(13_500)).await;
        cancel.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.delivered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_drains_backlog_then_idles() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(dir.path(), None);
        let store = MemoryStore::new();
        store.insert(ItemLogRecord::new(1, at(1, 9)));
        store.insert(ItemLogRecord::new(2, at(1, 9)));
        let fwd = forwarder(&store, &settings);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(fwd.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(summary.delivered, 2);
        assert!(store.row(1).unwrap().sent && store.row(2).unwrap().sent);
    }
}
