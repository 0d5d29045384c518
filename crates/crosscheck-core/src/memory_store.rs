//! In-memory [`ForwardingStore`] used to drive the forwarding loop in tests
//! and dry runs.
//!
//! Mirrors the production store's contract: selection skips rows another
//! session has locked, marking is a conditional flip, and a refresh
//! recomputes the whole day from the rows. Failures can be injected per
//! operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use crosscheck_types::{DailyStats, ItemLogRecord};

use crate::config::DatabaseSettings;
use crate::store::{ForwardingStore, StoreError};

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<i64, ItemLogRecord>,
    stats: BTreeMap<NaiveDate, DailyStats>,
    locked: BTreeSet<i64>,
    refreshes: Vec<NaiveDate>,
    fail_selects: u32,
    fail_marks: u32,
    fail_refreshes: u32,
}

/// Thread-safe in-memory row store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a row.
    pub fn insert(&self, record: ItemLogRecord) {
        self.state().rows.insert(record.id, record);
    }

    /// Pretend another session holds a row lock on `id`.
    pub fn lock(&self, id: i64) {
        self.state().locked.insert(id);
    }

    /// Release a lock taken with [`MemoryStore::lock`].
    pub fn unlock(&self, id: i64) {
        self.state().locked.remove(&id);
    }

    /// Current copy of a row.
    pub fn row(&self, id: i64) -> Option<ItemLogRecord> {
        self.state().rows.get(&id).cloned()
    }

    /// Last refreshed statistics for `date`.
    pub fn stats(&self, date: NaiveDate) -> Option<DailyStats> {
        self.state().stats.get(&date).cloned()
    }

    /// Every date refreshed so far, in call order.
    pub fn refreshed_dates(&self) -> Vec<NaiveDate> {
        self.state().refreshes.clone()
    }

    /// Make the next `n` selections fail with a connection error.
    pub fn fail_next_selects(&self, n: u32) {
        self.state().fail_selects = n;
    }

    /// Make the next `n` marks fail with a connection error.
    pub fn fail_next_marks(&self, n: u32) {
        self.state().fail_marks = n;
    }

    /// Make the next `n` refreshes fail with a query error.
    pub fn fail_next_refreshes(&self, n: u32) {
        self.state().fail_refreshes = n;
    }
}

fn take_failure(budget: &mut u32) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget = budget.saturating_sub(1);
    true
}

#[async_trait]
impl ForwardingStore for MemoryStore {
    async fn select_oldest_unsent(
        &self,
        _db: &DatabaseSettings,
    ) -> Result<Option<ItemLogRecord>, StoreError> {
        let mut state = self.state();
        if take_failure(&mut state.fail_selects) {
            return Err(StoreError::Connection("injected select failure".to_owned()));
        }
        Ok(state
            .rows
            .values()
            .find(|r| !r.sent && !state.locked.contains(&r.id))
            .cloned())
    }

    async fn mark_sent(&self, _db: &DatabaseSettings, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state();
        if take_failure(&mut state.fail_marks) {
            return Err(StoreError::Connection("injected mark failure".to_owned()));
        }
        Ok(match state.rows.get_mut(&id) {
            Some(row) if !row.sent => {
                row.sent = true;
                true
            }
            _ => false,
        })
    }

    async fn refresh_daily_stats(
        &self,
        _db: &DatabaseSettings,
        date: NaiveDate,
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        if take_failure(&mut state.fail_refreshes) {
            return Err(StoreError::Query("injected refresh failure".to_owned()));
        }
        let stats = DailyStats::tally(date, state.rows.values());
        state.stats.insert(date, stats);
        state.refreshes.push(date);
        Ok(1)
    }
}
