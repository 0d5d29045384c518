//! Store trait and the per-operation error it reports.
//!
//! During a cycle the forwarding loop talks to the backing store through
//! [`ForwardingStore`]. The trait abstracts where rows live -- `PostgreSQL`
//! in production, an in-memory map in tests -- so the loop's branching can
//! be exercised without a database.

use async_trait::async_trait;
use chrono::NaiveDate;
use crosscheck_types::ItemLogRecord;

use crate::config::DatabaseSettings;

/// Errors reported by a [`ForwardingStore`] operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached, timed out, or rejected credentials.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store was reachable but the statement failed (schema mismatch,
    /// constraint violation, malformed identifier).
    #[error("query error: {0}")]
    Query(String),
}

/// Backing store operations used by the forwarding loop.
///
/// Every method receives the database settings of the cycle's snapshot so
/// an implementation never mixes two configurations within one cycle.
#[async_trait]
pub trait ForwardingStore: Send + Sync {
    /// The unsent row with the smallest id, skipping rows locked by other
    /// writers. `None` when the backlog is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    async fn select_oldest_unsent(
        &self,
        db: &DatabaseSettings,
    ) -> Result<Option<ItemLogRecord>, StoreError>;

    /// Flip `sent` from false to true for `id`. Returns `true` only when
    /// this call performed the transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update could not be executed.
    async fn mark_sent(&self, db: &DatabaseSettings, id: i64) -> Result<bool, StoreError>;

    /// Recompute and upsert the statistics row for `date`, returning the
    /// number of statistics rows written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the refresh statement fails.
    async fn refresh_daily_stats(
        &self,
        db: &DatabaseSettings,
        date: NaiveDate,
    ) -> Result<u64, StoreError>;
}
