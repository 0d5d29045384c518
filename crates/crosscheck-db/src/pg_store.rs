//! [`ForwardingStore`] backed by `PostgreSQL`.
//!
//! Stateless: each operation opens a connection from the settings the
//! forwarding loop passes in, runs one statement, and closes it.

use async_trait::async_trait;
use chrono::NaiveDate;

use crosscheck_core::config::DatabaseSettings;
use crosscheck_core::store::{ForwardingStore, StoreError};
use crosscheck_types::ItemLogRecord;

use crate::connection::{self, ConnectionProvider};
use crate::daily_stats_store::DailyStatsStore;
use crate::item_log_store::ItemLogStore;

/// The production store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgForwardingStore;

impl PgForwardingStore {
    /// Create the store.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ForwardingStore for PgForwardingStore {
    async fn select_oldest_unsent(
        &self,
        db: &DatabaseSettings,
    ) -> Result<Option<ItemLogRecord>, StoreError> {
        let mut conn = ConnectionProvider::new(db).open().await?;
        let result = ItemLogStore::new(&mut conn, db).select_oldest_unsent().await;
        connection::close(conn).await;
        Ok(result?)
    }

    async fn mark_sent(&self, db: &DatabaseSettings, id: i64) -> Result<bool, StoreError> {
        let mut conn = ConnectionProvider::new(db).open().await?;
        let result = ItemLogStore::new(&mut conn, db).mark_sent(id).await;
        connection::close(conn).await;
        Ok(result?)
    }

    async fn refresh_daily_stats(
        &self,
        db: &DatabaseSettings,
        date: NaiveDate,
    ) -> Result<u64, StoreError> {
        let mut conn = ConnectionProvider::new(db).open().await?;
        let result = DailyStatsStore::new(&mut conn, db).refresh(date).await;
        connection::close(conn).await;
        Ok(result?)
    }
}
