//! Per-operation connections built from the current settings snapshot.
//!
//! The agent does not keep a pool: every store operation opens its own
//! connection from the [`DatabaseSettings`] of the running cycle and closes
//! it afterwards, so an edited settings file takes effect on the next
//! cycle without a restart.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use crosscheck_core::config::DatabaseSettings;

use crate::error::DbError;

/// Application name reported to the server in `pg_stat_activity`.
const APPLICATION_NAME: &str = "crosscheck-agent";

/// Opens connections for one settings snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionProvider<'a> {
    settings: &'a DatabaseSettings,
}

impl<'a> ConnectionProvider<'a> {
    /// Create a provider bound to `settings`.
    pub const fn new(settings: &'a DatabaseSettings) -> Self {
        Self { settings }
    }

    /// Connection options derived from the settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        let s = self.settings;
        let options = PgConnectOptions::new()
            .host(&s.server)
            .port(s.port)
            .database(&s.database_name)
            .username(&s.username)
            .application_name(APPLICATION_NAME);
        if s.password.is_empty() {
            options
        } else {
            options.password(&s.password)
        }
    }

    /// Open a connection, bounded by the configured connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Timeout`] if the server does not answer in time,
    /// or [`DbError::Connect`] if it refuses the connection.
    pub async fn open(&self) -> Result<PgConnection, DbError> {
        let limit = self.settings.connect_timeout();
        let options = self.connect_options();
        let conn = tokio::time::timeout(limit, PgConnection::connect_with(&options))
            .await
            .map_err(|source| DbError::Timeout {
                after: limit,
                source,
            })?
            .map_err(DbError::Connect)?;

        tracing::trace!(server = %self.describe(), "Opened PostgreSQL connection");
        Ok(conn)
    }

    /// Redacted description of the target for logs.
    pub fn describe(&self) -> String {
        self.settings.safe_connection_info()
    }
}

/// Close `conn`, logging instead of failing.
pub async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Closing PostgreSQL connection failed");
    }
}
