//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which separates "could not
//! reach the database" from "the statement failed". The forwarding loop
//! only sees the coarser [`StoreError`].

use std::time::Duration;

use crosscheck_core::store::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Establishing the connection failed (refused, DNS, TLS, credentials).
    #[error("PostgreSQL connect error: {0}")]
    Connect(#[source] sqlx::Error),

    /// Establishing the connection took longer than the configured limit.
    #[error("PostgreSQL connect timed out after {after:?}")]
    Timeout {
        /// The configured connect timeout.
        after: Duration,
        /// The elapsed timer.
        source: tokio::time::error::Elapsed,
    },

    /// A statement failed on an open connection.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
}

impl DbError {
    /// Whether the failure means the database was unreachable.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout { .. } => true,
            Self::Postgres(e) => is_connection_error(e),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_connection() {
            Self::Connection(err.to_string())
        } else {
            Self::Query(err.to_string())
        }
    }
}

/// Transport failures and SQLSTATE classes 08 (connection exception),
/// 28 (invalid authorization), and 57P (operator intervention).
fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            code.starts_with("08") || code.starts_with("28") || code.starts_with("57P")
        }),
        _ => false,
    }
}
