//! `PostgreSQL` data layer for the `CrossCheck` upload agent.
//!
//! ```text
//! Forwarding cycle (settings snapshot)
//!     |
//!     +-- ConnectionProvider::open -----> one PgConnection per operation
//!         |-- ItemLogStore      (skip-locked select, conditional mark)
//!         +-- DailyStatsStore   (single-statement aggregate upsert)
//! ```
//!
//! # Modules
//!
//! - [`connection`] -- Connection options and timeout-bounded connect
//! - [`ident`] -- Identifier quoting for configured schema and table names
//! - [`item_log_store`] -- Row selection and delivery marking
//! - [`daily_stats_store`] -- Daily statistics refresh and lookup
//! - [`schema`] -- Table DDL for fresh databases
//! - [`pg_store`] -- [`ForwardingStore`] implementation
//! - [`error`] -- Shared error types
//!
//! [`ForwardingStore`]: crosscheck_core::store::ForwardingStore

pub mod connection;
pub mod daily_stats_store;
pub mod error;
pub mod ident;
pub mod item_log_store;
pub mod pg_store;
pub mod schema;

// Re-export primary types for convenience.
pub use connection::ConnectionProvider;
pub use daily_stats_store::DailyStatsStore;
pub use error::DbError;
pub use item_log_store::{ItemLogRow, ItemLogStore};
pub use pg_store::PgForwardingStore;
