//! Shared type definitions for the `CrossCheck` upload agent.
//!
//! This crate is the single source of truth for the shape of an item log
//! row and of the per-day statistics derived from it. The database layer,
//! the CSV materializer, and the forwarding loop all speak these types.
//!
//! # Modules
//!
//! - [`record`] -- One scanned item ([`ItemLogRecord`]) and its column order
//! - [`stats`] -- Daily aggregate counters ([`DailyStats`], [`StatCounter`])

pub mod record;
pub mod stats;

pub use record::{COLUMN_NAMES, ItemLogRecord};
pub use stats::{DailyStats, StatCounter};
