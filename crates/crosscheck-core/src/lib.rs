//! Settings, CSV materialization, and the forwarding loop for the `CrossCheck`
//! upload agent.
//!
//! The loop drains unsent item log rows one at a time: select the oldest,
//! write it to a CSV file, mark it sent, and refresh the day's statistics.
//! The database sits behind the [`ForwardingStore`] trait so the loop runs
//! unchanged against `PostgreSQL` or [`MemoryStore`].
//!
//! # Modules
//!
//! - [`config`] -- Settings file loading (JSON or YAML) into typed structs.
//! - [`settings`] -- [`SettingsCell`], the hot-reloadable snapshot.
//! - [`encoding`] -- Row to CSV line, quoting, file naming.
//! - [`materializer`] -- Primary and replica artifact writes.
//! - [`store`] -- [`ForwardingStore`] trait and [`StoreError`].
//! - [`memory_store`] -- In-memory [`ForwardingStore`].
//! - [`error`] -- [`ForwardError`] and the cycle [`Stage`].
//! - [`forwarder`] -- [`Forwarder`] and [`CycleOutcome`].
//!
//! [`ForwardingStore`]: store::ForwardingStore
//! [`StoreError`]: store::StoreError
//! [`MemoryStore`]: memory_store::MemoryStore
//! [`SettingsCell`]: settings::SettingsCell
//! [`ForwardError`]: error::ForwardError
//! [`Stage`]: error::Stage
//! [`Forwarder`]: forwarder::Forwarder
//! [`CycleOutcome`]: forwarder::CycleOutcome

pub mod config;
pub mod encoding;
pub mod error;
pub mod forwarder;
pub mod materializer;
pub mod memory_store;
pub mod settings;
pub mod store;
