//! Error types for the upload agent binary.
//!
//! [`AgentError`] covers everything that can stop the agent before the
//! forwarding loop starts. Once the loop runs, failures are per cycle and
//! never reach `main`.

/// Top-level error for the upload agent binary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The settings file could not be loaded.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crosscheck_core::config::ConfigError,
    },

    /// The log directory could not be prepared.
    #[error("log directory error: {source}")]
    LogDirectory {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The rolling log file could not be opened.
    #[error("log file error: {source}")]
    LogFile {
        /// The underlying appender error.
        #[from]
        source: tracing_appender::rolling::InitError,
    },

    /// A global subscriber was already installed.
    #[error("logging init error: {source}")]
    Subscriber {
        /// The underlying subscriber error.
        #[from]
        source: tracing_subscriber::util::TryInitError,
    },

    /// The settings file watcher could not be started.
    #[error("settings watcher error: {source}")]
    Watch {
        /// The underlying notify error.
        #[from]
        source: notify::Error,
    },
}
