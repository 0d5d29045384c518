//! Configuration loading and typed settings for the upload agent.
//!
//! Settings live in a single file (`crosscheck-settings.json` by default)
//! with three sections: `Database`, `UploadService`, and `Logging`. Keys are
//! PascalCase so existing plant settings files keep working. A `.yaml` or
//! `.yml` extension switches the parser to YAML; anything else is JSON.
//!
//! Every field has a default, so a section may be partial or missing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable that overrides [`DatabaseSettings::password`].
pub const PASSWORD_ENV: &str = "CROSSCHECK_DB_PASSWORD";

/// Environment variable that overrides [`DatabaseSettings::server`].
pub const SERVER_ENV: &str = "CROSSCHECK_DB_SERVER";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse JSON content.
    #[error("failed to parse settings JSON: {source}")]
    Json {
        /// The underlying JSON parse error.
        #[from]
        source: serde_json::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse settings YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The file parsed but a value is unusable.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level settings, one immutable snapshot per load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    /// Backing store connection and table names.
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Output folders and polling cadence.
    #[serde(default)]
    pub upload_service: UploadSettings,

    /// Log sink settings (read once at startup).
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load, apply environment overrides, and validate a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, a parse error
    /// if the content is malformed, or [`ConfigError::Invalid`] if a value
    /// fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut settings = if is_yaml(path) {
            Self::parse_yaml(&contents)?
        } else {
            Self::parse_json(&contents)?
        };
        settings.database.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] if the string is not valid JSON.
    pub fn parse_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse settings from a YAML string. An empty document yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Reject settings the forwarding loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let db = &self.database;
        if db.item_log_table.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "Database.ItemLogTable",
                reason: "must not be empty",
            });
        }
        if db.daily_stats_table.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "Database.DailyStatsTable",
                reason: "must not be empty",
            });
        }
        if db.server.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "Database.Server",
                reason: "must not be empty",
            });
        }
        let upload = &self.upload_service;
        if upload.csv_output_folder.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "UploadService.CsvOutputFolder",
                reason: "must not be empty",
            });
        }
        if upload.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "UploadService.IntervalMs",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

/// Backing store connection settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseSettings {
    /// Database host name or address.
    #[serde(default = "default_server")]
    pub server: String,

    /// Database TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Login user.
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password. Never logged.
    #[serde(default)]
    pub password: String,

    /// Schema holding both tables.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Item log table name.
    #[serde(default = "default_item_log_table")]
    pub item_log_table: String,

    /// Daily statistics table name.
    #[serde(default = "default_daily_stats_table")]
    pub daily_stats_table: String,

    /// Upper bound on establishing one connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl DatabaseSettings {
    /// Override connection values with environment variables when set.
    ///
    /// Lets a deployment keep the password out of the settings file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(PASSWORD_ENV) {
            self.password = val;
        }
        if let Ok(val) = std::env::var(SERVER_ENV) {
            self.server = val;
        }
    }

    /// Connection timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Redacted connection summary for logs.
    ///
    /// Keeps the first character of the username and masks the rest. The
    /// password is never included.
    pub fn safe_connection_info(&self) -> String {
        format!(
            "Server={}:{}; Database={}; User Id={}",
            self.server,
            self.port,
            self.database_name,
            mask(&self.username)
        )
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &mask(&self.username))
            .field("password", &"<redacted>")
            .field("schema", &self.schema)
            .field("item_log_table", &self.item_log_table)
            .field("daily_stats_table", &self.daily_stats_table)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            database_name: default_database_name(),
            username: default_username(),
            password: String::new(),
            schema: default_schema(),
            item_log_table: default_item_log_table(),
            daily_stats_table: default_daily_stats_table(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn mask(value: &str) -> String {
    let mut chars = value.chars();
    chars.next().map_or_else(String::new, |first| {
        let mut masked = String::with_capacity(value.len());
        masked.push(first);
        masked.extend(chars.map(|_| '*'));
        masked
    })
}

/// Forwarding pipeline settings. Re-read by the loop every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadSettings {
    /// Primary artifact directory.
    #[serde(default = "default_csv_output_folder")]
    pub csv_output_folder: PathBuf,

    /// Optional replica directory receiving a copy of every artifact.
    #[serde(default)]
    pub replica_output_folder: Option<PathBuf>,

    /// Sleep between cycles, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Consecutive failures of the same row between stall alerts; `0` disables them.
    #[serde(default = "default_stall_alert_after")]
    pub stall_alert_after: u32,
}

impl UploadSettings {
    /// Polling interval as a [`Duration`].
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            csv_output_folder: default_csv_output_folder(),
            replica_output_folder: None,
            interval_ms: default_interval_ms(),
            stall_alert_after: default_stall_alert_after(),
        }
    }
}

/// Log sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingSettings {
    /// Directory for the daily log files.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Number of daily files kept before the oldest is deleted.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_log_level(),
            max_files: default_max_files(),
            json: false,
        }
    }
}

// =========================================================================
// Defaults
// =========================================================================

fn default_server() -> String {
    "localhost".to_owned()
}

const fn default_port() -> u16 {
    5432
}

fn default_database_name() -> String {
    "crosscheck".to_owned()
}

fn default_username() -> String {
    "crosscheck".to_owned()
}

fn default_schema() -> String {
    "public".to_owned()
}

fn default_item_log_table() -> String {
    "item_log".to_owned()
}

fn default_daily_stats_table() -> String {
    "daily_stats".to_owned()
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_csv_output_folder() -> PathBuf {
    PathBuf::from("csv")
}

const fn default_interval_ms() -> u64 {
    500
}

const fn default_stall_alert_after() -> u32 {
    20
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_max_files() -> usize {
    7
}
