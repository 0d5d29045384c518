//! Upload agent binary for `CrossCheck`.
//!
//! Drains unsent item log rows from `PostgreSQL` into one CSV file per row,
//! marks each row sent, and keeps the daily statistics table current. Runs
//! until Ctrl-C or SIGTERM.
//!
//! # Startup Sequence
//!
//! 1. Load settings from `$CROSSCHECK_SETTINGS` (default
//!    `crosscheck-settings.json`)
//! 2. Initialize logging (stdout plus daily rolling file)
//! 3. Create the output folders
//! 4. Start the settings watcher and the change hook
//! 5. Install the shutdown signal handler
//! 6. Run the forwarding loop until cancelled

mod error;
mod logging;
mod reload;

use std::path::PathBuf;

use crosscheck_core::config::Settings;
use crosscheck_core::forwarder::Forwarder;
use crosscheck_core::materializer::{Materializer, ensure_output_dirs};
use crosscheck_core::settings::SettingsCell;
use crosscheck_db::PgForwardingStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AgentError;

/// Environment variable naming the settings file.
const SETTINGS_ENV: &str = "CROSSCHECK_SETTINGS";

/// Settings file used when [`SETTINGS_ENV`] is unset.
const DEFAULT_SETTINGS_PATH: &str = "crosscheck-settings.json";

/// Application entry point for the upload agent.
///
/// # Errors
///
/// Returns an error if the settings cannot be loaded or logging cannot be
/// initialized. Per-cycle failures are logged and never end the process.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load settings. Logging is not configured yet, so failures go to a
    //    stdout-only subscriber.
    let settings_path = settings_path();
    let settings = match Settings::from_file(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init_fallback();
            error!(
                path = %settings_path.display(),
                error = %e,
                "Failed to load settings"
            );
            return Err(AgentError::from(e).into());
        }
    };

    // 2. Initialize logging.
    let _log_guard = logging::init(&settings.logging)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        settings = %settings_path.display(),
        "crosscheck-agent starting"
    );
    info!(
        target_db = %settings.database.safe_connection_info(),
        schema = %settings.database.schema,
        item_log = %settings.database.item_log_table,
        daily_stats = %settings.database.daily_stats_table,
        "Database target"
    );

    // 3. Output folders. Missing folders are retried on every write.
    if !ensure_output_dirs(&settings.upload_service).await {
        warn!("Output folders not ready; writes will retry each cycle");
    }

    // 4. Hot reload.
    let cell = SettingsCell::new(settings);
    let cancel = CancellationToken::new();
    let hook = cell.spawn_change_hook(cancel.clone(), |s| async move {
        ensure_output_dirs(&s.upload_service).await;
    });
    let watcher = match reload::spawn(settings_path, cell.clone(), cancel.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Settings watcher unavailable; hot reload disabled");
            None
        }
    };

    // 5. Shutdown signals.
    tokio::spawn(shutdown_signal(cancel.clone()));

    // 6. Run.
    let forwarder = Forwarder::new(PgForwardingStore::new(), Materializer::new(), cell);
    let summary = forwarder.run(cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = hook.await {
        warn!(error = %e, "Settings change hook ended abnormally");
    }
    if let Some(handle) = watcher {
        if let Err(e) = handle.await {
            warn!(error = %e, "Settings watcher ended abnormally");
        }
    }

    info!(
        cycles = summary.cycles,
        delivered = summary.delivered,
        already_sent = summary.already_sent,
        failed = summary.failed,
        "crosscheck-agent shutdown complete"
    );
    Ok(())
}

/// Settings file path from the environment, or the default.
fn settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH), PathBuf::from)
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received, stopping"),
        () = terminate => info!("SIGTERM received, stopping"),
        () = cancel.cancelled() => return,
    }
    cancel.cancel();
}
