//! Settings hot reload.
//!
//! Watches the directory holding the settings file (editors often replace
//! the file rather than write it in place), waits for a quiet period after
//! the last change, then re-reads and publishes. A file that fails to parse
//! or validate is rejected and the previous snapshot stays in effect.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crosscheck_core::config::Settings;
use crosscheck_core::settings::SettingsCell;

use crate::error::AgentError;

/// Quiet period after the last file event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Result of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new snapshot was published.
    Applied,
    /// The file parsed to the settings already in effect.
    Unchanged,
    /// The file could not be loaded; the previous snapshot is kept.
    Rejected,
}

/// Re-read `path` and publish it to `cell` if it is valid and different.
pub fn reload(path: &Path, cell: &SettingsCell) -> ReloadOutcome {
    let settings = match Settings::from_file(path) {
        Ok(settings) => settings,
        Err(e) => {
            error!(
                path = %path.display(),
                error = %e,
                "Settings reload failed; keeping previous settings"
            );
            return ReloadOutcome::Rejected;
        }
    };

    let previous = cell.current();
    if settings.logging != previous.logging {
        warn!("Logging settings changed; they take effect after a restart");
    }
    let interval_ms = settings.upload_service.interval_ms;
    let output = settings.upload_service.csv_output_folder.clone();

    if cell.publish(settings) {
        info!(
            path = %path.display(),
            interval_ms,
            output = %output.display(),
            "Settings reloaded"
        );
        ReloadOutcome::Applied
    } else {
        debug!(path = %path.display(), "Settings file touched without changes");
        ReloadOutcome::Unchanged
    }
}

/// Watch `path` and reload it into `cell` until `cancel` fires.
///
/// # Errors
///
/// Returns [`AgentError::Watch`] if the file system watcher cannot be
/// created or the directory cannot be watched.
pub fn spawn(
    path: PathBuf,
    cell: SettingsCell,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, AgentError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
    let file_name = path.file_name().map(OsString::from);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok_and(|event| concerns(&event, file_name.as_deref())) {
            let _ = event_tx.send(());
        }
    })?;
    let dir = watch_dir(&path);
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "Watching settings file for changes");

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops event delivery.
        let _watcher = watcher;
        let mut pending = false;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = event_rx.recv() => match event {
                    Some(()) => pending = true,
                    None => break,
                },
                () = tokio::time::sleep(DEBOUNCE), if pending => {
                    pending = false;
                    reload(&path, &cell);
                }
            }
        }
        debug!("Settings watcher stopped");
    }))
}

/// Whether `event` touches the settings file.
fn concerns(event: &notify::Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    let Some(name) = file_name else {
        return true;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

/// Directory to watch: the file's parent, or the working directory.
fn watch_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
