//! Hot-reloadable settings snapshot.
//!
//! The forwarding loop never sees a half-edited configuration: readers take
//! an [`Arc<Settings>`] once per cycle and keep it for the whole cycle,
//! while the reloader publishes a complete replacement. Publication goes
//! through a [`tokio::sync::watch`] channel, which doubles as the change
//! notification for side effects such as creating output directories.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;

/// Shared handle to the current settings snapshot.
///
/// Cloning the cell is cheap; every clone observes the same snapshot.
#[derive(Debug, Clone)]
pub struct SettingsCell {
    tx: Arc<watch::Sender<Arc<Settings>>>,
}

impl SettingsCell {
    /// Create a cell holding `settings` as the initial snapshot.
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(settings));
        Self { tx: Arc::new(tx) }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<Settings> {
        Arc::clone(&self.tx.borrow())
    }

    /// Replace the snapshot. Returns `false` when `settings` equals the
    /// current snapshot, in which case subscribers are not woken.
    pub fn publish(&self, settings: Settings) -> bool {
        self.tx.send_if_modified(|current| {
            if **current == settings {
                false
            } else {
                *current = Arc::new(settings);
                true
            }
        })
    }

    /// A receiver that is notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }

    /// Run `hook` with each newly published snapshot until `cancel` fires.
    ///
    /// Each hook future is awaited before the next change is observed. The
    /// initial snapshot is not replayed; callers apply it themselves at
    /// startup.
    pub fn spawn_change_hook<F, Fut>(
        &self,
        cancel: CancellationToken,
        mut hook: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(Arc<Settings>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = Arc::clone(&rx.borrow_and_update());
                        hook(snapshot).await;
                    }
                }
            }
        })
    }
}
