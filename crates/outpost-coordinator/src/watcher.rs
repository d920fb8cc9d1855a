//! ---
//! upd_section: "06-coordinator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Privileged execution of component scripts."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! Request directory watchers.
//!
//! The coordinator reacts to new request files. The default backend bridges
//! OS file notifications into the async runtime; the polling backend exists
//! for filesystems where inotify is unavailable and as a deterministic
//! stand-in for tests. Either way the watcher is only a wake-up signal: the
//! run loop always rescans the directory, so missed or duplicated events are
//! harmless.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Source of wake-up signals for the request directory.
#[async_trait::async_trait]
pub trait DirectoryWatcher: Send {
    /// Wait for the next signal. `None` means the watcher has shut down.
    async fn next(&mut self) -> Option<PathBuf>;
}

/// Inotify-backed watcher over the request directory.
pub struct NotifyWatcher {
    // Dropping the watcher detaches the OS subscription.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<PathBuf>,
}

impl NotifyWatcher {
    /// Subscribe to creations and modifications under `dir`.
    pub fn new(dir: &Path) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("json") {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(err) => warn!(error = %err, "request directory watch error"),
            })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "request directory watch established");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }
}

#[async_trait::async_trait]
impl DirectoryWatcher for NotifyWatcher {
    async fn next(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }
}

/// Fixed-cadence watcher that signals unconditionally.
pub struct PollingWatcher {
    dir: PathBuf,
    interval: Duration,
}

impl PollingWatcher {
    #[must_use]
    pub fn new(dir: &Path, interval: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            interval,
        }
    }
}

#[async_trait::async_trait]
impl DirectoryWatcher for PollingWatcher {
    async fn next(&mut self) -> Option<PathBuf> {
        tokio::time::sleep(self.interval).await;
        Some(self.dir.clone())
    }
}
