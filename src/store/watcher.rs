//! Secret file watcher.
//!
//! Watches the directory holding the store file (writes go through a rename,
//! which replaces the watched inode) and fires a callback when the file
//! changes. The sidecar uses it as an extra invalidation signal.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A watcher that reports changes of one store file.
pub struct StoreWatcher {
    path: PathBuf,
}

impl StoreWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run<F>(self, on_change: F) -> Result<RecommendedWatcher, notify::Error>
    where
        F: Fn() + Send + 'static,
    {
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        tracing::info!("Secret store file changed, invalidating accepted set");
                        on_change();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Store watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Store watcher started");
        Ok(watcher)
    }
}
