//! Hot-reload watcher for the config file.
//!
//! Uses the `notify` crate to watch the directory containing the config
//! document. On create/modify/remove events touching the file, the
//! [`ConfigStore`] re-parses it and atomically swaps the snapshot; parse
//! failures keep the previous snapshot in effect and log a warning.
//!
//! The watcher must stay alive for as long as hot-reload is needed —
//! dropping it stops the underlying OS watch.

use std::path::Path;
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::config::ConfigStore;
use crate::{AppError, Result};

/// Returns `true` for file-system events that indicate the watched file was
/// written or replaced (create, modify, remove).
fn is_config_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// File watcher that drives [`ConfigStore::reload`] on changes.
pub struct ConfigWatcher {
    /// Underlying notify watcher — kept alive by owning it here.
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching the store's config path.
    ///
    /// The directory containing the file is watched (not the file itself)
    /// so that atomic rename-based writes are detected. Falls back to
    /// watching the file directly when the parent is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the `notify` watcher cannot be created
    /// or the path cannot be watched.
    pub fn spawn(store: Arc<ConfigStore>) -> Result<Self> {
        let config_path = store.path().to_path_buf();
        let path_for_callback = config_path.clone();

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) if is_config_change(&event) => {
                    let affects_config = event.paths.is_empty()
                        || event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == path_for_callback.file_name());
                    if !affects_config {
                        return;
                    }
                    match store.reload() {
                        Ok(()) => {
                            info!(path = %path_for_callback.display(), "config reloaded");
                        }
                        Err(err) => {
                            warn!(
                                %err,
                                path = %path_for_callback.display(),
                                "config reload failed — keeping previous snapshot"
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "config file watcher error");
                }
                _ => {}
            },
        )
        .map_err(|err| AppError::Config(format!("failed to create config file watcher: {err}")))?;

        let watch_target = config_path
            .parent()
            .filter(|p| p != &Path::new(""))
            .unwrap_or(&config_path);

        watcher
            .watch(watch_target, RecursiveMode::NonRecursive)
            .map_err(|err| {
                AppError::Config(format!(
                    "failed to watch config path '{}': {err}",
                    watch_target.display()
                ))
            })?;

        info!(path = %config_path.display(), "config watcher started");

        Ok(Self { _watcher: watcher })
    }
}
