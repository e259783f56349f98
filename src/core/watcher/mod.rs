use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tauri::AppHandle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::emit_mods_folder_changed;

/// Buffered events between the notify callback thread and the
/// forwarder task. Bursts beyond this (mass file copies) are dropped;
/// the frontend refreshes on the events that do land.
const EVENT_CHANNEL_CAPACITY: usize = 100;

struct WatcherHandle {
    // Held so the OS watch lives exactly as long as the entry.
    _watcher: RecommendedWatcher,
    forwarder: JoinHandle<()>,
}

/// One filesystem watcher per instance mods folder, keyed by instance
/// id. Starting a watcher for an id that already has one replaces it.
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: Mutex<HashMap<String, WatcherHandle>>,
}

impl WatcherRegistry {
    /// Watch an instance's `mods/` directory and forward jar changes to
    /// the frontend as `mods_folder_changed` events.
    pub async fn start(
        &self,
        app_handle: AppHandle,
        instance_id: &str,
        mods_dir: PathBuf,
    ) -> LauncherResult<()> {
        tokio::fs::create_dir_all(&mods_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: mods_dir.clone(),
                source: e,
            })?;

        let (tx, mut rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    // try_send: the notify callback thread must never block.
                    let _ = tx.try_send(event);
                }
            })?;
        watcher.watch(&mods_dir, RecursiveMode::NonRecursive)?;

        let task_app = app_handle;
        let task_instance = instance_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for (change, file_name) in classify_event(&event) {
                    debug!("Mods folder change in {}: {} {}", task_instance, change, file_name);
                    emit_mods_folder_changed(&task_app, &task_instance, change, &file_name);
                }
            }
        });

        let mut watchers = self.watchers.lock().await;
        if let Some(old) = watchers.insert(
            instance_id.to_string(),
            WatcherHandle {
                _watcher: watcher,
                forwarder,
            },
        ) {
            old.forwarder.abort();
        }
        info!("Watching mods folder of {} ({})", instance_id, mods_dir.display());
        Ok(())
    }

    /// Stop watching an instance. A no-op if nothing was watching it.
    pub async fn stop(&self, instance_id: &str) {
        let removed = self.watchers.lock().await.remove(instance_id);
        if let Some(handle) = removed {
            handle.forwarder.abort();
            debug!("Stopped mods watcher for {}", instance_id);
        }
    }
}

/// Translate a raw notify event into `(change, file_name)` pairs for
/// the frontend. Only jar files (either name form) pass the filter,
/// which also keeps in-progress `.part` downloads invisible.
fn classify_event(event: &Event) -> Vec<(&'static str, String)> {
    let mut changes: Vec<(&'static str, &Path)> = Vec::new();
    match &event.kind {
        EventKind::Create(_) => {
            changes.extend(event.paths.iter().map(|p| ("created", p.as_path())));
        }
        EventKind::Remove(_) => {
            changes.extend(event.paths.iter().map(|p| ("removed", p.as_path())));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            changes.extend(event.paths.iter().map(|p| ("removed", p.as_path())));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            changes.extend(event.paths.iter().map(|p| ("created", p.as_path())));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                changes.push(("removed", from.as_path()));
                changes.push(("created", to.as_path()));
            } else {
                changes.extend(event.paths.iter().map(|p| ("modified", p.as_path())));
            }
        }
        EventKind::Modify(_) => {
            changes.extend(event.paths.iter().map(|p| ("modified", p.as_path())));
        }
        // Access events carry no folder-content change.
        _ => {}
    }

    changes
        .into_iter()
        .filter_map(|(change, path)| jar_file_name(path).map(|name| (change, name)))
        .collect()
}

fn jar_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(".jar") || name.ends_with(".jar.disabled") {
        Some(name.to_string())
    } else {
        None
    }
}
