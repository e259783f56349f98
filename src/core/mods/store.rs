use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::Instance;

use super::model::ModsFile;

/// On-disk store for per-instance `mods.json`, plus one async lock per
/// instance so read-modify-write sequences don't interleave.
///
/// Reads are plain snapshots; anything that mutates takes the instance
/// lock first and holds it across load, mutation and save.
pub struct ModStore {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ModStore {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the write lock for one instance. The guard is owned so it
    /// can cross await points inside a pipeline operation.
    pub async fn lock_instance(&self, instance_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(instance_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a deleted instance.
    pub async fn forget(&self, instance_id: &str) {
        self.locks.lock().await.remove(instance_id);
    }

    /// Load the tracked-mods file. Missing and corrupt files both come
    /// back as the empty default: the next folder sync rebuilds the list
    /// from what is actually on disk.
    pub async fn load(&self, instance: &Instance) -> LauncherResult<ModsFile> {
        let path = instance.mods_file_path();
        if !path.exists() {
            return Ok(ModsFile::default());
        }

        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LauncherError::Io {
                path: path.clone(),
                source: e,
            })?;

        match serde_json::from_str(&json) {
            Ok(file) => Ok(file),
            Err(e) => {
                warn!("Corrupt mods.json at {:?}: {}", path, e);
                Ok(ModsFile::default())
            }
        }
    }

    pub async fn save(&self, instance: &Instance, file: &ModsFile) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(file)?;
        let path = instance.mods_file_path();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LauncherError::Io { path, source: e })
    }
}

impl Default for ModStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::LoaderType;
    use crate::core::mods::model::ModRecord;
    use std::time::Duration;

    fn temp_instance() -> (tempfile::TempDir, Instance) {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::new(
            "Store test".to_string(),
            "1.21.1".to_string(),
            LoaderType::Fabric,
            dir.path(),
        );
        std::fs::create_dir_all(&instance.path).unwrap();
        (dir, instance)
    }

    #[tokio::test]
    async fn missing_file_loads_as_default() {
        let (_guard, instance) = temp_instance();
        let store = ModStore::new();
        let file = store.load(&instance).await.unwrap();
        assert!(file.mods.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let (_guard, instance) = temp_instance();
        let store = ModStore::new();

        let mut file = ModsFile::default();
        file.mods
            .push(ModRecord::for_local_file("sodium.jar".to_string(), 42, true));
        file.folder_stamp_ms = Some(1_700_000_000_000);
        store.save(&instance, &file).await.unwrap();

        let loaded = store.load(&instance).await.unwrap();
        assert_eq!(loaded.mods.len(), 1);
        assert_eq!(loaded.mods[0].file_name, "sodium.jar");
        assert_eq!(loaded.folder_stamp_ms, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_default() {
        let (_guard, instance) = temp_instance();
        std::fs::write(instance.mods_file_path(), "{broken").unwrap();

        let store = ModStore::new();
        let file = store.load(&instance).await.unwrap();
        assert!(file.mods.is_empty());
    }

    #[tokio::test]
    async fn instance_lock_serializes_writers() {
        let store = Arc::new(ModStore::new());
        let held = store.lock_instance("abc").await;

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock_instance("abc"),
        )
        .await;
        assert!(blocked.is_err(), "second lock should wait for the first");

        // A different instance is unaffected
        let other = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock_instance("xyz"),
        )
        .await;
        assert!(other.is_ok());

        drop(held);
        let reacquired = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock_instance("abc"),
        )
        .await;
        assert!(reacquired.is_ok());
    }
}
