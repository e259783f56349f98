use std::path::{Path, PathBuf};

use tracing::info;

use super::model::Instance;
use crate::core::error::{LauncherError, LauncherResult};

/// Manages the lifecycle of instances on disk.
pub struct InstanceManager {
    /// Root directory where all instances live.
    instances_dir: PathBuf,
}

impl InstanceManager {
    pub fn new(instances_dir: PathBuf) -> Self {
        Self { instances_dir }
    }

    /// Create a new instance on disk with its subdirectory structure.
    ///
    /// Creates:
    /// - `<instance>/mods/`
    /// - `<instance>/instance.json`
    pub async fn create(&self, mut instance: Instance) -> LauncherResult<Instance> {
        // Set the path based on our instances directory
        instance.path = self.instances_dir.join(&instance.id);

        // Check for collision (extremely unlikely with UUID)
        if instance.path.exists() {
            return Err(LauncherError::InstanceAlreadyExists(instance.id.clone()));
        }

        // Create directory structure eagerly so first sync cannot fail on it.
        create_dir_safe(&instance.mods_dir()).await?;

        self.verify_structure(&instance).await?;

        // Persist instance.json
        self.save(&instance).await?;

        info!("Created instance '{}' ({})", instance.name, instance.id);
        Ok(instance)
    }

    pub async fn verify_structure(&self, instance: &Instance) -> LauncherResult<()> {
        for subdir in ["mods"] {
            let path = instance.path.join(subdir);
            let metadata =
                tokio::fs::metadata(&path)
                    .await
                    .map_err(|source| LauncherError::Io {
                        path: path.clone(),
                        source,
                    })?;
            if !metadata.is_dir() {
                return Err(LauncherError::Other(format!(
                    "Invalid instance structure: {:?} is not a directory",
                    path
                )));
            }
        }

        Ok(())
    }

    /// Save instance metadata to disk.
    pub async fn save(&self, instance: &Instance) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(instance)?;
        let config_path = instance.config_path();

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        tokio::fs::write(&config_path, json)
            .await
            .map_err(|e| LauncherError::Io {
                path: config_path,
                source: e,
            })?;

        Ok(())
    }

    /// Load a single instance by ID.
    pub async fn load(&self, id: &str) -> LauncherResult<Instance> {
        let config_path = self.instances_dir.join(id).join("instance.json");
        if !config_path.exists() {
            return Err(LauncherError::InstanceNotFound(id.to_string()));
        }

        let json =
            tokio::fs::read_to_string(&config_path)
                .await
                .map_err(|e| LauncherError::Io {
                    path: config_path.clone(),
                    source: e,
                })?;

        let instance: Instance = serde_json::from_str(&json)?;
        Ok(instance)
    }

    /// List all instances.
    pub async fn list(&self) -> LauncherResult<Vec<Instance>> {
        let mut instances = Vec::new();

        if !self.instances_dir.exists() {
            return Ok(instances);
        }

        let mut entries = tokio::fs::read_dir(&self.instances_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: self.instances_dir.clone(),
                source: e,
            })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| LauncherError::Io {
            path: self.instances_dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            if path.is_dir() {
                let config_path = path.join("instance.json");
                if config_path.exists() {
                    match tokio::fs::read_to_string(&config_path).await {
                        Ok(json) => match serde_json::from_str::<Instance>(&json) {
                            Ok(inst) => instances.push(inst),
                            Err(e) => {
                                tracing::warn!("Corrupt instance.json at {:?}: {}", config_path, e);
                            }
                        },
                        Err(e) => {
                            tracing::warn!("Cannot read {:?}: {}", config_path, e);
                        }
                    }
                }
            }
        }

        Ok(instances)
    }

    /// Delete an instance from disk.
    pub async fn delete(&self, id: &str) -> LauncherResult<()> {
        let instance_dir = self.instances_dir.join(id);
        if !instance_dir.exists() {
            return Err(LauncherError::InstanceNotFound(id.to_string()));
        }

        tokio::fs::remove_dir_all(&instance_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: instance_dir,
                source: e,
            })?;

        info!("Deleted instance {}", id);
        Ok(())
    }

    /// Total size in bytes of everything under the instance directory.
    /// Iterative walk so deeply nested config trees can't blow the stack.
    pub async fn total_size_bytes(&self, id: &str) -> LauncherResult<u64> {
        let instance_dir = self.instances_dir.join(id);
        if !instance_dir.exists() {
            return Err(LauncherError::InstanceNotFound(id.to_string()));
        }

        let mut total: u64 = 0;
        let mut pending = vec![instance_dir];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| LauncherError::Io {
                    path: dir.clone(),
                    source: e,
                })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| LauncherError::Io {
                path: dir.clone(),
                source: e,
            })? {
                let metadata = entry.metadata().await.map_err(|e| LauncherError::Io {
                    path: entry.path(),
                    source: e,
                })?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else {
                    total = total.saturating_add(metadata.len());
                }
            }
        }

        Ok(total)
    }

    /// Helper: canonicalize a path, adding `\\?\` prefix on Windows.
    pub fn safe_path(path: &Path) -> PathBuf {
        match std::fs::canonicalize(path) {
            Ok(p) => p,
            Err(_) => path.to_path_buf(),
        }
    }
}

async fn create_dir_safe(path: &Path) -> LauncherResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| LauncherError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::model::LoaderType;

    fn temp_manager() -> (tempfile::TempDir, InstanceManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = InstanceManager::new(dir.path().join("instances"));
        (dir, manager)
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let (_guard, manager) = temp_manager();
        let instance = Instance::new(
            "Test".to_string(),
            "1.21.1".to_string(),
            LoaderType::Fabric,
            Path::new("unused"),
        );

        let created = manager.create(instance).await.unwrap();
        assert!(created.mods_dir().is_dir());

        let loaded = manager.load(&created.id).await.unwrap();
        assert_eq!(loaded.name, "Test");
        assert_eq!(loaded.loader, LoaderType::Fabric);
        assert_eq!(loaded.path, created.path);
    }

    #[tokio::test]
    async fn list_skips_corrupt_instance_json() {
        let (_guard, manager) = temp_manager();
        let good = Instance::new(
            "Good".to_string(),
            "1.20.4".to_string(),
            LoaderType::Forge,
            Path::new("unused"),
        );
        manager.create(good).await.unwrap();

        let bad_dir = manager.instances_dir.join("broken");
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join("instance.json"), "{not json").unwrap();

        let listed = manager.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Good");
    }

    #[tokio::test]
    async fn delete_missing_instance_is_an_error() {
        let (_guard, manager) = temp_manager();
        let err = manager.delete("nope").await.unwrap_err();
        assert!(matches!(err, LauncherError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn total_size_counts_nested_files() {
        let (_guard, manager) = temp_manager();
        let instance = Instance::new(
            "Sized".to_string(),
            "1.21.1".to_string(),
            LoaderType::Quilt,
            Path::new("unused"),
        );
        let created = manager.create(instance).await.unwrap();

        std::fs::write(created.mods_dir().join("a.jar"), vec![0u8; 100]).unwrap();
        let nested = created.path.join("config").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.toml"), vec![0u8; 50]).unwrap();

        let size = manager.total_size_bytes(&created.id).await.unwrap();
        // instance.json counts too, so at least the two files we wrote
        assert!(size >= 150);
    }
}
