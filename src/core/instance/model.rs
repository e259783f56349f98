use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Supported mod loaders, strongly typed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Vanilla,
    Forge,
    Fabric,
    NeoForge,
    Quilt,
}

impl std::fmt::Display for LoaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderType::Vanilla => write!(f, "vanilla"),
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::Fabric => write!(f, "fabric"),
            LoaderType::NeoForge => write!(f, "neoforge"),
            LoaderType::Quilt => write!(f, "quilt"),
        }
    }
}

/// Instance metadata persisted to disk as `instance.json`.
///
/// Each instance has its own folder under `instances/<uuid>/` with:
/// - `mods/`: mod JARs (`.jar`, disabled ones renamed `.jar.disabled`)
/// - `mods.json`: the tracked mod list and its cache stamps
/// - `instance.json`: this serialized struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub path: PathBuf,
    pub minecraft_version: String,
    pub loader: LoaderType,

    // ── Internal state ──
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_played: Option<DateTime<Utc>>,
}

impl Instance {
    /// Create a new instance with a fresh UUID. The final path is assigned
    /// by the manager when the instance lands on disk.
    pub fn new(
        name: String,
        minecraft_version: String,
        loader: LoaderType,
        base_dir: &std::path::Path,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let instance_dir = base_dir.join(&id);

        Self {
            name,
            path: instance_dir,
            minecraft_version,
            loader,
            id,
            created_at: Utc::now(),
            last_played: None,
        }
    }

    /// Path to the `mods/` directory.
    pub fn mods_dir(&self) -> PathBuf {
        self.path.join("mods")
    }

    /// Path to the tracked-mods manifest.
    pub fn mods_file_path(&self) -> PathBuf {
        self.path.join("mods.json")
    }

    /// Path to this instance's config file.
    pub fn config_path(&self) -> PathBuf {
        self.path.join("instance.json")
    }
}
