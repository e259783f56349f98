use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::instance::InstanceManager;
use crate::core::mods::ModService;
use crate::core::watcher::WatcherRegistry;

const APP_DIR_NAME: &str = "Molten";
const SETTINGS_FILE: &str = "launcher_settings.json";

pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es"];
pub const MIN_CONCURRENT_DOWNLOADS: usize = 1;
pub const MAX_CONCURRENT_DOWNLOADS: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub language: String,
    pub custom_java_path: Option<PathBuf>,
    pub concurrent_downloads: usize,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            custom_java_path: None,
            concurrent_downloads: 8,
        }
    }
}

impl LauncherSettings {
    /// Reject a settings payload before it reaches state or disk.
    pub fn validate(&self) -> LauncherResult<()> {
        if !SUPPORTED_LANGUAGES.contains(&self.language.as_str()) {
            return Err(LauncherError::InvalidSetting(format!(
                "Unsupported language: {}",
                self.language
            )));
        }
        if !(MIN_CONCURRENT_DOWNLOADS..=MAX_CONCURRENT_DOWNLOADS)
            .contains(&self.concurrent_downloads)
        {
            return Err(LauncherError::InvalidSetting(format!(
                "concurrent_downloads must be between {MIN_CONCURRENT_DOWNLOADS} and {MAX_CONCURRENT_DOWNLOADS}"
            )));
        }
        if let Some(path) = &self.custom_java_path {
            if !path.is_file() {
                return Err(LauncherError::InvalidSetting(format!(
                    "Java binary not found: {}",
                    path.display()
                )));
            }
            let looks_like_java = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_ascii_lowercase().contains("java"))
                .unwrap_or(false);
            if !looks_like_java {
                return Err(LauncherError::InvalidSetting(format!(
                    "{} does not look like a Java binary",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Global application state managed by Tauri.
///
/// Unlike a single state-wide mutex, every field here synchronizes
/// itself, so slow pipeline commands and quick reads can overlap. That
/// also lets concurrent initialization calls collapse onto one shared
/// future inside [`ModService`].
pub struct AppState {
    pub data_dir: PathBuf,
    pub http: Client,
    pub settings: Arc<RwLock<LauncherSettings>>,
    pub instance_manager: Arc<InstanceManager>,
    pub mod_service: Arc<ModService>,
    pub watchers: Arc<WatcherRegistry>,
}

impl AppState {
    pub fn new() -> Self {
        let data_dir = default_data_dir();
        let _ = std::fs::create_dir_all(&data_dir);

        let http = build_http_client().expect("Failed to build HTTP client");
        let settings = Arc::new(RwLock::new(
            load_settings_from_disk(&data_dir).unwrap_or_default(),
        ));
        let instance_manager = Arc::new(InstanceManager::new(data_dir.join("instances")));
        let mod_service = Arc::new(ModService::new(http.clone(), settings.clone()));
        let watchers = Arc::new(WatcherRegistry::default());

        Self {
            data_dir,
            http,
            settings,
            instance_manager,
            mod_service,
            watchers,
        }
    }

    pub async fn current_settings(&self) -> LauncherSettings {
        self.settings.read().await.clone()
    }

    /// Validate, persist, then swap the in-memory settings.
    pub async fn update_settings(
        &self,
        settings: LauncherSettings,
    ) -> LauncherResult<LauncherSettings> {
        settings.validate()?;
        self.save_settings(&settings)?;
        *self.settings.write().await = settings.clone();
        Ok(settings)
    }

    fn save_settings(&self, settings: &LauncherSettings) -> LauncherResult<()> {
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(&path, json).map_err(|source| LauncherError::Io { path, source })?;
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn load_settings_from_disk(data_dir: &Path) -> Option<LauncherSettings> {
    let raw = std::fs::read_to_string(data_dir.join(SETTINGS_FILE)).ok()?;
    let settings: LauncherSettings = serde_json::from_str(&raw).ok()?;
    // A hand-edited file with bad values falls back to defaults.
    settings.validate().ok()?;
    Some(settings)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(LauncherSettings::default().validate().is_ok());
    }

    #[test]
    fn unsupported_language_is_rejected() {
        let settings = LauncherSettings {
            language: "fr".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(LauncherError::InvalidSetting(_))
        ));
    }

    #[test]
    fn concurrency_bounds_are_enforced() {
        let zero = LauncherSettings {
            concurrent_downloads: 0,
            ..Default::default()
        };
        let too_many = LauncherSettings {
            concurrent_downloads: MAX_CONCURRENT_DOWNLOADS + 1,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        assert!(too_many.validate().is_err());
        for n in [MIN_CONCURRENT_DOWNLOADS, 8, MAX_CONCURRENT_DOWNLOADS] {
            let ok = LauncherSettings {
                concurrent_downloads: n,
                ..Default::default()
            };
            assert!(ok.validate().is_ok());
        }
    }

    #[test]
    fn java_path_must_exist_and_look_like_java() {
        let missing = LauncherSettings {
            custom_java_path: Some(PathBuf::from("/definitely/not/here/java")),
            ..Default::default()
        };
        assert!(missing.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        let java = dir.path().join("java");
        std::fs::write(&java, b"#!/bin/sh\n").unwrap();
        let ok = LauncherSettings {
            custom_java_path: Some(java),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let python = dir.path().join("python3");
        std::fs::write(&python, b"#!/bin/sh\n").unwrap();
        let wrong = LauncherSettings {
            custom_java_path: Some(python),
            ..Default::default()
        };
        assert!(wrong.validate().is_err());
    }

    #[test]
    fn corrupt_settings_file_falls_back_to_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), b"{not json").unwrap();
        assert!(load_settings_from_disk(dir.path()).is_none());
    }

    #[test]
    fn stored_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LauncherSettings {
            language: "es".to_string(),
            custom_java_path: None,
            concurrent_downloads: 4,
        };
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            serde_json::to_string_pretty(&settings).unwrap(),
        )
        .unwrap();

        let loaded = load_settings_from_disk(dir.path()).unwrap();
        assert_eq!(loaded.language, "es");
        assert_eq!(loaded.concurrent_downloads, 4);
    }
}
