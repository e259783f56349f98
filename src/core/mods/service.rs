use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::Instance;
use crate::core::registry::RegistryHub;
use crate::core::state::LauncherSettings;

use super::local_meta::read_jar_metadata_async;
use super::model::{
    ConflictPrediction, EnrichmentResult, InitSummary, ModConflict, ModDependency, ModRecord,
    ModSource, ModsFile, SyncResult, UpdateCheckResult, VerificationResult, VerificationStatus,
};
use super::store::ModStore;
use super::{deps, enrich, sync, updates, verify};

type SharedInit = Shared<BoxFuture<'static, Result<InitSummary, Arc<LauncherError>>>>;

/// One façade over the whole mod pipeline, shared by every command.
///
/// Reads are lockless snapshots; every mutation takes the per-instance
/// write lock inside [`ModStore`]. Concurrent initialization calls for
/// the same instance are deduplicated onto one shared future, so a
/// double-mounted frontend view cannot run the pipeline twice.
pub struct ModService {
    store: ModStore,
    hub: RegistryHub,
    http: reqwest::Client,
    settings: Arc<RwLock<LauncherSettings>>,
    init_registry: Mutex<HashMap<String, SharedInit>>,
}

impl ModService {
    pub fn new(http: reqwest::Client, settings: Arc<RwLock<LauncherSettings>>) -> Self {
        Self {
            store: ModStore::default(),
            hub: RegistryHub::new(http.clone()),
            http,
            settings,
            init_registry: Mutex::new(HashMap::new()),
        }
    }

    /// Same service wired to non-default registry endpoints.
    pub fn with_hub(
        http: reqwest::Client,
        settings: Arc<RwLock<LauncherSettings>>,
        hub: RegistryHub,
    ) -> Self {
        Self {
            store: ModStore::default(),
            hub,
            http,
            settings,
            init_registry: Mutex::new(HashMap::new()),
        }
    }

    async fn downloader(&self) -> Downloader {
        let concurrency = self.settings.read().await.concurrent_downloads;
        Downloader::new(self.http.clone()).with_concurrency(concurrency)
    }

    // ── Pipeline ────────────────────────────────────────────

    pub async fn sync_mods_folder(&self, instance: &Instance) -> LauncherResult<SyncResult> {
        sync::sync_mods_folder(&self.store, instance).await
    }

    pub async fn enrich_mods(
        &self,
        instance: &Instance,
        force: bool,
    ) -> LauncherResult<EnrichmentResult> {
        enrich::enrich_mods(&self.store, &self.hub, instance, force).await
    }

    pub async fn verify_mods(
        &self,
        instance: &Instance,
        app_handle: Option<&tauri::AppHandle>,
    ) -> LauncherResult<Vec<VerificationResult>> {
        verify::verify_instance_mods(&self.store, &self.hub, instance, app_handle).await
    }

    pub async fn check_dependencies(&self, instance: &Instance) -> LauncherResult<Vec<ModConflict>> {
        deps::check_mod_dependencies(&self.store, instance).await
    }

    pub async fn predict_conflicts(
        &self,
        instance: &Instance,
        mod_slug: &str,
    ) -> LauncherResult<ConflictPrediction> {
        deps::predict_mod_conflicts(&self.store, &self.hub, instance, mod_slug).await
    }

    pub async fn auto_resolve_dependencies(
        &self,
        instance: &Instance,
    ) -> LauncherResult<Vec<ModRecord>> {
        let downloader = self.downloader().await;
        deps::auto_resolve_dependencies(&self.store, &self.hub, &downloader, instance).await
    }

    pub async fn check_updates(
        &self,
        instance: &Instance,
        force: bool,
    ) -> LauncherResult<UpdateCheckResult> {
        updates::check_mod_updates(&self.store, &self.hub, instance, force).await
    }

    pub async fn clear_update_cache(&self, instance: &Instance) -> LauncherResult<()> {
        updates::clear_update_cache(&self.store, instance).await
    }

    /// Run sync, then enrichment and verification in parallel.
    ///
    /// Calls for the same instance while one is in flight all await the
    /// same shared future and get the same summary. A sync failure
    /// fails the whole call; enrichment or verification failing alone
    /// degrades to zeros in the summary since the folder state itself
    /// is already consistent at that point.
    pub async fn initialize_instance_mods(
        self: &Arc<Self>,
        instance: Instance,
        app_handle: Option<tauri::AppHandle>,
    ) -> LauncherResult<InitSummary> {
        let shared = {
            let mut registry = self.init_registry.lock().await;
            match registry.get(&instance.id) {
                Some(existing) => existing.clone(),
                None => {
                    let service = Arc::clone(self);
                    let instance_id = instance.id.clone();
                    let registry_key = instance_id.clone();
                    let future = async move {
                        let result = service
                            .run_initialization(&instance, app_handle.as_ref())
                            .await;
                        // Settled futures must not linger in the map,
                        // or a later call would get a stale result.
                        service.init_registry.lock().await.remove(&instance_id);
                        result.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    registry.insert(registry_key, future.clone());
                    future
                }
            }
        };

        shared
            .await
            .map_err(|e| LauncherError::Other(e.to_string()))
    }

    async fn run_initialization(
        &self,
        instance: &Instance,
        app_handle: Option<&tauri::AppHandle>,
    ) -> LauncherResult<InitSummary> {
        let sync = sync::sync_mods_folder(&self.store, instance).await?;

        let (enrich_result, verify_result) = tokio::join!(
            enrich::enrich_mods(&self.store, &self.hub, instance, false),
            verify::verify_instance_mods(&self.store, &self.hub, instance, app_handle),
        );

        let enriched_mods = match enrich_result {
            Ok(r) => r.enriched_mods,
            Err(e) => {
                warn!("Enrichment failed during init of {}: {}", instance.id, e);
                0
            }
        };
        let (verified, modified, unknown) = match verify_result {
            Ok(results) => {
                let mut counts = (0usize, 0usize, 0usize);
                for r in &results {
                    match r.status {
                        VerificationStatus::Verified => counts.0 += 1,
                        VerificationStatus::Modified => counts.1 += 1,
                        VerificationStatus::Unknown => counts.2 += 1,
                    }
                }
                counts
            }
            Err(e) => {
                warn!("Verification failed during init of {}: {}", instance.id, e);
                (0, 0, 0)
            }
        };

        Ok(InitSummary {
            sync,
            enriched_mods,
            verified,
            modified,
            unknown,
        })
    }

    // ── Mutations ───────────────────────────────────────────

    /// Install the best compatible release of a registry project.
    pub async fn install_mod(
        &self,
        instance: &Instance,
        source: ModSource,
        project_id: &str,
    ) -> LauncherResult<ModRecord> {
        let Some(registry) = self.hub.for_source(source) else {
            return Err(LauncherError::Other(
                "Local jars are installed with install_mod_local".to_string(),
            ));
        };

        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;

        let project = registry.get_project(project_id).await?;
        if file
            .mods
            .iter()
            .any(|m| m.matches_project(Some(&project.id), project.slug.as_deref()))
        {
            return Err(LauncherError::ModAlreadyInstalled(project.name.clone()));
        }

        let version = registry
            .get_best_version(&project.id, &instance.minecraft_version, instance.loader)
            .await?
            .ok_or_else(|| LauncherError::NoCompatibleVersion {
                project: project.name.clone(),
                minecraft_version: instance.minecraft_version.clone(),
                loader: instance.loader.to_string(),
            })?;
        let Some(url) = version.file.url.clone() else {
            return Err(LauncherError::Registry {
                provider: source.to_string(),
                message: format!("{} does not allow automatic downloads", project.name),
            });
        };

        let dest = instance.mods_dir().join(&version.file.file_name);
        let downloader = self.downloader().await;
        downloader
            .download_file(&url, &dest, version.file.sha1.as_deref())
            .await?;

        let record = ModRecord {
            id: uuid::Uuid::new_v4().to_string(),
            slug: project.slug,
            file_name: version.file.file_name.clone(),
            name: Some(project.name.clone()),
            source,
            source_id: Some(project.id),
            version: Some(version.version_number.clone()),
            latest_version: None,
            enabled: true,
            auto_update: false,
            update_available: false,
            icon_url: project.icon_url,
            categories: project.categories,
            latest_changelog: None,
            dependencies: version
                .dependencies
                .iter()
                .cloned()
                .map(ModDependency::from)
                .collect(),
            file_size: version.file.size,
            added_at: Utc::now(),
        };
        file.mods.push(record.clone());
        file.mods.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        self.store.save(instance, &file).await?;

        info!(
            "Installed {} {} into {}",
            project.name, version.version_number, instance.id
        );
        Ok(record)
    }

    /// Copy a jar from anywhere on disk into the instance and track it.
    pub async fn install_mod_local(
        &self,
        instance: &Instance,
        source_path: &Path,
    ) -> LauncherResult<ModRecord> {
        let file_name = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                LauncherError::Other(format!("Not a valid file path: {source_path:?}"))
            })?;
        if !file_name.ends_with(".jar") {
            return Err(LauncherError::Other(format!(
                "{file_name} is not a jar file"
            )));
        }

        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;

        let mods_dir = instance.mods_dir();
        tokio::fs::create_dir_all(&mods_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: mods_dir.clone(),
                source: e,
            })?;

        let dest = mods_dir.join(&file_name);
        let disabled_twin = mods_dir.join(format!("{file_name}.disabled"));
        let occupied = path_exists(&dest).await?
            || path_exists(&disabled_twin).await?
            || file.mods.iter().any(|m| m.file_name == file_name);
        if occupied {
            return Err(LauncherError::ModAlreadyInstalled(file_name));
        }

        tokio::fs::copy(source_path, &dest)
            .await
            .map_err(|e| LauncherError::Io {
                path: source_path.to_path_buf(),
                source: e,
            })?;
        let size = tokio::fs::metadata(&dest)
            .await
            .map_err(|e| LauncherError::Io {
                path: dest.clone(),
                source: e,
            })?
            .len();

        let mut record = ModRecord::for_local_file(file_name, size, true);
        let meta = read_jar_metadata_async(dest.clone()).await.unwrap_or_default();
        record.name = meta.name;
        record.version = meta.version;

        file.mods.push(record.clone());
        file.mods.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        self.store.save(instance, &file).await?;

        info!("Installed local jar {} into {}", record.file_name, instance.id);
        Ok(record)
    }

    /// Enable or disable one mod by renaming its file on disk.
    pub async fn toggle_mod(
        &self,
        instance: &Instance,
        mod_id: &str,
        enabled: bool,
    ) -> LauncherResult<ModRecord> {
        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;
        let record = file
            .find_mod_mut(mod_id)
            .ok_or_else(|| LauncherError::ModNotFound(mod_id.to_string()))?;

        if record.enabled == enabled {
            return Ok(record.clone());
        }

        let mods_dir = instance.mods_dir();
        let from = mods_dir.join(record.disk_file_name());
        record.enabled = enabled;
        let to = mods_dir.join(record.disk_file_name());
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| LauncherError::Io {
                path: from,
                source: e,
            })?;

        let result = record.clone();
        self.store.save(instance, &file).await?;
        Ok(result)
    }

    /// Flip the per-mod auto-update preference. No file is touched.
    pub async fn toggle_mod_auto_update(
        &self,
        instance: &Instance,
        mod_id: &str,
    ) -> LauncherResult<ModRecord> {
        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;
        let record = file
            .find_mod_mut(mod_id)
            .ok_or_else(|| LauncherError::ModNotFound(mod_id.to_string()))?;
        record.auto_update = !record.auto_update;
        let result = record.clone();
        self.store.save(instance, &file).await?;
        Ok(result)
    }

    /// Delete one mod's file (either name form) and stop tracking it.
    pub async fn remove_mod(&self, instance: &Instance, mod_id: &str) -> LauncherResult<()> {
        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;
        let Some(position) = file.mods.iter().position(|m| m.id == mod_id) else {
            return Err(LauncherError::ModNotFound(mod_id.to_string()));
        };

        let record = file.mods.remove(position);
        let result = delete_jar_forms(&instance.mods_dir(), &record.file_name).await;
        if result.is_err() {
            // The file is still there; keep tracking it.
            file.mods.insert(position, record);
        }
        self.store.save(instance, &file).await?;
        result
    }

    /// Remove several mods in one pass. Files that fail to delete keep
    /// their records; the first deletion error is reported after the
    /// surviving list has been saved.
    pub async fn bulk_remove_mods(
        &self,
        instance: &Instance,
        mod_ids: &[String],
    ) -> LauncherResult<usize> {
        if mod_ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;
        let mods_dir = instance.mods_dir();
        let id_set: HashSet<&str> = mod_ids.iter().map(String::as_str).collect();

        let mut survivors = Vec::with_capacity(file.mods.len());
        let mut removed = 0usize;
        let mut first_error: Option<LauncherError> = None;
        for record in file.mods.drain(..) {
            if !id_set.contains(record.id.as_str()) {
                survivors.push(record);
                continue;
            }
            match delete_jar_forms(&mods_dir, &record.file_name).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("Could not delete {}: {}", record.file_name, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    survivors.push(record);
                }
            }
        }
        file.mods = survivors;
        self.store.save(instance, &file).await?;

        info!("Removed {} mods from {}", removed, instance.id);
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Enable or disable several mods at once. Unknown ids and rename
    /// failures are skipped with a warning; the ids actually changed
    /// come back. An empty input does not even take the lock.
    pub async fn bulk_toggle_mods(
        &self,
        instance: &Instance,
        mod_ids: &[String],
        enabled: bool,
    ) -> LauncherResult<Vec<String>> {
        if mod_ids.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;
        let mods_dir = instance.mods_dir();

        let mut changed = Vec::new();
        for mod_id in mod_ids {
            let Some(record) = file.find_mod_mut(mod_id) else {
                warn!("Bulk toggle: no tracked mod with id {}", mod_id);
                continue;
            };
            if record.enabled == enabled {
                continue;
            }
            let from = mods_dir.join(record.disk_file_name());
            record.enabled = enabled;
            let to = mods_dir.join(record.disk_file_name());
            if let Err(e) = tokio::fs::rename(&from, &to).await {
                warn!("Could not rename {}: {}", from.display(), e);
                record.enabled = !enabled;
                continue;
            }
            changed.push(record.id.clone());
        }

        if !changed.is_empty() {
            self.store.save(instance, &file).await?;
        }
        Ok(changed)
    }

    /// Replace a mod's file with the release recorded as its latest.
    pub async fn update_mod(&self, instance: &Instance, mod_id: &str) -> LauncherResult<ModRecord> {
        let _guard = self.store.lock_instance(&instance.id).await;
        let mut file = self.store.load(instance).await?;
        let record = file
            .find_mod(mod_id)
            .cloned()
            .ok_or_else(|| LauncherError::ModNotFound(mod_id.to_string()))?;

        let (Some(source_id), Some(registry)) = (
            record.source_id.clone(),
            self.hub.for_source(record.source),
        ) else {
            return Err(LauncherError::Other(
                "Only registry mods can be updated".to_string(),
            ));
        };
        let Some(target_version) = record.latest_version.clone() else {
            return Err(LauncherError::Other(
                "No update recorded; run an update check first".to_string(),
            ));
        };

        let versions = registry
            .get_versions(
                &source_id,
                Some(&instance.minecraft_version),
                Some(instance.loader),
            )
            .await?;
        let Some(version) = versions
            .into_iter()
            .find(|v| v.version_number == target_version)
        else {
            return Err(LauncherError::Registry {
                provider: record.source.to_string(),
                message: format!("Release {target_version} is no longer listed"),
            });
        };
        let Some(url) = version.file.url.clone() else {
            return Err(LauncherError::Registry {
                provider: record.source.to_string(),
                message: format!("{} does not allow automatic downloads", record.display_name()),
            });
        };

        let mods_dir = instance.mods_dir();
        let new_dest = mods_dir.join(&version.file.file_name);
        let downloader = self.downloader().await;
        downloader
            .download_file(&url, &new_dest, version.file.sha1.as_deref())
            .await?;

        // Old file goes only once the new one is in place.
        if version.file.file_name != record.file_name {
            delete_jar_forms(&mods_dir, &record.file_name).await?;
        }
        // A disabled mod stays disabled across the update.
        if !record.enabled {
            let disabled = mods_dir.join(format!("{}.disabled", version.file.file_name));
            tokio::fs::rename(&new_dest, &disabled)
                .await
                .map_err(|e| LauncherError::Io {
                    path: new_dest.clone(),
                    source: e,
                })?;
        }

        let updated = {
            let stored = file
                .find_mod_mut(mod_id)
                .ok_or_else(|| LauncherError::ModNotFound(mod_id.to_string()))?;
            stored.file_name = version.file.file_name.clone();
            stored.version = Some(version.version_number.clone());
            stored.update_available = false;
            stored.file_size = version.file.size;
            stored.dependencies = version
                .dependencies
                .iter()
                .cloned()
                .map(ModDependency::from)
                .collect();
            stored.clone()
        };
        file.mods.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        self.store.save(instance, &file).await?;

        info!(
            "Updated {} to {} in {}",
            updated.display_name(),
            version.version_number,
            instance.id
        );
        Ok(updated)
    }

    /// Snapshot of the tracked list; takes no lock.
    pub async fn list_mods(&self, instance: &Instance) -> LauncherResult<Vec<ModRecord>> {
        let file: ModsFile = self.store.load(instance).await?;
        Ok(file.mods)
    }

    /// Drop per-instance bookkeeping after the instance is deleted.
    pub async fn forget_instance(&self, instance_id: &str) {
        self.store.forget(instance_id).await;
    }
}

async fn path_exists(path: &Path) -> LauncherResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| LauncherError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Delete both name forms of a jar, tolerating whichever is absent.
async fn delete_jar_forms(mods_dir: &Path, file_name: &str) -> LauncherResult<()> {
    for name in [file_name.to_string(), format!("{file_name}.disabled")] {
        let path = mods_dir.join(&name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LauncherError::Io { path, source: e }),
        }
    }
    Ok(())
}
