use std::path::PathBuf;

use serde::Deserialize;

use crate::core::error::LauncherError;
use crate::core::instance::{Instance, InstanceManager, LoaderType};
use crate::core::mods::{
    ConflictPrediction, EnrichmentResult, InitSummary, ModConflict, ModRecord, ModSource,
    SyncResult, UpdateCheckResult, VerificationResult,
};
use crate::core::state::{AppState, LauncherSettings};

#[derive(Debug, Deserialize)]
pub struct CreateInstancePayload {
    pub name: String,
    pub minecraft_version: String,
    pub loader: LoaderType,
}

// ── Instances ───────────────────────────────────────────

#[tauri::command]
pub async fn create_instance(
    state: tauri::State<'_, AppState>,
    payload: CreateInstancePayload,
) -> Result<Instance, LauncherError> {
    let instance = Instance::new(
        payload.name,
        payload.minecraft_version,
        payload.loader,
        &state.data_dir.join("instances"),
    );
    state.instance_manager.create(instance).await
}

#[tauri::command]
pub async fn list_instances(
    state: tauri::State<'_, AppState>,
) -> Result<Vec<Instance>, LauncherError> {
    state.instance_manager.list().await
}

#[tauri::command]
pub async fn get_instance(
    state: tauri::State<'_, AppState>,
    id: String,
) -> Result<Instance, LauncherError> {
    state.instance_manager.load(&id).await
}

#[tauri::command]
pub async fn delete_instance(
    state: tauri::State<'_, AppState>,
    id: String,
) -> Result<(), LauncherError> {
    // Watcher first, so the teardown itself emits no change events.
    state.watchers.stop(&id).await;
    state.mod_service.forget_instance(&id).await;
    state.instance_manager.delete(&id).await
}

#[tauri::command]
pub async fn instance_total_size_bytes(
    state: tauri::State<'_, AppState>,
    id: String,
) -> Result<u64, LauncherError> {
    state.instance_manager.total_size_bytes(&id).await
}

#[tauri::command]
pub async fn open_mods_folder(
    state: tauri::State<'_, AppState>,
    id: String,
) -> Result<(), LauncherError> {
    let instance = state.instance_manager.load(&id).await?;
    let folder = InstanceManager::safe_path(&instance.mods_dir());
    tauri_plugin_opener::open_path(folder, None::<&str>)
        .map_err(|e| LauncherError::Other(format!("Could not open mods folder: {e}")))
}

// ── Mod pipeline ────────────────────────────────────────

#[tauri::command]
pub async fn initialize_instance_mods(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<InitSummary, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state
        .mod_service
        .initialize_instance_mods(instance, Some(app))
        .await
}

#[tauri::command]
pub async fn sync_mods_folder(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<SyncResult, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.sync_mods_folder(&instance).await
}

#[tauri::command]
pub async fn list_mods(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<Vec<ModRecord>, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.list_mods(&instance).await
}

#[tauri::command]
pub async fn enrich_mod_dependencies(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<EnrichmentResult, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.enrich_mods(&instance, false).await
}

#[tauri::command]
pub async fn force_enrich_mod_dependencies(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<EnrichmentResult, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.enrich_mods(&instance, true).await
}

#[tauri::command]
pub async fn verify_instance_mods(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<Vec<VerificationResult>, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.verify_mods(&instance, Some(&app)).await
}

// ── Dependencies ────────────────────────────────────────

#[tauri::command]
pub async fn check_mod_dependencies(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<Vec<ModConflict>, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.check_dependencies(&instance).await
}

#[tauri::command]
pub async fn predict_mod_conflicts(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_slug: String,
) -> Result<ConflictPrediction, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state
        .mod_service
        .predict_conflicts(&instance, &mod_slug)
        .await
}

#[tauri::command]
pub async fn auto_resolve_dependencies(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<Vec<ModRecord>, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.auto_resolve_dependencies(&instance).await
}

// ── Mod mutations ───────────────────────────────────────

#[tauri::command]
pub async fn install_mod(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    source: ModSource,
    project_id: String,
) -> Result<ModRecord, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state
        .mod_service
        .install_mod(&instance, source, &project_id)
        .await
}

#[tauri::command]
pub async fn install_mod_local(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    file_path: PathBuf,
) -> Result<ModRecord, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.install_mod_local(&instance, &file_path).await
}

#[tauri::command]
pub async fn toggle_mod(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_id: String,
    enabled: bool,
) -> Result<ModRecord, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.toggle_mod(&instance, &mod_id, enabled).await
}

#[tauri::command]
pub async fn toggle_mod_auto_update(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_id: String,
) -> Result<ModRecord, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state
        .mod_service
        .toggle_mod_auto_update(&instance, &mod_id)
        .await
}

#[tauri::command]
pub async fn remove_mod(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_id: String,
) -> Result<(), LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.remove_mod(&instance, &mod_id).await
}

#[tauri::command]
pub async fn bulk_remove_mods(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_ids: Vec<String>,
) -> Result<usize, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.bulk_remove_mods(&instance, &mod_ids).await
}

#[tauri::command]
pub async fn bulk_toggle_mods(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_ids: Vec<String>,
    enabled: bool,
) -> Result<Vec<String>, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state
        .mod_service
        .bulk_toggle_mods(&instance, &mod_ids, enabled)
        .await
}

#[tauri::command]
pub async fn update_mod(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    mod_id: String,
) -> Result<ModRecord, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.update_mod(&instance, &mod_id).await
}

// ── Updates ─────────────────────────────────────────────

#[tauri::command]
pub async fn check_mod_updates(
    state: tauri::State<'_, AppState>,
    instance_id: String,
    force: bool,
) -> Result<UpdateCheckResult, LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.check_updates(&instance, force).await
}

#[tauri::command]
pub async fn clear_update_cache(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<(), LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state.mod_service.clear_update_cache(&instance).await
}

// ── Watcher ─────────────────────────────────────────────

#[tauri::command]
pub async fn start_mods_watcher(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<(), LauncherError> {
    let instance = state.instance_manager.load(&instance_id).await?;
    state
        .watchers
        .start(app, &instance.id, instance.mods_dir())
        .await
}

#[tauri::command]
pub async fn stop_mods_watcher(
    state: tauri::State<'_, AppState>,
    instance_id: String,
) -> Result<(), LauncherError> {
    state.watchers.stop(&instance_id).await;
    Ok(())
}

// ── Settings ────────────────────────────────────────────

#[tauri::command]
pub async fn get_launcher_settings(
    state: tauri::State<'_, AppState>,
) -> Result<LauncherSettings, LauncherError> {
    Ok(state.current_settings().await)
}

#[tauri::command]
pub async fn update_launcher_settings(
    state: tauri::State<'_, AppState>,
    settings: LauncherSettings,
) -> Result<LauncherSettings, LauncherError> {
    state.update_settings(settings).await
}
