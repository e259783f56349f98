use serde::Serialize;
use tauri::Emitter;

/// Payloads pushed over the Tauri event channel. Emission failures are
/// swallowed: a missing listener must never fail a backend operation.

#[derive(Debug, Clone, Serialize)]
pub struct VerificationProgressEvent {
    pub instance_id: String,
    pub stage: String,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModsFolderChangedEvent {
    pub instance_id: String,
    pub event_type: String,
    pub file_name: String,
}

/// Progress tick for `verify_instance_mods`. `app_handle` is `None` when
/// the pipeline runs outside a Tauri context (tests).
pub fn emit_verification_progress(
    app_handle: Option<&tauri::AppHandle>,
    instance_id: &str,
    stage: &str,
    current: usize,
    total: usize,
    message: String,
) {
    if let Some(handle) = app_handle {
        let _ = handle.emit(
            "verification-progress",
            VerificationProgressEvent {
                instance_id: instance_id.to_string(),
                stage: stage.to_string(),
                current,
                total,
                message,
            },
        );
    }
}

/// Soft hint from the mods-folder watcher. The front end reacts by
/// re-syncing; reconciliation stays the source of truth.
pub fn emit_mods_folder_changed(
    app_handle: &tauri::AppHandle,
    instance_id: &str,
    event_type: &str,
    file_name: &str,
) {
    let _ = app_handle.emit(
        "mods_folder_changed",
        ModsFolderChangedEvent {
            instance_id: instance_id.to_string(),
            event_type: event_type.to_string(),
            file_name: file_name.to_string(),
        },
    );
}
