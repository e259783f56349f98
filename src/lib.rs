mod commands;
pub mod core;

use tauri::Manager;
use tracing_subscriber::EnvFilter;

use crate::core::state::AppState;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,molten_lib=debug")),
        )
        .init();

    tracing::info!("Molten mod manager starting...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            app.manage(AppState::new());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::create_instance,
            commands::list_instances,
            commands::get_instance,
            commands::delete_instance,
            commands::instance_total_size_bytes,
            commands::open_mods_folder,
            commands::initialize_instance_mods,
            commands::sync_mods_folder,
            commands::list_mods,
            commands::enrich_mod_dependencies,
            commands::force_enrich_mod_dependencies,
            commands::verify_instance_mods,
            commands::check_mod_dependencies,
            commands::predict_mod_conflicts,
            commands::auto_resolve_dependencies,
            commands::install_mod,
            commands::install_mod_local,
            commands::toggle_mod,
            commands::toggle_mod_auto_update,
            commands::remove_mod,
            commands::bulk_remove_mods,
            commands::bulk_toggle_mods,
            commands::update_mod,
            commands::check_mod_updates,
            commands::clear_update_cache,
            commands::start_mods_watcher,
            commands::stop_mods_watcher,
            commands::get_launcher_settings,
            commands::update_launcher_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
