use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use molten_lib::core::instance::{Instance, LoaderType};
use molten_lib::core::mods::ModService;
use molten_lib::core::registry::{CurseforgeClient, ModrinthClient, RegistryHub};
use molten_lib::core::state::LauncherSettings;
use tempfile::TempDir;
use tokio::sync::RwLock;

/// A fresh Fabric instance with an empty mods folder, rooted in its own
/// temp dir. Keep the guard alive for the duration of the test.
pub fn fabric_instance() -> (TempDir, Instance) {
    let tmp = tempfile::tempdir().unwrap();
    let instance = Instance::new(
        "Pipeline test".to_string(),
        "1.21.1".to_string(),
        LoaderType::Fabric,
        tmp.path(),
    );
    std::fs::create_dir_all(instance.mods_dir()).unwrap();
    (tmp, instance)
}

/// Service whose Modrinth client points at an unroutable local port, so
/// every registry lookup fails fast without leaving the machine.
pub fn offline_service() -> Arc<ModService> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let hub = RegistryHub::with_clients(
        ModrinthClient::with_base_url(http.clone(), "http://127.0.0.1:1".to_string()),
        CurseforgeClient::new(http.clone()),
    );
    let settings = Arc::new(RwLock::new(LauncherSettings::default()));
    Arc::new(ModService::with_hub(http, settings, hub))
}

/// A real zip jar with a Fabric manifest, so local metadata extraction
/// has something to read.
pub fn write_fabric_jar(path: &Path, id: &str, name: &str, version: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("fabric.mod.json", zip::write::SimpleFileOptions::default())
        .unwrap();
    let manifest =
        format!(r#"{{"schemaVersion": 1, "id": "{id}", "name": "{name}", "version": "{version}"}}"#);
    writer.write_all(manifest.as_bytes()).unwrap();
    writer.finish().unwrap();
}
