use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::core::error::{LauncherError, LauncherResult};

/// Name and version pulled out of a jar's loader manifest. Used as the
/// enrichment fallback when no registry recognizes the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JarMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
}

impl JarMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.version.is_none()
    }
}

/// Read loader metadata out of a mod jar, trying the manifest formats in
/// order of how common they are:
///
/// 1. `fabric.mod.json`        (Fabric)
/// 2. `quilt.mod.json`         (Quilt)
/// 3. `META-INF/mods.toml`     (Forge / NeoForge 1.13+)
/// 4. `mcmod.info`             (legacy Forge)
pub fn read_jar_metadata(path: &Path) -> LauncherResult<JarMetadata> {
    let file = std::fs::File::open(path).map_err(|e| LauncherError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut archive = ZipArchive::new(file)?;

    if let Some(content) = read_entry(&mut archive, "fabric.mod.json") {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) {
            let meta = JarMetadata {
                name: clean(json.get("name").and_then(|v| v.as_str())),
                version: clean(json.get("version").and_then(|v| v.as_str())),
            };
            if !meta.is_empty() {
                return Ok(meta);
            }
        }
    }

    if let Some(content) = read_entry(&mut archive, "quilt.mod.json") {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) {
            if let Some(loader) = json.get("quilt_loader") {
                let meta = JarMetadata {
                    name: clean(
                        loader
                            .get("metadata")
                            .and_then(|m| m.get("name"))
                            .and_then(|v| v.as_str()),
                    ),
                    version: clean(loader.get("version").and_then(|v| v.as_str())),
                };
                if !meta.is_empty() {
                    return Ok(meta);
                }
            }
        }
    }

    if let Some(content) = read_entry(&mut archive, "META-INF/mods.toml") {
        if let Ok(value) = content.parse::<toml::Value>() {
            // mods.toml carries a [[mods]] array with displayName/version
            if let Some(first) = value
                .get("mods")
                .and_then(|m| m.as_array())
                .and_then(|a| a.first())
            {
                let meta = JarMetadata {
                    name: clean(first.get("displayName").and_then(|v| v.as_str())),
                    version: clean(first.get("version").and_then(|v| v.as_str())),
                };
                if !meta.is_empty() {
                    return Ok(meta);
                }
            }
        }
    }

    if let Some(content) = read_entry(&mut archive, "mcmod.info") {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) {
            // Either a bare array or an object with a modList array
            let entry = json
                .as_array()
                .and_then(|a| a.first())
                .or_else(|| json.get("modList").and_then(|l| l.as_array())?.first());
            if let Some(first) = entry {
                let meta = JarMetadata {
                    name: clean(first.get("name").and_then(|v| v.as_str())),
                    version: clean(first.get("version").and_then(|v| v.as_str())),
                };
                if !meta.is_empty() {
                    return Ok(meta);
                }
            }
        }
    }

    Ok(JarMetadata::default())
}

/// `zip` is synchronous; run the read off the async runtime.
pub async fn read_jar_metadata_async(path: PathBuf) -> LauncherResult<JarMetadata> {
    tokio::task::spawn_blocking(move || read_jar_metadata(&path))
        .await
        .map_err(|e| LauncherError::Other(format!("Jar metadata task failed: {e}")))?
}

fn read_entry(archive: &mut ZipArchive<std::fs::File>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    Some(content)
}

/// Reject empty strings and unexpanded `${...}` build placeholders
/// (common in `mods.toml` as `${file.jarVersion}`).
fn clean(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.contains("${") {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_jar(path: &Path, entry_name: &str, content: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(entry_name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn reads_fabric_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("sodium.jar");
        write_test_jar(
            &jar,
            "fabric.mod.json",
            r#"{"id": "sodium", "name": "Sodium", "version": "0.5.8"}"#,
        );

        let meta = read_jar_metadata(&jar).unwrap();
        assert_eq!(meta.name.as_deref(), Some("Sodium"));
        assert_eq!(meta.version.as_deref(), Some("0.5.8"));
    }

    #[test]
    fn reads_forge_mods_toml() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("jei.jar");
        write_test_jar(
            &jar,
            "META-INF/mods.toml",
            "modLoader=\"javafml\"\n[[mods]]\nmodId=\"jei\"\ndisplayName=\"Just Enough Items\"\nversion=\"${file.jarVersion}\"\n",
        );

        let meta = read_jar_metadata(&jar).unwrap();
        assert_eq!(meta.name.as_deref(), Some("Just Enough Items"));
        // unexpanded build placeholder must not leak through
        assert_eq!(meta.version, None);
    }

    #[test]
    fn reads_quilt_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("ok_zoomer.jar");
        write_test_jar(
            &jar,
            "quilt.mod.json",
            r#"{"quilt_loader": {"id": "ok_zoomer", "version": "6.0.2", "metadata": {"name": "Ok Zoomer"}}}"#,
        );

        let meta = read_jar_metadata(&jar).unwrap();
        assert_eq!(meta.name.as_deref(), Some("Ok Zoomer"));
        assert_eq!(meta.version.as_deref(), Some("6.0.2"));
    }

    #[test]
    fn reads_legacy_mcmod_info() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("legacy.jar");
        write_test_jar(
            &jar,
            "mcmod.info",
            r#"[{"modid": "buildcraft", "name": "BuildCraft", "version": "7.99"}]"#,
        );

        let meta = read_jar_metadata(&jar).unwrap();
        assert_eq!(meta.name.as_deref(), Some("BuildCraft"));
        assert_eq!(meta.version.as_deref(), Some("7.99"));
    }

    #[test]
    fn jar_without_manifests_yields_empty_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("plain.jar");
        write_test_jar(&jar, "assets/icon.png", "not really a png");

        let meta = read_jar_metadata(&jar).unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn non_zip_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake.jar");
        std::fs::write(&fake, "definitely not a zip").unwrap();

        assert!(read_jar_metadata(&fake).is_err());
    }
}
