use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::Instance;

use super::model::{ModRecord, SyncResult};
use super::store::ModStore;

/// What one jar looks like on disk during enumeration.
struct DiskJar {
    enabled: bool,
    size: u64,
}

/// Reconcile the tracked mod list against the `mods/` directory.
///
/// The directory mtime doubles as a cheap change detector: when it
/// matches the stamp of the previous sync, nothing is enumerated and
/// nothing is written. Otherwise jars on disk win over the records:
/// new files get tentative local records, vanished files lose theirs,
/// and `.disabled` renames only flip the enabled flag.
pub async fn sync_mods_folder(store: &ModStore, instance: &Instance) -> LauncherResult<SyncResult> {
    let _guard = store.lock_instance(&instance.id).await;

    let mods_dir = instance.mods_dir();
    tokio::fs::create_dir_all(&mods_dir)
        .await
        .map_err(|e| LauncherError::Io {
            path: mods_dir.clone(),
            source: e,
        })?;

    // Stamp before enumerating: a change that lands mid-sync makes the
    // next sync re-enumerate instead of being missed.
    let stamp = folder_stamp_ms(&mods_dir).await?;
    let mut file = store.load(instance).await?;

    if file.folder_stamp_ms == Some(stamp) {
        debug!("Mods folder unchanged for {} (stamp {})", instance.id, stamp);
        return Ok(SyncResult {
            added: 0,
            removed: 0,
            skipped: true,
        });
    }

    let on_disk = enumerate_jars(&mods_dir).await?;

    let before = file.mods.len();
    file.mods
        .retain(|record| on_disk.contains_key(&record.file_name));
    let removed = before - file.mods.len();

    // Survivors: reconcile the enabled flag (covers `.disabled` renames
    // done outside the app) and refresh the size.
    for record in &mut file.mods {
        if let Some(disk) = on_disk.get(&record.file_name) {
            record.enabled = disk.enabled;
            record.file_size = disk.size;
        }
    }

    let mut added = 0;
    for (name, disk) in &on_disk {
        if !file.mods.iter().any(|r| &r.file_name == name) {
            file.mods
                .push(ModRecord::for_local_file(name.clone(), disk.size, disk.enabled));
            added += 1;
        }
    }

    file.mods.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    file.folder_stamp_ms = Some(stamp);
    store.save(instance, &file).await?;

    info!(
        "Synced mods folder for {}: +{} -{} ({} tracked)",
        instance.id,
        added,
        removed,
        file.mods.len()
    );
    Ok(SyncResult {
        added,
        removed,
        skipped: false,
    })
}

/// Directory mtime in milliseconds since the epoch.
pub async fn folder_stamp_ms(mods_dir: &Path) -> LauncherResult<i64> {
    let metadata = tokio::fs::metadata(mods_dir)
        .await
        .map_err(|e| LauncherError::Io {
            path: mods_dir.to_path_buf(),
            source: e,
        })?;
    let modified = metadata.modified().map_err(|e| LauncherError::Io {
        path: mods_dir.to_path_buf(),
        source: e,
    })?;
    Ok(DateTime::<Utc>::from(modified).timestamp_millis())
}

/// Map of canonical jar name → on-disk state. `foo.jar.disabled` counts
/// as `foo.jar` with `enabled = false`; if both forms exist, the enabled
/// one wins.
async fn enumerate_jars(mods_dir: &Path) -> LauncherResult<HashMap<String, DiskJar>> {
    let mut jars = HashMap::new();

    let mut entries = tokio::fs::read_dir(mods_dir)
        .await
        .map_err(|e| LauncherError::Io {
            path: mods_dir.to_path_buf(),
            source: e,
        })?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| LauncherError::Io {
        path: mods_dir.to_path_buf(),
        source: e,
    })? {
        let name = entry.file_name().to_string_lossy().to_string();
        let (canonical, enabled) = if let Some(stem) = name.strip_suffix(".disabled") {
            if !stem.ends_with(".jar") {
                continue;
            }
            (stem.to_string(), false)
        } else if name.ends_with(".jar") {
            (name, true)
        } else {
            continue;
        };

        let metadata = entry.metadata().await.map_err(|e| LauncherError::Io {
            path: entry.path(),
            source: e,
        })?;
        if !metadata.is_file() {
            continue;
        }

        let jar = DiskJar {
            enabled,
            size: metadata.len(),
        };
        match jars.entry(canonical) {
            Entry::Vacant(v) => {
                v.insert(jar);
            }
            Entry::Occupied(mut o) => {
                if enabled {
                    o.insert(jar);
                }
            }
        }
    }

    Ok(jars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumeration_classifies_jar_forms() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sodium.jar"), b"a").unwrap();
        std::fs::write(dir.path().join("lithium.jar.disabled"), b"bb").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"ccc").unwrap();
        std::fs::write(dir.path().join("partial.disabled"), b"d").unwrap();

        let jars = enumerate_jars(dir.path()).await.unwrap();
        assert_eq!(jars.len(), 2);
        assert!(jars["sodium.jar"].enabled);
        assert!(!jars["lithium.jar"].enabled);
        assert_eq!(jars["lithium.jar"].size, 2);
    }

    #[tokio::test]
    async fn enabled_form_wins_when_both_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.jar"), b"enabled").unwrap();
        std::fs::write(dir.path().join("x.jar.disabled"), b"disabled").unwrap();

        let jars = enumerate_jars(dir.path()).await.unwrap();
        assert_eq!(jars.len(), 1);
        assert!(jars["x.jar"].enabled);
    }

    #[tokio::test]
    async fn subdirectories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested.jar")).unwrap();
        std::fs::write(dir.path().join("real.jar"), b"a").unwrap();

        let jars = enumerate_jars(dir.path()).await.unwrap();
        assert_eq!(jars.len(), 1);
        assert!(jars.contains_key("real.jar"));
    }
}
