use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::downloader::file_sha1_hex;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::Instance;
use crate::core::registry::{RegistryHub, RegistryVersion};

use super::local_meta::{read_jar_metadata_async, JarMetadata};
use super::model::{EnrichmentResult, ModDependency, ModRecord, ModSource};
use super::store::ModStore;

const ENRICH_CONCURRENCY: usize = 8;

/// Everything a registry lookup can contribute to a record.
struct RegistryData {
    source: ModSource,
    source_id: String,
    slug: Option<String>,
    name: String,
    icon_url: Option<String>,
    categories: Vec<String>,
    version: Option<String>,
    dependencies: Vec<ModDependency>,
}

enum Outcome {
    Registry(Box<RegistryData>),
    Local(JarMetadata),
    Nothing,
    Failed,
}

/// Fill in registry identity and display metadata for records that lack
/// it.
///
/// A fingerprint over the folder contents gates the whole operation:
/// when it matches the stored one and `force` is not set, the call
/// returns without any network traffic. Unclaimed jars are matched by
/// sha1 against Modrinth in one batch; already claimed records get
/// their project metadata refreshed from their own registry; anything
/// left falls back to the jar's embedded manifest. Lookup failures are
/// counted, never fatal, and leave the fingerprint unset so the next
/// run retries them.
pub async fn enrich_mods(
    store: &ModStore,
    hub: &RegistryHub,
    instance: &Instance,
    force: bool,
) -> LauncherResult<EnrichmentResult> {
    let mods_dir = instance.mods_dir();
    let fingerprint = compute_fingerprint(&mods_dir).await?;
    let snapshot = store.load(instance).await?;

    if !force && snapshot.enrichment_fingerprint.as_deref() == Some(fingerprint.as_str()) {
        debug!("Mods unchanged for {}, skipping enrichment", instance.id);
        return Ok(EnrichmentResult {
            enriched_mods: 0,
            failed_lookups: 0,
            skipped: true,
        });
    }

    let candidates: Vec<ModRecord> = snapshot
        .mods
        .iter()
        .filter(|m| m.needs_enrichment())
        .cloned()
        .collect();

    if candidates.is_empty() {
        let _guard = store.lock_instance(&instance.id).await;
        let mut file = store.load(instance).await?;
        file.enrichment_fingerprint = Some(fingerprint);
        store.save(instance, &file).await?;
        return Ok(EnrichmentResult {
            enriched_mods: 0,
            failed_lookups: 0,
            skipped: false,
        });
    }

    let mut failed_lookups = 0usize;

    // Hash every candidate without a registry identity; the batch
    // lookup below claims them by sha1.
    let mut sha1_by_record: HashMap<String, String> = HashMap::new();
    for candidate in &candidates {
        if candidate.source_id.is_some() {
            continue;
        }
        let path = mods_dir.join(candidate.disk_file_name());
        match file_sha1_hex(&path).await {
            Ok(hash) => {
                sha1_by_record.insert(candidate.id.clone(), hash);
            }
            Err(e) => {
                warn!("Could not hash {}: {}", candidate.file_name, e);
                failed_lookups += 1;
            }
        }
    }

    let hashes: Vec<String> = sha1_by_record.values().cloned().collect();
    let matches: HashMap<String, RegistryVersion> = match hub.modrinth().match_hashes(&hashes).await
    {
        Ok(m) => m,
        Err(e) => {
            warn!("Hash batch lookup failed: {e}");
            failed_lookups += hashes.len();
            HashMap::new()
        }
    };

    let results: Vec<(String, Outcome)> = stream::iter(candidates)
        .map(|candidate| {
            let mods_dir = mods_dir.clone();
            let matched = sha1_by_record
                .get(&candidate.id)
                .and_then(|h| matches.get(h))
                .cloned();
            async move {
                let outcome = enrich_candidate(hub, instance, &mods_dir, &candidate, matched).await;
                (candidate.id.clone(), outcome)
            }
        })
        .buffer_unordered(ENRICH_CONCURRENCY)
        .collect()
        .await;

    let _guard = store.lock_instance(&instance.id).await;
    let mut file = store.load(instance).await?;
    let mut enriched_mods = 0usize;
    let mut changed = false;

    for (record_id, outcome) in results {
        // The record can vanish between snapshot and apply.
        let Some(record) = file.find_mod_mut(&record_id) else {
            continue;
        };
        match outcome {
            Outcome::Failed => failed_lookups += 1,
            Outcome::Nothing => {}
            Outcome::Local(meta) => {
                let mut touched = false;
                if record.name.is_none() && meta.name.is_some() {
                    record.name = meta.name;
                    touched = true;
                }
                if record.version.is_none() && meta.version.is_some() {
                    record.version = meta.version;
                    touched = true;
                }
                if touched {
                    enriched_mods += 1;
                    changed = true;
                }
            }
            Outcome::Registry(data) => {
                record.source = data.source;
                record.source_id = Some(data.source_id);
                record.slug = data.slug;
                record.name = Some(data.name);
                record.icon_url = data.icon_url;
                record.categories = data.categories;
                if data.version.is_some() {
                    record.version = data.version;
                }
                record.dependencies = data.dependencies;
                enriched_mods += 1;
                changed = true;
            }
        }
    }

    // Only stamp the fingerprint when every lookup went through, so a
    // transient outage is retried on the next call. Jars the registries
    // simply do not know are not failures and stamp normally.
    if failed_lookups == 0 {
        file.enrichment_fingerprint = Some(fingerprint);
        changed = true;
    }
    if changed {
        store.save(instance, &file).await?;
    }

    Ok(EnrichmentResult {
        enriched_mods,
        failed_lookups,
        skipped: false,
    })
}

async fn enrich_candidate(
    hub: &RegistryHub,
    instance: &Instance,
    mods_dir: &Path,
    candidate: &ModRecord,
    matched: Option<RegistryVersion>,
) -> Outcome {
    // Already claimed: refresh project metadata and the dependency list
    // for this instance's game version from the record's own registry.
    if let (Some(source_id), Some(registry)) = (
        candidate.source_id.as_deref(),
        hub.for_source(candidate.source),
    ) {
        let project = match registry.get_project(source_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "Project lookup failed for {} ({}): {}",
                    candidate.file_name, source_id, e
                );
                return Outcome::Failed;
            }
        };
        let dependencies = match registry
            .get_best_version(source_id, &instance.minecraft_version, instance.loader)
            .await
        {
            Ok(Some(version)) => version
                .dependencies
                .into_iter()
                .map(ModDependency::from)
                .collect(),
            Ok(None) => candidate.dependencies.clone(),
            Err(e) => {
                debug!("Version lookup failed for {}: {}", candidate.file_name, e);
                candidate.dependencies.clone()
            }
        };
        return Outcome::Registry(Box::new(RegistryData {
            source: candidate.source,
            source_id: source_id.to_string(),
            slug: project.slug,
            name: project.name,
            icon_url: project.icon_url,
            categories: project.categories,
            version: candidate.version.clone(),
            dependencies,
        }));
    }

    // Claimed by the sha1 batch.
    if let Some(version) = matched {
        return match hub.modrinth().get_project(&version.project_id).await {
            Ok(project) => Outcome::Registry(Box::new(RegistryData {
                source: ModSource::Modrinth,
                source_id: version.project_id.clone(),
                slug: project.slug,
                name: project.name,
                icon_url: project.icon_url,
                categories: project.categories,
                version: Some(version.version_number.clone()),
                dependencies: version
                    .dependencies
                    .into_iter()
                    .map(ModDependency::from)
                    .collect(),
            })),
            Err(e) => {
                warn!(
                    "Project lookup failed for matched hash of {}: {}",
                    candidate.file_name, e
                );
                Outcome::Failed
            }
        };
    }

    // No registry knows this jar; whatever its own manifest says is
    // better than nothing.
    let path = mods_dir.join(candidate.disk_file_name());
    match read_jar_metadata_async(path).await {
        Ok(meta) if !meta.is_empty() => Outcome::Local(meta),
        Ok(_) => Outcome::Nothing,
        Err(e) => {
            debug!("No readable metadata in {}: {}", candidate.file_name, e);
            Outcome::Nothing
        }
    }
}

/// SHA-256 over the sorted (canonical name, size, mtime) triple of
/// every jar in the folder. Uses the canonical name so toggling a mod
/// does not invalidate enrichment; a missing folder hashes like an
/// empty one.
pub async fn compute_fingerprint(mods_dir: &Path) -> LauncherResult<String> {
    let mut dir = match tokio::fs::read_dir(mods_dir).await {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(hex::encode(Sha256::digest(b"")));
        }
        Err(e) => {
            return Err(LauncherError::Io {
                path: mods_dir.to_path_buf(),
                source: e,
            })
        }
    };

    let mut entries: Vec<(String, u64, i64)> = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(|e| LauncherError::Io {
        path: mods_dir.to_path_buf(),
        source: e,
    })? {
        let name = entry.file_name().to_string_lossy().to_string();
        let canonical = if let Some(stem) = name.strip_suffix(".disabled") {
            if !stem.ends_with(".jar") {
                continue;
            }
            stem.to_string()
        } else if name.ends_with(".jar") {
            name
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
        let mtime = metadata.modified().map_err(|e| LauncherError::Io {
            path: entry.path(),
            source: e,
        })?;
        entries.push((
            canonical,
            metadata.len(),
            DateTime::<Utc>::from(mtime).timestamp_millis(),
        ));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, size, mtime) in &entries {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(size.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fingerprint_is_stable_for_unchanged_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"aaa").unwrap();
        std::fs::write(dir.path().join("b.jar"), b"bbbb").unwrap();

        let first = compute_fingerprint(dir.path()).await.unwrap();
        let second = compute_fingerprint(dir.path()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fingerprint_ignores_disabled_renames() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"aaa").unwrap();

        let enabled = compute_fingerprint(dir.path()).await.unwrap();
        std::fs::rename(dir.path().join("a.jar"), dir.path().join("a.jar.disabled")).unwrap();
        let disabled = compute_fingerprint(dir.path()).await.unwrap();
        assert_eq!(enabled, disabled);
    }

    #[tokio::test]
    async fn fingerprint_changes_when_a_jar_is_added() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jar"), b"aaa").unwrap();

        let before = compute_fingerprint(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("b.jar"), b"bbbb").unwrap();
        let after = compute_fingerprint(dir.path()).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn missing_folder_hashes_like_an_empty_one() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let empty_dir = tempfile::tempdir().unwrap();
        assert_eq!(
            compute_fingerprint(&missing).await.unwrap(),
            compute_fingerprint(empty_dir.path()).await.unwrap()
        );
    }
}
