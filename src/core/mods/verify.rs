use std::collections::HashMap;

use futures_util::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::core::downloader::{file_md5_hex, file_sha1_hex};
use crate::core::error::LauncherResult;
use crate::core::events::emit_verification_progress;
use crate::core::instance::Instance;
use crate::core::registry::{RegistryHub, RegistryProject};

use super::model::{ModRecord, ModSource, VerificationResult, VerificationStatus};
use super::store::ModStore;

const VERIFY_CONCURRENCY: usize = 8;

/// Metadata a sha1 batch hit contributes back to an unclaimed record.
struct Claim {
    record_id: String,
    project_id: String,
    slug: Option<String>,
    name: Option<String>,
    version: String,
}

enum ClaimedOutcome {
    /// Some release file of the claimed project has this exact hash.
    Match { version_number: String },
    /// The project is known but no release file matches the hash.
    NoMatch,
    /// The registry could not be consulted.
    Lookup(String),
}

/// Check every installed file against the registries and classify it as
/// verified, modified or unknown.
///
/// Returns one result per tracked mod, in list order, so the counts
/// always sum to the number of installed mods. Files the sha1 batch
/// claims get their registry identity persisted as a side effect;
/// registry failures degrade the affected files to `Unknown` instead of
/// failing the call.
pub async fn verify_instance_mods(
    store: &ModStore,
    hub: &RegistryHub,
    instance: &Instance,
    app_handle: Option<&tauri::AppHandle>,
) -> LauncherResult<Vec<VerificationResult>> {
    let snapshot = store.load(instance).await?;
    let mods_dir = instance.mods_dir();
    let total = snapshot.mods.len();

    emit_verification_progress(
        app_handle,
        &instance.id,
        "hashing",
        0,
        total,
        format!("Hashing {total} files"),
    );

    // ── Phase 1: hash everything on disk ────────────────────
    let mut sha1_by_record: HashMap<String, String> = HashMap::new();
    let mut statuses: HashMap<String, VerificationResult> = HashMap::new();
    for (index, record) in snapshot.mods.iter().enumerate() {
        let path = mods_dir.join(record.disk_file_name());
        match file_sha1_hex(&path).await {
            Ok(hash) => {
                sha1_by_record.insert(record.id.clone(), hash);
            }
            Err(e) => {
                debug!("Could not hash {}: {}", record.file_name, e);
                statuses.insert(record.id.clone(), unknown_result(record));
            }
        }
        emit_verification_progress(
            app_handle,
            &instance.id,
            "hashing",
            index + 1,
            total,
            record.file_name.clone(),
        );
    }

    emit_verification_progress(
        app_handle,
        &instance.id,
        "matching",
        0,
        total,
        "Matching against registries".to_string(),
    );

    // ── Phase 2a: claim unclaimed files by sha1 ─────────────
    let unclaimed: Vec<&ModRecord> = snapshot
        .mods
        .iter()
        .filter(|r| r.source_id.is_none() && sha1_by_record.contains_key(&r.id))
        .collect();
    let batch_hashes: Vec<String> = unclaimed
        .iter()
        .filter_map(|r| sha1_by_record.get(&r.id).cloned())
        .collect();
    let matches = if batch_hashes.is_empty() {
        HashMap::new()
    } else {
        match hub.modrinth().match_hashes(&batch_hashes).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Hash batch lookup failed during verification: {e}");
                HashMap::new()
            }
        }
    };

    // Project names for the hits, fetched once per distinct project.
    let mut hit_project_ids: Vec<String> = matches.values().map(|v| v.project_id.clone()).collect();
    hit_project_ids.sort();
    hit_project_ids.dedup();
    let projects: HashMap<String, RegistryProject> = stream::iter(hit_project_ids)
        .map(|id| {
            let registry = hub.modrinth();
            async move {
                let project = registry.get_project(&id).await;
                (id, project)
            }
        })
        .buffer_unordered(VERIFY_CONCURRENCY)
        .filter_map(|(id, result)| async move {
            match result {
                Ok(p) => Some((id, p)),
                Err(e) => {
                    debug!("Project lookup failed for {id}: {e}");
                    None
                }
            }
        })
        .collect()
        .await;

    let mut claims: Vec<Claim> = Vec::new();
    for record in &unclaimed {
        let Some(hash) = sha1_by_record.get(&record.id) else {
            continue;
        };
        match matches.get(hash) {
            Some(version) => {
                let project = projects.get(&version.project_id);
                claims.push(Claim {
                    record_id: record.id.clone(),
                    project_id: version.project_id.clone(),
                    slug: project.and_then(|p| p.slug.clone()),
                    name: project.map(|p| p.name.clone()),
                    version: version.version_number.clone(),
                });
                statuses.insert(
                    record.id.clone(),
                    VerificationResult {
                        file_name: record.file_name.clone(),
                        status: VerificationStatus::Verified,
                        project_id: Some(version.project_id.clone()),
                        project_name: project
                            .map(|p| p.name.clone())
                            .or_else(|| record.name.clone()),
                        mod_id: Some(record.id.clone()),
                    },
                );
            }
            None => {
                statuses.insert(record.id.clone(), unknown_result(record));
            }
        }
    }

    // ── Phase 2b: re-check files already claimed ────────────
    let claimed: Vec<ModRecord> = snapshot
        .mods
        .iter()
        .filter(|r| r.source_id.is_some() && sha1_by_record.contains_key(&r.id))
        .cloned()
        .collect();

    let claimed_results: Vec<(ModRecord, ClaimedOutcome)> = stream::iter(claimed)
        .map(|record| {
            let sha1 = sha1_by_record.get(&record.id).cloned();
            let mods_dir = mods_dir.clone();
            async move {
                let outcome = check_claimed(hub, &mods_dir, &record, sha1.as_deref()).await;
                (record, outcome)
            }
        })
        .buffer_unordered(VERIFY_CONCURRENCY)
        .collect()
        .await;

    let mut version_fixes: Vec<(String, String)> = Vec::new();
    for (record, outcome) in claimed_results {
        let status = match outcome {
            ClaimedOutcome::Match { version_number } => {
                if record.version.as_deref() != Some(version_number.as_str()) {
                    version_fixes.push((record.id.clone(), version_number));
                }
                VerificationStatus::Verified
            }
            ClaimedOutcome::NoMatch => VerificationStatus::Modified,
            ClaimedOutcome::Lookup(reason) => {
                warn!("Could not verify {}: {}", record.file_name, reason);
                VerificationStatus::Unknown
            }
        };
        statuses.insert(
            record.id.clone(),
            VerificationResult {
                file_name: record.file_name.clone(),
                status,
                project_id: record.source_id.clone(),
                project_name: record.name.clone(),
                mod_id: Some(record.id.clone()),
            },
        );
    }

    // ── Phase 3: persist what the registries taught us ──────
    if !claims.is_empty() || !version_fixes.is_empty() {
        let _guard = store.lock_instance(&instance.id).await;
        let mut file = store.load(instance).await?;
        let mut changed = false;
        for claim in claims {
            if let Some(record) = file.find_mod_mut(&claim.record_id) {
                record.source = ModSource::Modrinth;
                record.source_id = Some(claim.project_id);
                if record.slug.is_none() {
                    record.slug = claim.slug;
                }
                if record.name.is_none() {
                    record.name = claim.name;
                }
                record.version = Some(claim.version);
                changed = true;
            }
        }
        for (record_id, version) in version_fixes {
            if let Some(record) = file.find_mod_mut(&record_id) {
                record.version = Some(version);
                changed = true;
            }
        }
        if changed {
            store.save(instance, &file).await?;
        }
    }

    let results: Vec<VerificationResult> = snapshot
        .mods
        .iter()
        .map(|record| {
            statuses
                .remove(&record.id)
                .unwrap_or_else(|| unknown_result(record))
        })
        .collect();

    let verified = results
        .iter()
        .filter(|r| matches!(r.status, VerificationStatus::Verified))
        .count();
    emit_verification_progress(
        app_handle,
        &instance.id,
        "complete",
        total,
        total,
        format!("{verified}/{total} verified"),
    );
    info!(
        "Verified mods for {}: {}/{} confirmed",
        instance.id, verified, total
    );

    Ok(results)
}

async fn check_claimed(
    hub: &RegistryHub,
    mods_dir: &std::path::Path,
    record: &ModRecord,
    sha1: Option<&str>,
) -> ClaimedOutcome {
    let Some(source_id) = record.source_id.as_deref() else {
        return ClaimedOutcome::Lookup("record has no source id".to_string());
    };
    let Some(registry) = hub.for_source(record.source) else {
        return ClaimedOutcome::Lookup("record source has no registry".to_string());
    };

    let versions = match registry.get_versions(source_id, None, None).await {
        Ok(v) => v,
        Err(e) => return ClaimedOutcome::Lookup(e.to_string()),
    };
    if versions.is_empty() {
        return ClaimedOutcome::Lookup("registry lists no releases".to_string());
    }

    for version in &versions {
        if let (Some(expected), Some(actual)) = (version.file.sha1.as_deref(), sha1) {
            if expected.eq_ignore_ascii_case(actual) {
                return ClaimedOutcome::Match {
                    version_number: version.version_number.clone(),
                };
            }
        }
    }

    // Some registries publish md5 only for certain files; hash again
    // with md5 just for those.
    if versions
        .iter()
        .any(|v| v.file.sha1.is_none() && v.file.md5.is_some())
    {
        let path = mods_dir.join(record.disk_file_name());
        if let Ok(md5) = file_md5_hex(&path).await {
            for version in &versions {
                if let Some(expected) = version.file.md5.as_deref() {
                    if expected.eq_ignore_ascii_case(&md5) {
                        return ClaimedOutcome::Match {
                            version_number: version.version_number.clone(),
                        };
                    }
                }
            }
        }
    }

    ClaimedOutcome::NoMatch
}

fn unknown_result(record: &ModRecord) -> VerificationResult {
    VerificationResult {
        file_name: record.file_name.clone(),
        status: VerificationStatus::Unknown,
        project_id: record.source_id.clone(),
        project_name: record.name.clone(),
        mod_id: Some(record.id.clone()),
    }
}
