use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::core::error::LauncherResult;
use crate::core::instance::Instance;
use crate::core::registry::RegistryHub;

use super::model::{ModRecord, UpdateCheckResult, UpdateCheckStamp};
use super::store::ModStore;

/// How long an update-check result stays fresh.
pub const UPDATE_CHECK_TTL_MINUTES: i64 = 30;
const UPDATE_CONCURRENCY: usize = 8;

enum UpdateOutcome {
    Finding {
        update: bool,
        latest_version: Option<String>,
        changelog: Option<String>,
    },
    Failed,
}

/// Is this stamp still good for the given instance right now?
fn stamp_covers(stamp: &UpdateCheckStamp, instance: &Instance, now: DateTime<Utc>) -> bool {
    now - stamp.checked_at < Duration::minutes(UPDATE_CHECK_TTL_MINUTES)
        && stamp.minecraft_version == instance.minecraft_version
        && stamp.loader == instance.loader
}

/// Ask each registry for the newest release of every enabled,
/// registry-claimed mod and flag the ones that are behind.
///
/// Results are cached: within the TTL (and for the same game version
/// and loader) the call returns the current flags without network
/// traffic unless `force` is set. An update means the registry's best
/// release number differs from the installed one; registry version
/// strings are not reliable semver, so no ordering is attempted.
pub async fn check_mod_updates(
    store: &ModStore,
    hub: &RegistryHub,
    instance: &Instance,
    force: bool,
) -> LauncherResult<UpdateCheckResult> {
    let snapshot = store.load(instance).await?;

    if !force {
        if let Some(stamp) = &snapshot.update_check {
            if stamp_covers(stamp, instance, Utc::now()) {
                let updates_available =
                    snapshot.mods.iter().filter(|m| m.update_available).count();
                debug!("Update check for {} still fresh, skipping", instance.id);
                return Ok(UpdateCheckResult {
                    total_checked: 0,
                    updates_available,
                    failed: 0,
                });
            }
        }
    }

    let candidates: Vec<ModRecord> = snapshot
        .mods
        .iter()
        .filter(|m| m.enabled && m.source_id.is_some() && hub.for_source(m.source).is_some())
        .cloned()
        .collect();
    let total_checked = candidates.len();

    let results: Vec<(String, UpdateOutcome)> = stream::iter(candidates)
        .map(|record| async move {
            let outcome = check_one(hub, instance, &record).await;
            (record.id, outcome)
        })
        .buffer_unordered(UPDATE_CONCURRENCY)
        .collect()
        .await;

    let _guard = store.lock_instance(&instance.id).await;
    let mut file = store.load(instance).await?;
    let mut failed = 0usize;
    for (record_id, outcome) in results {
        match outcome {
            UpdateOutcome::Failed => failed += 1,
            UpdateOutcome::Finding {
                update,
                latest_version,
                changelog,
            } => {
                if let Some(record) = file.find_mod_mut(&record_id) {
                    record.update_available = update;
                    record.latest_version = latest_version;
                    record.latest_changelog = changelog;
                }
            }
        }
    }

    // Stamp even after partial failures; `force` can always bypass
    // the window early.
    file.update_check = Some(UpdateCheckStamp {
        checked_at: Utc::now(),
        minecraft_version: instance.minecraft_version.clone(),
        loader: instance.loader,
    });
    let updates_available = file.mods.iter().filter(|m| m.update_available).count();
    store.save(instance, &file).await?;

    info!(
        "Update check for {}: {}/{} behind ({} failed)",
        instance.id, updates_available, total_checked, failed
    );
    Ok(UpdateCheckResult {
        total_checked,
        updates_available,
        failed,
    })
}

async fn check_one(hub: &RegistryHub, instance: &Instance, record: &ModRecord) -> UpdateOutcome {
    let (Some(source_id), Some(registry)) =
        (record.source_id.as_deref(), hub.for_source(record.source))
    else {
        return UpdateOutcome::Failed;
    };

    match registry
        .get_best_version(source_id, &instance.minecraft_version, instance.loader)
        .await
    {
        Ok(Some(best)) => {
            let update = record.version.as_deref() != Some(best.version_number.as_str());
            UpdateOutcome::Finding {
                update,
                latest_version: Some(best.version_number),
                changelog: best.changelog,
            }
        }
        // No compatible release at all: nothing to update to.
        Ok(None) => UpdateOutcome::Finding {
            update: false,
            latest_version: None,
            changelog: None,
        },
        Err(e) => {
            warn!("Update check failed for {}: {}", record.file_name, e);
            UpdateOutcome::Failed
        }
    }
}

/// Drop the TTL stamp so the next check hits the network again. The
/// per-mod flags are findings, not cache, and stay as they are.
pub async fn clear_update_cache(store: &ModStore, instance: &Instance) -> LauncherResult<()> {
    let _guard = store.lock_instance(&instance.id).await;
    let mut file = store.load(instance).await?;
    file.update_check = None;
    store.save(instance, &file).await?;
    Ok(())
}
