use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{Instance, LoaderType};
use crate::core::registry::{DependencyKind, RegistryHub, RegistryProject, RegistryVersion};

use super::model::{ConflictPrediction, ModConflict, ModDependency, ModRecord, ModSource};
use super::store::ModStore;

/// How deep the auto-resolver follows dependency-of-dependency chains.
const MAX_DEPENDENCY_DEPTH: usize = 8;

/// Dependency slugs the loader itself (or the game) provides, so they
/// never count as missing.
fn is_builtin_slug(slug: &str, loader: LoaderType) -> bool {
    let lowered = slug.to_ascii_lowercase();
    if matches!(lowered.as_str(), "minecraft" | "java") {
        return true;
    }
    match loader {
        LoaderType::Fabric => matches!(lowered.as_str(), "fabricloader" | "fabric-loader"),
        LoaderType::Quilt => matches!(
            lowered.as_str(),
            "quilt_loader" | "quilt-loader" | "fabricloader" | "fabric-loader"
        ),
        LoaderType::Forge => lowered == "forge",
        LoaderType::NeoForge => lowered == "neoforge",
        LoaderType::Vanilla => false,
    }
}

fn is_loader_provided(dep: &ModDependency, loader: LoaderType) -> bool {
    dep.slug
        .as_deref()
        .map(|s| is_builtin_slug(s, loader))
        .unwrap_or(false)
}

/// Pure scan of the tracked list for dependency problems among the
/// enabled mods: missing required dependencies, declared
/// incompatibilities that are both present, and the same project
/// installed twice. Disabled mods are invisible to the running game,
/// so they neither satisfy requirements nor trigger incompatibilities.
pub fn scan_conflicts(mods: &[ModRecord], loader: LoaderType) -> Vec<ModConflict> {
    let enabled: Vec<&ModRecord> = mods.iter().filter(|m| m.enabled).collect();
    let mut conflicts = Vec::new();

    for record in &enabled {
        for dep in &record.dependencies {
            if dep.project_id.is_none() && dep.slug.is_none() {
                continue;
            }
            match dep.kind {
                DependencyKind::Required => {
                    if is_loader_provided(dep, loader) {
                        continue;
                    }
                    let satisfied = enabled.iter().any(|other| {
                        other.matches_project(dep.project_id.as_deref(), dep.slug.as_deref())
                    });
                    if !satisfied {
                        conflicts.push(ModConflict {
                            mod_name: record.display_name().to_string(),
                            description: format!(
                                "Missing required dependency: {}",
                                dep.display_ref()
                            ),
                        });
                    }
                }
                DependencyKind::Incompatible => {
                    if let Some(other) = enabled.iter().find(|other| {
                        other.matches_project(dep.project_id.as_deref(), dep.slug.as_deref())
                    }) {
                        conflicts.push(ModConflict {
                            mod_name: record.display_name().to_string(),
                            description: format!("Incompatible with {}", other.display_name()),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    // Same project installed twice.
    let mut seen: HashMap<(ModSource, &str), &ModRecord> = HashMap::new();
    for record in &enabled {
        if let Some(source_id) = record.source_id.as_deref() {
            if let Some(first) = seen.insert((record.source, source_id), *record) {
                conflicts.push(ModConflict {
                    mod_name: record.display_name().to_string(),
                    description: format!("Duplicate of {}", first.display_name()),
                });
            }
        }
    }

    conflicts
}

/// Conflict scan over the persisted list. Never touches the network.
pub async fn check_mod_dependencies(
    store: &ModStore,
    instance: &Instance,
) -> LauncherResult<Vec<ModConflict>> {
    let file = store.load(instance).await?;
    Ok(scan_conflicts(&file.mods, instance.loader))
}

/// Would installing `mod_slug` from Modrinth into this instance work?
///
/// Looks up the project and its best release for the instance's game
/// version, then checks it against what is currently enabled. Purely
/// advisory: nothing is downloaded and nothing is persisted.
pub async fn predict_mod_conflicts(
    store: &ModStore,
    hub: &RegistryHub,
    instance: &Instance,
    mod_slug: &str,
) -> LauncherResult<ConflictPrediction> {
    let file = store.load(instance).await?;
    let enabled: Vec<&ModRecord> = file.mods.iter().filter(|m| m.enabled).collect();

    let registry = hub.modrinth();
    let project = registry.get_project(mod_slug).await?;
    let best = registry
        .get_best_version(&project.id, &instance.minecraft_version, instance.loader)
        .await?;

    let Some(candidate) = best else {
        return Ok(ConflictPrediction {
            slug: mod_slug.to_string(),
            compatible: false,
            conflicts: vec![ModConflict {
                mod_name: project.name,
                description: format!(
                    "No release for Minecraft {} on {}",
                    instance.minecraft_version, instance.loader
                ),
            }],
            missing_dependencies: Vec::new(),
        });
    };

    let mut conflicts = Vec::new();
    let mut missing = Vec::new();

    if let Some(existing) = enabled
        .iter()
        .find(|m| m.matches_project(Some(&project.id), project.slug.as_deref()))
    {
        conflicts.push(ModConflict {
            mod_name: existing.display_name().to_string(),
            description: "Already installed".to_string(),
        });
    }

    for dep in &candidate.dependencies {
        match dep.kind {
            DependencyKind::Required => {
                let Some(dep_id) = dep.project_id.as_deref() else {
                    continue;
                };
                let satisfied = enabled.iter().any(|m| m.matches_project(Some(dep_id), None));
                if !satisfied {
                    missing.push(dep_id.to_string());
                }
            }
            DependencyKind::Incompatible => {
                if let Some(m) = enabled
                    .iter()
                    .find(|m| m.matches_project(dep.project_id.as_deref(), None))
                {
                    conflicts.push(ModConflict {
                        mod_name: m.display_name().to_string(),
                        description: format!("{} declares it incompatible", project.name),
                    });
                }
            }
            _ => {}
        }
    }

    // Installed mods can also declare the candidate incompatible.
    for record in &enabled {
        for dep in &record.dependencies {
            if dep.kind != DependencyKind::Incompatible {
                continue;
            }
            let hits_id = dep.project_id.as_deref() == Some(project.id.as_str());
            let hits_slug = dep.slug.is_some() && dep.slug.as_deref() == project.slug.as_deref();
            if hits_id || hits_slug {
                conflicts.push(ModConflict {
                    mod_name: record.display_name().to_string(),
                    description: format!("Declares {} incompatible", project.name),
                });
            }
        }
    }

    let compatible = conflicts.is_empty() && missing.is_empty();
    Ok(ConflictPrediction {
        slug: mod_slug.to_string(),
        compatible,
        conflicts,
        missing_dependencies: missing,
    })
}

struct PlannedInstall {
    project: RegistryProject,
    version: RegistryVersion,
    url: String,
    source: ModSource,
}

/// Download and install every required dependency the enabled mods
/// declare but nothing satisfies, following transitive requirements up
/// to [`MAX_DEPENDENCY_DEPTH`].
///
/// All-or-nothing: if any dependency cannot be resolved (unknown
/// project, no compatible release, downloads disallowed) nothing is
/// installed and the list comes back empty; if a download fails, the
/// already-downloaded files are removed again. A disabled copy of a
/// dependency counts as satisfying so no duplicate is pulled in.
pub async fn auto_resolve_dependencies(
    store: &ModStore,
    hub: &RegistryHub,
    downloader: &Downloader,
    instance: &Instance,
) -> LauncherResult<Vec<ModRecord>> {
    let file = store.load(instance).await?;

    let mut queue: VecDeque<(ModSource, String, usize)> = VecDeque::new();
    let mut queued: HashSet<(ModSource, String)> = HashSet::new();

    for record in file.mods.iter().filter(|m| m.enabled) {
        for dep in &record.dependencies {
            if dep.kind != DependencyKind::Required || is_loader_provided(dep, instance.loader) {
                continue;
            }
            let Some(project_id) = dep.project_id.clone() else {
                continue;
            };
            if file
                .mods
                .iter()
                .any(|m| m.matches_project(Some(&project_id), dep.slug.as_deref()))
            {
                continue;
            }
            // Dependencies resolve in the registry of the mod that
            // declares them; local records fall back to Modrinth.
            let source = if hub.for_source(record.source).is_some() {
                record.source
            } else {
                ModSource::Modrinth
            };
            if queued.insert((source, project_id.clone())) {
                queue.push_back((source, project_id, 0));
            }
        }
    }

    if queue.is_empty() {
        return Ok(Vec::new());
    }

    // Plan the whole closure before downloading anything.
    let mut plan: Vec<PlannedInstall> = Vec::new();
    while let Some((source, project_id, depth)) = queue.pop_front() {
        let Some(registry) = hub.for_source(source) else {
            continue;
        };
        let project = match registry.get_project(&project_id).await {
            Ok(p) => p,
            Err(e @ LauncherError::ProjectNotFound { .. }) => {
                warn!("Dependency {} cannot be resolved: {}", project_id, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let version = match registry
            .get_best_version(&project.id, &instance.minecraft_version, instance.loader)
            .await?
        {
            Some(v) => v,
            None => {
                warn!(
                    "Dependency {} has no release for {} on {}",
                    project.name, instance.minecraft_version, instance.loader
                );
                return Ok(Vec::new());
            }
        };
        let Some(url) = version.file.url.clone() else {
            warn!("Dependency {} does not allow automatic downloads", project.name);
            return Ok(Vec::new());
        };

        if depth < MAX_DEPENDENCY_DEPTH {
            for dep in &version.dependencies {
                if dep.kind != DependencyKind::Required {
                    continue;
                }
                let Some(dep_id) = dep.project_id.clone() else {
                    continue;
                };
                if file.mods.iter().any(|m| m.matches_project(Some(&dep_id), None)) {
                    continue;
                }
                if queued.insert((source, dep_id.clone())) {
                    queue.push_back((source, dep_id, depth + 1));
                }
            }
        }

        plan.push(PlannedInstall {
            project,
            version,
            url,
            source,
        });
    }

    let mods_dir = instance.mods_dir();
    let entries: Vec<DownloadEntry> = plan
        .iter()
        .map(|p| DownloadEntry {
            url: p.url.clone(),
            dest: mods_dir.join(&p.version.file.file_name),
            sha1: p.version.file.sha1.clone(),
            size: Some(p.version.file.size),
        })
        .collect();

    let _guard = store.lock_instance(&instance.id).await;

    let failures = downloader.download_batch(entries.clone()).await;
    if !failures.is_empty() {
        for entry in &entries {
            let _ = tokio::fs::remove_file(&entry.dest).await;
        }
        let (entry, error) = failures
            .into_iter()
            .next()
            .map(|(e, err)| (e.url, err))
            .unwrap_or_else(|| (String::new(), LauncherError::Other("download failed".into())));
        warn!("Dependency download failed for {}: {}", entry, error);
        return Err(error);
    }

    let mut file = store.load(instance).await?;
    let mut installed = Vec::new();
    for p in plan {
        // Could have raced in through another call while unlocked.
        if file
            .mods
            .iter()
            .any(|m| m.matches_project(Some(&p.project.id), p.project.slug.as_deref()))
        {
            continue;
        }
        let record = ModRecord {
            id: Uuid::new_v4().to_string(),
            slug: p.project.slug,
            file_name: p.version.file.file_name.clone(),
            name: Some(p.project.name),
            source: p.source,
            source_id: Some(p.project.id),
            version: Some(p.version.version_number),
            latest_version: None,
            enabled: true,
            auto_update: false,
            update_available: false,
            icon_url: p.project.icon_url,
            categories: p.project.categories,
            latest_changelog: None,
            dependencies: p
                .version
                .dependencies
                .into_iter()
                .map(ModDependency::from)
                .collect(),
            file_size: p.version.file.size,
            added_at: Utc::now(),
        };
        file.mods.push(record.clone());
        installed.push(record);
    }
    file.mods.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    store.save(instance, &file).await?;

    info!(
        "Auto-resolved {} dependencies for {}",
        installed.len(),
        instance.id
    );
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::DependencyKind;

    fn record(name: &str, source_id: Option<&str>, slug: Option<&str>) -> ModRecord {
        let mut r = ModRecord::for_local_file(format!("{name}.jar"), 1, true);
        r.name = Some(name.to_string());
        r.slug = slug.map(str::to_string);
        if let Some(id) = source_id {
            r.source = ModSource::Modrinth;
            r.source_id = Some(id.to_string());
        }
        r
    }

    fn dep(kind: DependencyKind, project_id: Option<&str>, slug: Option<&str>) -> ModDependency {
        ModDependency {
            project_id: project_id.map(str::to_string),
            slug: slug.map(str::to_string),
            kind,
        }
    }

    #[test]
    fn missing_required_dependency_is_reported() {
        let mut sodium = record("Sodium", Some("AANobbMI"), Some("sodium"));
        sodium.dependencies = vec![dep(DependencyKind::Required, Some("P7dR8mSH"), None)];

        let conflicts = scan_conflicts(&[sodium], LoaderType::Fabric);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].description.contains("P7dR8mSH"));
    }

    #[test]
    fn satisfied_dependency_is_not_reported() {
        let mut sodium = record("Sodium", Some("AANobbMI"), Some("sodium"));
        sodium.dependencies = vec![dep(DependencyKind::Required, Some("P7dR8mSH"), None)];
        let fabric_api = record("Fabric API", Some("P7dR8mSH"), Some("fabric-api"));

        let conflicts = scan_conflicts(&[sodium, fabric_api], LoaderType::Fabric);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn disabled_mod_does_not_satisfy_a_requirement() {
        let mut sodium = record("Sodium", Some("AANobbMI"), Some("sodium"));
        sodium.dependencies = vec![dep(DependencyKind::Required, Some("P7dR8mSH"), None)];
        let mut fabric_api = record("Fabric API", Some("P7dR8mSH"), Some("fabric-api"));
        fabric_api.enabled = false;

        let conflicts = scan_conflicts(&[sodium, fabric_api], LoaderType::Fabric);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn loader_provided_slugs_are_never_missing() {
        let mut m = record("Some Mod", Some("abc"), None);
        m.dependencies = vec![
            dep(DependencyKind::Required, None, Some("fabricloader")),
            dep(DependencyKind::Required, None, Some("minecraft")),
        ];

        assert!(scan_conflicts(&[m], LoaderType::Fabric).is_empty());
    }

    #[test]
    fn declared_incompatibility_is_reported_when_both_enabled() {
        let mut optifine = record("OptiFine", Some("opt"), Some("optifine"));
        optifine.dependencies = vec![dep(DependencyKind::Incompatible, Some("AANobbMI"), None)];
        let sodium = record("Sodium", Some("AANobbMI"), Some("sodium"));

        let conflicts = scan_conflicts(&[optifine, sodium], LoaderType::Fabric);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].mod_name, "OptiFine");
        assert!(conflicts[0].description.contains("Sodium"));
    }

    #[test]
    fn duplicate_project_is_reported() {
        let a = record("Sodium", Some("AANobbMI"), Some("sodium"));
        let b = record("Sodium (old)", Some("AANobbMI"), Some("sodium"));

        let conflicts = scan_conflicts(&[a, b], LoaderType::Fabric);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].description.contains("Duplicate"));
    }
}
