use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::instance::LoaderType;
use crate::core::registry::types::{DependencyKind, RegistryDependency};

/// Where a tracked mod came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModSource {
    Modrinth,
    Curseforge,
    Local,
}

impl std::fmt::Display for ModSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModSource::Modrinth => write!(f, "modrinth"),
            ModSource::Curseforge => write!(f, "curseforge"),
            ModSource::Local => write!(f, "local"),
        }
    }
}

/// Verification badge shown next to each mod.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Hash matches a known file of the reported project.
    Verified,
    /// Project is known but the file hash differs.
    Modified,
    /// No match found: local-only or unrecognized origin.
    Unknown,
}

/// A dependency declared by a tracked mod, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModDependency {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    pub kind: DependencyKind,
}

impl ModDependency {
    /// Something readable to put in a conflict message.
    pub fn display_ref(&self) -> &str {
        self.slug
            .as_deref()
            .or(self.project_id.as_deref())
            .unwrap_or("unknown")
    }
}

impl From<RegistryDependency> for ModDependency {
    fn from(dep: RegistryDependency) -> Self {
        Self {
            project_id: dep.project_id,
            slug: None,
            kind: dep.kind,
        }
    }
}

/// One tracked mod in an instance, persisted inside `mods.json`.
///
/// `file_name` is always the canonical jar name; a disabled mod lives on
/// disk as `<file_name>.disabled` and `enabled` mirrors that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModRecord {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub file_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub source: ModSource,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub latest_changelog: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<ModDependency>,
    #[serde(default)]
    pub file_size: u64,
    pub added_at: DateTime<Utc>,
}

impl ModRecord {
    /// Tentative record for a jar the folder sync found on disk.
    /// Everything beyond the file itself waits for enrichment.
    pub fn for_local_file(file_name: String, file_size: u64, enabled: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            slug: None,
            file_name,
            name: None,
            source: ModSource::Local,
            source_id: None,
            version: None,
            latest_version: None,
            enabled,
            auto_update: false,
            update_available: false,
            icon_url: None,
            categories: Vec::new(),
            latest_changelog: None,
            dependencies: Vec::new(),
            file_size,
            added_at: Utc::now(),
        }
    }

    /// Derived badge: verified iff the record claims a registry source
    /// with a project id. Actual hash comparison happens in verification;
    /// this only has to stay consistent with its persisted side effects.
    pub fn verification_status(&self) -> VerificationStatus {
        match self.source {
            ModSource::Modrinth | ModSource::Curseforge if self.source_id.is_some() => {
                VerificationStatus::Verified
            }
            _ => VerificationStatus::Unknown,
        }
    }

    /// Records without a registry identity (or even a human name) are
    /// candidates for the next enrichment pass.
    pub fn needs_enrichment(&self) -> bool {
        self.source_id.is_none() || self.name.is_none()
    }

    /// The name this record currently has on disk.
    pub fn disk_file_name(&self) -> String {
        if self.enabled {
            self.file_name.clone()
        } else {
            format!("{}.disabled", self.file_name)
        }
    }

    /// Best human-readable name available.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) => name,
            None => self
                .file_name
                .strip_suffix(".jar")
                .unwrap_or(&self.file_name),
        }
    }

    /// Does this record satisfy a dependency reference?
    pub fn matches_project(&self, project_id: Option<&str>, slug: Option<&str>) -> bool {
        if let (Some(own), Some(wanted)) = (self.source_id.as_deref(), project_id) {
            if own == wanted {
                return true;
            }
        }
        if let (Some(own), Some(wanted)) = (self.slug.as_deref(), slug) {
            if own.eq_ignore_ascii_case(wanted) {
                return true;
            }
        }
        false
    }
}

/// Stamp left by the last completed update check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCheckStamp {
    pub checked_at: DateTime<Utc>,
    pub minecraft_version: String,
    pub loader: LoaderType,
}

/// Everything persisted per instance in `mods.json`: the tracked mods
/// plus the cache stamps the pipeline uses to skip redundant work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModsFile {
    #[serde(default)]
    pub mods: Vec<ModRecord>,
    /// Mods-directory mtime (ms) at the end of the last folder sync.
    #[serde(default)]
    pub folder_stamp_ms: Option<i64>,
    /// SHA-256 over the installed file set at the end of the last
    /// enrichment run.
    #[serde(default)]
    pub enrichment_fingerprint: Option<String>,
    #[serde(default)]
    pub update_check: Option<UpdateCheckStamp>,
}

impl ModsFile {
    pub fn find_mod(&self, mod_id: &str) -> Option<&ModRecord> {
        self.mods.iter().find(|m| m.id == mod_id)
    }

    pub fn find_mod_mut(&mut self, mod_id: &str) -> Option<&mut ModRecord> {
        self.mods.iter_mut().find(|m| m.id == mod_id)
    }
}

// ── Operation results ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub added: usize,
    pub removed: usize,
    /// True when the folder stamp matched and nothing was enumerated.
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub enriched_mods: usize,
    pub failed_lookups: usize,
    /// True when the fingerprint matched and no lookups were made.
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub file_name: String,
    pub status: VerificationStatus,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub mod_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModConflict {
    pub mod_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictPrediction {
    pub slug: String,
    pub compatible: bool,
    pub conflicts: Vec<ModConflict>,
    pub missing_dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCheckResult {
    pub total_checked: usize,
    pub updates_available: usize,
    pub failed: usize,
}

/// Combined result of the sync → enrich ∥ verify startup sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitSummary {
    pub sync: SyncResult,
    pub enriched_mods: usize,
    pub verified: usize,
    pub modified: usize,
    pub unknown: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_requires_registry_source_and_project_id() {
        let mut record = ModRecord::for_local_file("sodium.jar".to_string(), 10, true);
        assert_eq!(record.verification_status(), VerificationStatus::Unknown);

        record.source = ModSource::Modrinth;
        // source without a project id is still unknown
        assert_eq!(record.verification_status(), VerificationStatus::Unknown);

        record.source_id = Some("AANobbMI".to_string());
        assert_eq!(record.verification_status(), VerificationStatus::Verified);

        record.source = ModSource::Curseforge;
        assert_eq!(record.verification_status(), VerificationStatus::Verified);

        record.source = ModSource::Local;
        assert_eq!(record.verification_status(), VerificationStatus::Unknown);
    }

    #[test]
    fn disk_file_name_follows_enabled_flag() {
        let mut record = ModRecord::for_local_file("lithium.jar".to_string(), 10, true);
        assert_eq!(record.disk_file_name(), "lithium.jar");
        record.enabled = false;
        assert_eq!(record.disk_file_name(), "lithium.jar.disabled");
    }

    #[test]
    fn project_matching_uses_id_then_slug() {
        let mut record = ModRecord::for_local_file("sodium.jar".to_string(), 10, true);
        record.source_id = Some("AANobbMI".to_string());
        record.slug = Some("sodium".to_string());

        assert!(record.matches_project(Some("AANobbMI"), None));
        assert!(record.matches_project(None, Some("Sodium")));
        assert!(!record.matches_project(Some("other"), Some("other")));
        assert!(!record.matches_project(None, None));
    }

    #[test]
    fn mods_file_tolerates_missing_fields() {
        let file: ModsFile = serde_json::from_str("{}").unwrap();
        assert!(file.mods.is_empty());
        assert!(file.folder_stamp_ms.is_none());
        assert!(file.enrichment_fingerprint.is_none());
        assert!(file.update_check.is_none());
    }

    #[test]
    fn display_name_falls_back_to_trimmed_file_name() {
        let mut record = ModRecord::for_local_file("create-1.20.1.jar".to_string(), 10, true);
        assert_eq!(record.display_name(), "create-1.20.1");
        record.name = Some("Create".to_string());
        assert_eq!(record.display_name(), "Create");
    }
}
