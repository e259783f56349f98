use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a dependency relates to the mod that declares it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Required,
    Optional,
    Incompatible,
    Embedded,
}

impl DependencyKind {
    /// Modrinth `dependency_type` strings.
    pub fn from_modrinth(raw: &str) -> Self {
        match raw {
            "required" => DependencyKind::Required,
            "incompatible" => DependencyKind::Incompatible,
            "embedded" => DependencyKind::Embedded,
            _ => DependencyKind::Optional,
        }
    }

    /// CurseForge `relationType` codes. Returns `None` for relations that
    /// are not dependencies (tools, assets).
    pub fn from_curseforge(relation_type: i64) -> Option<Self> {
        match relation_type {
            1 | 6 => Some(DependencyKind::Embedded),
            2 => Some(DependencyKind::Optional),
            3 => Some(DependencyKind::Required),
            5 => Some(DependencyKind::Incompatible),
            _ => None,
        }
    }
}

/// Project metadata normalized across registries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryProject {
    pub id: String,
    pub slug: Option<String>,
    pub name: String,
    pub icon_url: Option<String>,
    pub categories: Vec<String>,
}

/// A downloadable release of a project, normalized across registries.
/// `file` is the primary artifact; registries that ship secondary files
/// (sources, javadoc) have those dropped during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryVersion {
    pub project_id: String,
    pub version_id: String,
    pub version_number: String,
    pub changelog: Option<String>,
    pub date_published: DateTime<Utc>,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub dependencies: Vec<RegistryDependency>,
    pub file: RegistryFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    pub file_name: String,
    /// Absent when the author disallows third-party downloads (CurseForge).
    pub url: Option<String>,
    pub size: u64,
    pub sha1: Option<String>,
    pub md5: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDependency {
    pub project_id: Option<String>,
    pub version_id: Option<String>,
    pub kind: DependencyKind,
}

/// "Best" release among compatible candidates: newest by publish date.
pub fn pick_best_version(versions: Vec<RegistryVersion>) -> Option<RegistryVersion> {
    versions
        .into_iter()
        .max_by_key(|version| version.date_published)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(id: &str, published: &str) -> RegistryVersion {
        RegistryVersion {
            project_id: "P1".to_string(),
            version_id: id.to_string(),
            version_number: id.to_string(),
            changelog: None,
            date_published: published.parse().unwrap(),
            game_versions: vec!["1.21.1".to_string()],
            loaders: vec!["fabric".to_string()],
            dependencies: Vec::new(),
            file: RegistryFile {
                file_name: format!("{id}.jar"),
                url: Some(format!("https://cdn.example/{id}.jar")),
                size: 1024,
                sha1: None,
                md5: None,
            },
        }
    }

    #[test]
    fn best_version_is_newest_by_publish_date() {
        let versions = vec![
            version("v1", "2024-01-10T00:00:00Z"),
            version("v3", "2024-06-01T12:30:00Z"),
            version("v2", "2024-03-15T08:00:00Z"),
        ];
        let best = pick_best_version(versions).unwrap();
        assert_eq!(best.version_id, "v3");
    }

    #[test]
    fn best_version_of_empty_list_is_none() {
        assert!(pick_best_version(Vec::new()).is_none());
    }

    #[test]
    fn modrinth_dependency_kinds_map() {
        assert_eq!(
            DependencyKind::from_modrinth("required"),
            DependencyKind::Required
        );
        assert_eq!(
            DependencyKind::from_modrinth("incompatible"),
            DependencyKind::Incompatible
        );
        assert_eq!(
            DependencyKind::from_modrinth("embedded"),
            DependencyKind::Embedded
        );
        assert_eq!(
            DependencyKind::from_modrinth("something-new"),
            DependencyKind::Optional
        );
    }

    #[test]
    fn curseforge_relation_types_map() {
        assert_eq!(
            DependencyKind::from_curseforge(3),
            Some(DependencyKind::Required)
        );
        assert_eq!(
            DependencyKind::from_curseforge(5),
            Some(DependencyKind::Incompatible)
        );
        assert_eq!(
            DependencyKind::from_curseforge(1),
            Some(DependencyKind::Embedded)
        );
        assert_eq!(
            DependencyKind::from_curseforge(6),
            Some(DependencyKind::Embedded)
        );
        // relationType 4 is "tool", not a dependency
        assert_eq!(DependencyKind::from_curseforge(4), None);
    }
}
