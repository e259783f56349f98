use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::LoaderType;

use super::types::{
    DependencyKind, RegistryDependency, RegistryFile, RegistryProject, RegistryVersion,
};
use super::ModRegistry;

const PROVIDER: &str = "Modrinth";
const MODRINTH_API_BASE: &str = "https://api.modrinth.com/v2";

fn default_base_url() -> String {
    std::env::var("MOLTEN_MODRINTH_API_BASE")
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| MODRINTH_API_BASE.to_string())
}

/// Modrinth v2 client. The SHA-1 batch lookup (`POST /version_files`)
/// makes this the hash authority for enrichment and verification.
#[derive(Clone)]
pub struct ModrinthClient {
    http: Client,
    base_url: String,
}

impl ModrinthClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: default_base_url(),
        }
    }

    /// Point the client at a different API root (mirrors, test servers).
    pub fn with_base_url(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl ModRegistry for ModrinthClient {
    async fn get_project(&self, id_or_slug: &str) -> LauncherResult<RegistryProject> {
        let url = format!("{}/project/{}", self.base_url, id_or_slug);
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::ProjectNotFound {
                provider: PROVIDER.to_string(),
                query: id_or_slug.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(LauncherError::Registry {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {} for {}", response.status().as_u16(), url),
            });
        }

        let project: ModrinthProject = response.json().await?;
        Ok(normalize_project(project))
    }

    async fn get_versions(
        &self,
        project_id: &str,
        minecraft_version: Option<&str>,
        loader: Option<LoaderType>,
    ) -> LauncherResult<Vec<RegistryVersion>> {
        let url = format!("{}/project/{}/version", self.base_url, project_id);
        let mut request = self.http.get(&url);

        if let Some(mc) = minecraft_version {
            request = request.query(&[("game_versions", serde_json::to_string(&[mc])?)]);
        }
        if let Some(loader) = loader {
            request = request.query(&[(
                "loaders",
                serde_json::to_string(&[loader.to_string()])?,
            )]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::ProjectNotFound {
                provider: PROVIDER.to_string(),
                query: project_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(LauncherError::Registry {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {} for {}", response.status().as_u16(), url),
            });
        }

        let versions: Vec<ModrinthVersion> = response.json().await?;
        Ok(versions.into_iter().filter_map(normalize_version).collect())
    }

    async fn match_hashes(
        &self,
        sha1_hashes: &[String],
    ) -> LauncherResult<HashMap<String, RegistryVersion>> {
        if sha1_hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/version_files", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&HashLookupRequest {
                hashes: sha1_hashes,
                algorithm: "sha1",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LauncherError::Registry {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {} for {}", response.status().as_u16(), url),
            });
        }

        let matched: HashMap<String, ModrinthVersion> = response.json().await?;
        debug!(
            "Modrinth matched {}/{} hashes",
            matched.len(),
            sha1_hashes.len()
        );

        Ok(matched
            .into_iter()
            .filter_map(|(hash, version)| Some((hash, normalize_version(version)?)))
            .collect())
    }
}

// ── Wire types (Modrinth is snake_case throughout) ──────

#[derive(Serialize)]
struct HashLookupRequest<'a> {
    hashes: &'a [String],
    algorithm: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ModrinthProject {
    id: String,
    slug: Option<String>,
    title: String,
    icon_url: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModrinthVersion {
    id: String,
    project_id: String,
    version_number: String,
    #[serde(default)]
    changelog: Option<String>,
    date_published: DateTime<Utc>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    #[serde(default)]
    dependencies: Vec<ModrinthDependency>,
    #[serde(default)]
    files: Vec<ModrinthVersionFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModrinthVersionFile {
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    hashes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModrinthDependency {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    version_id: Option<String>,
    dependency_type: String,
}

fn normalize_project(raw: ModrinthProject) -> RegistryProject {
    RegistryProject {
        id: raw.id,
        slug: raw.slug,
        name: raw.title,
        icon_url: raw.icon_url,
        categories: raw.categories,
    }
}

/// Versions without files cannot be installed or matched; they are dropped.
fn normalize_version(raw: ModrinthVersion) -> Option<RegistryVersion> {
    let file = raw
        .files
        .iter()
        .find(|f| f.primary)
        .or_else(|| raw.files.first())?
        .clone();

    Some(RegistryVersion {
        project_id: raw.project_id,
        version_id: raw.id,
        version_number: raw.version_number,
        changelog: raw.changelog.filter(|c| !c.is_empty()),
        date_published: raw.date_published,
        game_versions: raw.game_versions,
        loaders: raw.loaders,
        dependencies: raw
            .dependencies
            .into_iter()
            .map(|d| RegistryDependency {
                project_id: d.project_id,
                version_id: d.version_id,
                kind: DependencyKind::from_modrinth(&d.dependency_type),
            })
            .collect(),
        file: RegistryFile {
            file_name: file.filename,
            url: Some(file.url),
            size: file.size,
            sha1: file.hashes.get("sha1").cloned(),
            md5: file.hashes.get("md5").cloned(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_JSON: &str = r#"{
        "id": "AABBCCDD",
        "project_id": "P7dR8mSH",
        "version_number": "0.92.1+1.20.4",
        "changelog": "Bug fixes",
        "date_published": "2024-01-06T11:00:00Z",
        "game_versions": ["1.20.4"],
        "loaders": ["fabric"],
        "dependencies": [
            {"project_id": "mOgUt4GM", "dependency_type": "optional"},
            {"project_id": "qvFqy3oo", "dependency_type": "required"}
        ],
        "files": [
            {
                "url": "https://cdn.modrinth.com/data/P7dR8mSH/sources.jar",
                "filename": "fabric-api-sources.jar",
                "primary": false,
                "size": 100,
                "hashes": {"sha1": "aaaa"}
            },
            {
                "url": "https://cdn.modrinth.com/data/P7dR8mSH/fabric-api.jar",
                "filename": "fabric-api-0.92.1.jar",
                "primary": true,
                "size": 2048576,
                "hashes": {"sha1": "d8e1f0a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8", "sha512": "ignored"}
            }
        ]
    }"#;

    #[test]
    fn normalization_picks_the_primary_file() {
        let raw: ModrinthVersion = serde_json::from_str(VERSION_JSON).unwrap();
        let normalized = normalize_version(raw).unwrap();

        assert_eq!(normalized.version_id, "AABBCCDD");
        assert_eq!(normalized.file.file_name, "fabric-api-0.92.1.jar");
        assert_eq!(
            normalized.file.sha1.as_deref(),
            Some("d8e1f0a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8")
        );
        assert_eq!(normalized.file.size, 2048576);
        assert_eq!(normalized.dependencies.len(), 2);
        assert_eq!(normalized.dependencies[1].kind, DependencyKind::Required);
    }

    #[test]
    fn version_without_files_is_dropped() {
        let raw = ModrinthVersion {
            id: "x".into(),
            project_id: "p".into(),
            version_number: "1.0".into(),
            changelog: None,
            date_published: "2024-01-01T00:00:00Z".parse().unwrap(),
            game_versions: Vec::new(),
            loaders: Vec::new(),
            dependencies: Vec::new(),
            files: Vec::new(),
        };
        assert!(normalize_version(raw).is_none());
    }
}
