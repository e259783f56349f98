use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::LoaderType;

use super::types::{DependencyKind, RegistryDependency, RegistryFile, RegistryProject, RegistryVersion};
use super::ModRegistry;

const PROVIDER: &str = "CurseForge";
const CURSEFORGE_API_BASE: &str = "https://api.curseforge.com/v1";
const GAME_ID_MINECRAFT: i64 = 432;
const FILES_PAGE_SIZE: u32 = 50;

fn api_key_from_env() -> Option<String> {
    for key in ["MOLTEN_CURSEFORGE_API_KEY", "CURSEFORGE_API_KEY"] {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

/// CurseForge v1 client. Every request carries the `x-api-key` header;
/// without a configured key the client fails fast with a clear error.
#[derive(Clone)]
pub struct CurseforgeClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CurseforgeClient {
    pub fn new(http: Client) -> Self {
        let api_key = api_key_from_env();
        if api_key.is_none() {
            warn!("No CurseForge API key configured; CurseForge lookups will fail");
        }
        Self {
            http,
            base_url: CURSEFORGE_API_BASE.to_string(),
            api_key,
        }
    }

    fn key(&self) -> LauncherResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LauncherError::Registry {
                provider: PROVIDER.to_string(),
                message: "API key not configured (set MOLTEN_CURSEFORGE_API_KEY)".to_string(),
            })
    }

    async fn get_mod_by_id(&self, id: i64) -> LauncherResult<CurseforgeMod> {
        let url = format!("{}/mods/{}", self.base_url, id);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", self.key()?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::ProjectNotFound {
                provider: PROVIDER.to_string(),
                query: id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(self.status_error(response.status(), &url));
        }

        let body: CurseforgeModResponse = response.json().await?;
        Ok(body.data)
    }

    /// CurseForge has no direct slug lookup; fall back to a slug-filtered
    /// search within the Minecraft game id.
    async fn get_mod_by_slug(&self, slug: &str) -> LauncherResult<CurseforgeMod> {
        let url = format!("{}/mods/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", self.key()?)
            .query(&[
                ("gameId", GAME_ID_MINECRAFT.to_string()),
                ("slug", slug.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.status_error(response.status(), &url));
        }

        let body: CurseforgeSearchResponse = response.json().await?;
        body.data
            .into_iter()
            .find(|m| m.slug.as_deref() == Some(slug))
            .ok_or_else(|| LauncherError::ProjectNotFound {
                provider: PROVIDER.to_string(),
                query: slug.to_string(),
            })
    }

    fn status_error(&self, status: StatusCode, url: &str) -> LauncherError {
        let message = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                "API key rejected".to_string()
            }
            other => format!("HTTP {} for {}", other.as_u16(), url),
        };
        LauncherError::Registry {
            provider: PROVIDER.to_string(),
            message,
        }
    }
}

#[async_trait]
impl ModRegistry for CurseforgeClient {
    async fn get_project(&self, id_or_slug: &str) -> LauncherResult<RegistryProject> {
        let raw = match id_or_slug.trim().parse::<i64>() {
            Ok(id) => self.get_mod_by_id(id).await?,
            Err(_) => self.get_mod_by_slug(id_or_slug.trim()).await?,
        };
        Ok(normalize_project(raw))
    }

    async fn get_versions(
        &self,
        project_id: &str,
        minecraft_version: Option<&str>,
        loader: Option<LoaderType>,
    ) -> LauncherResult<Vec<RegistryVersion>> {
        let id: i64 = project_id
            .trim()
            .parse()
            .map_err(|_| LauncherError::Registry {
                provider: PROVIDER.to_string(),
                message: format!("Invalid project id: {project_id}"),
            })?;

        let url = format!("{}/mods/{}/files", self.base_url, id);
        let mut request = self
            .http
            .get(&url)
            .header("x-api-key", self.key()?)
            .query(&[("pageSize", FILES_PAGE_SIZE.to_string())]);

        if let Some(mc) = minecraft_version {
            request = request.query(&[("gameVersion", mc)]);
        }
        if let Some(param) = loader.and_then(loader_param) {
            request = request.query(&[("modLoaderType", param.to_string())]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LauncherError::ProjectNotFound {
                provider: PROVIDER.to_string(),
                query: project_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(self.status_error(response.status(), &url));
        }

        let body: CurseforgeFilesResponse = response.json().await?;
        Ok(body.data.into_iter().map(normalize_file).collect())
    }

    /// CurseForge's batch lookup is keyed by murmur2 fingerprints, not
    /// SHA-1, so it cannot answer the hash sets this pipeline produces.
    /// Modrinth stays the hash authority; this always matches nothing.
    async fn match_hashes(
        &self,
        _sha1_hashes: &[String],
    ) -> LauncherResult<HashMap<String, RegistryVersion>> {
        Ok(HashMap::new())
    }
}

/// CurseForge `modLoaderType` query codes.
fn loader_param(loader: LoaderType) -> Option<i64> {
    match loader {
        LoaderType::Forge => Some(1),
        LoaderType::Fabric => Some(4),
        LoaderType::Quilt => Some(5),
        LoaderType::NeoForge => Some(6),
        LoaderType::Vanilla => None,
    }
}

// ── Wire types (CurseForge is camelCase throughout) ─────

#[derive(Debug, Deserialize)]
struct CurseforgeModResponse {
    data: CurseforgeMod,
}

#[derive(Debug, Deserialize)]
struct CurseforgeSearchResponse {
    #[serde(default)]
    data: Vec<CurseforgeMod>,
}

#[derive(Debug, Deserialize)]
struct CurseforgeFilesResponse {
    #[serde(default)]
    data: Vec<CurseforgeFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct CurseforgeLogo {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CurseforgeCategory {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CurseforgeMod {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    categories: Vec<CurseforgeCategory>,
    #[serde(default)]
    logo: Option<CurseforgeLogo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurseforgeFileHash {
    #[serde(default)]
    value: String,
    #[serde(default)]
    algo: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurseforgeFileDependency {
    mod_id: i64,
    #[serde(default)]
    relation_type: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurseforgeFile {
    id: i64,
    mod_id: i64,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    file_name: String,
    file_date: DateTime<Utc>,
    #[serde(default)]
    file_length: u64,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    hashes: Vec<CurseforgeFileHash>,
    #[serde(default)]
    dependencies: Vec<CurseforgeFileDependency>,
}

fn normalize_project(raw: CurseforgeMod) -> RegistryProject {
    RegistryProject {
        id: raw.id.to_string(),
        slug: raw.slug,
        name: raw.name,
        icon_url: raw.logo.map(|l| l.url),
        categories: raw
            .categories
            .into_iter()
            .map(|c| c.name)
            .filter(|n| !n.is_empty())
            .collect(),
    }
}

/// A CurseForge "file" is what every other registry calls a version.
/// `gameVersions` mixes loader names into the version list; split them.
fn normalize_file(raw: CurseforgeFile) -> RegistryVersion {
    let mut game_versions = Vec::new();
    let mut loaders = Vec::new();
    for entry in raw.game_versions {
        let lowered = entry.to_lowercase();
        if matches!(lowered.as_str(), "forge" | "fabric" | "quilt" | "neoforge") {
            loaders.push(lowered);
        } else if entry.starts_with(|c: char| c.is_ascii_digit()) {
            game_versions.push(entry);
        }
    }

    let sha1 = raw
        .hashes
        .iter()
        .find(|h| h.algo == 1)
        .map(|h| h.value.clone());
    let md5 = raw
        .hashes
        .iter()
        .find(|h| h.algo == 2)
        .map(|h| h.value.clone());

    RegistryVersion {
        project_id: raw.mod_id.to_string(),
        version_id: raw.id.to_string(),
        version_number: raw.display_name,
        changelog: None,
        date_published: raw.file_date,
        game_versions,
        loaders,
        dependencies: raw
            .dependencies
            .into_iter()
            .filter_map(|d| {
                Some(RegistryDependency {
                    project_id: Some(d.mod_id.to_string()),
                    version_id: None,
                    kind: DependencyKind::from_curseforge(d.relation_type)?,
                })
            })
            .collect(),
        file: RegistryFile {
            file_name: raw.file_name,
            url: raw.download_url,
            size: raw.file_length,
            sha1,
            md5,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_JSON: &str = r#"{
        "id": 5112233,
        "modId": 238222,
        "displayName": "JEI 17.3.0.49",
        "fileName": "jei-1.20.4-forge-17.3.0.49.jar",
        "fileDate": "2024-02-10T18:22:05.39Z",
        "fileLength": 1334455,
        "downloadUrl": null,
        "gameVersions": ["1.20.4", "Forge", "Client"],
        "hashes": [
            {"value": "0123456789abcdef0123456789abcdef01234567", "algo": 1},
            {"value": "abcdefabcdefabcdefabcdefabcdefab", "algo": 2}
        ],
        "dependencies": [
            {"modId": 250398, "relationType": 3},
            {"modId": 999999, "relationType": 4}
        ]
    }"#;

    #[test]
    fn file_normalization_splits_loaders_and_versions() {
        let raw: CurseforgeFile = serde_json::from_str(FILE_JSON).unwrap();
        let version = normalize_file(raw);

        assert_eq!(version.project_id, "238222");
        assert_eq!(version.version_id, "5112233");
        assert_eq!(version.game_versions, vec!["1.20.4".to_string()]);
        assert_eq!(version.loaders, vec!["forge".to_string()]);
        // "Client" is neither a loader nor a game version
        assert_eq!(
            version.file.sha1.as_deref(),
            Some("0123456789abcdef0123456789abcdef01234567")
        );
        assert_eq!(
            version.file.md5.as_deref(),
            Some("abcdefabcdefabcdefabcdefabcdefab")
        );
        // Authors can disallow third-party downloads
        assert!(version.file.url.is_none());
        // relationType 4 (tool) is dropped, the required dep survives
        assert_eq!(version.dependencies.len(), 1);
        assert_eq!(version.dependencies[0].kind, DependencyKind::Required);
        assert_eq!(version.dependencies[0].project_id.as_deref(), Some("250398"));
    }

    #[test]
    fn loader_params_match_the_api_enum() {
        assert_eq!(loader_param(LoaderType::Forge), Some(1));
        assert_eq!(loader_param(LoaderType::Fabric), Some(4));
        assert_eq!(loader_param(LoaderType::Quilt), Some(5));
        assert_eq!(loader_param(LoaderType::NeoForge), Some(6));
        assert_eq!(loader_param(LoaderType::Vanilla), None);
    }
}
