pub mod curseforge;
pub mod modrinth;
pub mod types;

pub use curseforge::CurseforgeClient;
pub use modrinth::ModrinthClient;
pub use types::{
    pick_best_version, DependencyKind, RegistryDependency, RegistryFile, RegistryProject,
    RegistryVersion,
};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::error::LauncherResult;
use crate::core::instance::LoaderType;
use crate::core::mods::model::ModSource;

/// What the pipeline needs from a mod registry.
#[async_trait]
pub trait ModRegistry: Send + Sync {
    /// Project metadata by id (or slug, where the registry supports it).
    async fn get_project(&self, id_or_slug: &str) -> LauncherResult<RegistryProject>;

    /// Release list of a project, optionally filtered server-side by
    /// game version and loader.
    async fn get_versions(
        &self,
        project_id: &str,
        minecraft_version: Option<&str>,
        loader: Option<LoaderType>,
    ) -> LauncherResult<Vec<RegistryVersion>>;

    /// Batch SHA-1 lookup: hash of an installed file → the release it
    /// belongs to. Hashes with no match are simply absent from the map.
    async fn match_hashes(
        &self,
        sha1_hashes: &[String],
    ) -> LauncherResult<HashMap<String, RegistryVersion>>;
}

/// Dispatcher without `Box<dyn>`.
#[derive(Clone)]
pub enum Registry {
    Modrinth(ModrinthClient),
    Curseforge(CurseforgeClient),
}

impl Registry {
    pub fn source(&self) -> ModSource {
        match self {
            Registry::Modrinth(_) => ModSource::Modrinth,
            Registry::Curseforge(_) => ModSource::Curseforge,
        }
    }

    pub async fn get_project(&self, id_or_slug: &str) -> LauncherResult<RegistryProject> {
        match self {
            Registry::Modrinth(c) => c.get_project(id_or_slug).await,
            Registry::Curseforge(c) => c.get_project(id_or_slug).await,
        }
    }

    pub async fn get_versions(
        &self,
        project_id: &str,
        minecraft_version: Option<&str>,
        loader: Option<LoaderType>,
    ) -> LauncherResult<Vec<RegistryVersion>> {
        match self {
            Registry::Modrinth(c) => c.get_versions(project_id, minecraft_version, loader).await,
            Registry::Curseforge(c) => c.get_versions(project_id, minecraft_version, loader).await,
        }
    }

    pub async fn match_hashes(
        &self,
        sha1_hashes: &[String],
    ) -> LauncherResult<HashMap<String, RegistryVersion>> {
        match self {
            Registry::Modrinth(c) => c.match_hashes(sha1_hashes).await,
            Registry::Curseforge(c) => c.match_hashes(sha1_hashes).await,
        }
    }

    /// Newest release compatible with the given game version and loader.
    pub async fn get_best_version(
        &self,
        project_id: &str,
        minecraft_version: &str,
        loader: LoaderType,
    ) -> LauncherResult<Option<RegistryVersion>> {
        let versions = self
            .get_versions(project_id, Some(minecraft_version), Some(loader))
            .await?;
        Ok(pick_best_version(versions))
    }
}

/// Both registry clients behind one handle. Clients are cheap to clone
/// (the `reqwest::Client` inside is reference-counted).
#[derive(Clone)]
pub struct RegistryHub {
    modrinth: ModrinthClient,
    curseforge: CurseforgeClient,
}

impl RegistryHub {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            modrinth: ModrinthClient::new(http.clone()),
            curseforge: CurseforgeClient::new(http),
        }
    }

    pub fn with_clients(modrinth: ModrinthClient, curseforge: CurseforgeClient) -> Self {
        Self {
            modrinth,
            curseforge,
        }
    }

    /// The hash authority for enrichment and verification batches.
    pub fn modrinth(&self) -> Registry {
        Registry::Modrinth(self.modrinth.clone())
    }

    /// Registry responsible for a stored record, `None` for local jars.
    pub fn for_source(&self, source: ModSource) -> Option<Registry> {
        match source {
            ModSource::Modrinth => Some(Registry::Modrinth(self.modrinth.clone())),
            ModSource::Curseforge => Some(Registry::Curseforge(self.curseforge.clone())),
            ModSource::Local => None,
        }
    }
}
