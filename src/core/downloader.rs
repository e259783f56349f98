use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

const DEFAULT_CONCURRENCY: usize = 8;

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

/// Concurrent, SHA-1 validated downloader for mod jars.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    // ── Single file download ────────────────────────────

    /// Download a single file to `dest`, optionally validating SHA-1.
    ///
    /// The hash is checked on the in-memory body before anything touches
    /// disk, and the body lands in a `.part` sibling that is renamed into
    /// place only once fully written. Either way a failed download never
    /// leaves a partial file at `dest`.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<()> {
        // Ensure parent dir exists
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;

        // Validate SHA-1 before writing (compute on the in-memory buffer)
        if let Some(expected) = sha1_expected {
            let mut hasher = Sha1::new();
            hasher.update(&bytes);
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| LauncherError::Other(format!("Invalid download target: {dest:?}")))?;
        let part_path = dest.with_file_name(format!("{file_name}.part"));

        // Write inside a block to ensure the handle is dropped before the
        // rename — critical on Windows.
        let write_result: LauncherResult<()> = async {
            let mut file =
                tokio::fs::File::create(&part_path)
                    .await
                    .map_err(|e| LauncherError::Io {
                        path: part_path.clone(),
                        source: e,
                    })?;
            file.write_all(&bytes)
                .await
                .map_err(|e| LauncherError::Io {
                    path: part_path.clone(),
                    source: e,
                })?;
            file.flush().await.map_err(|e| LauncherError::Io {
                path: part_path.clone(),
                source: e,
            })?;
            Ok(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e);
        }

        tokio::fs::rename(&part_path, dest)
            .await
            .map_err(|e| LauncherError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    ///
    /// Returns the list of files that failed (if any).
    pub async fn download_batch(
        &self,
        entries: Vec<DownloadEntry>,
    ) -> Vec<(DownloadEntry, LauncherError)> {
        info!(
            "Starting batch download: {} files, concurrency={}",
            entries.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| {
                let client = &self;
                async move {
                    let result = client
                        .download_file(&entry.url, &entry.dest, entry.sha1.as_deref())
                        .await;
                    (entry, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(entry, result)| match result {
                Ok(()) => None,
                Err(e) => Some((entry, e)),
            })
            .collect()
    }
}

/// Hex-encoded SHA-1 of a file on disk.
pub async fn file_sha1_hex(path: &Path) -> LauncherResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| LauncherError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded MD5 of a file on disk (CurseForge's secondary hash).
pub async fn file_md5_hex(path: &Path) -> LauncherResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| LauncherError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(hex::encode(md5::Md5::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sha1_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = file_sha1_hex(&path).await.unwrap();
        assert_eq!(digest, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[tokio::test]
    async fn md5_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = file_md5_hex(&path).await.unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn sha1_of_missing_file_reports_the_path() {
        let err = file_sha1_hex(Path::new("/no/such/file.jar"))
            .await
            .unwrap_err();
        match err {
            LauncherError::Io { path, .. } => {
                assert_eq!(path, Path::new("/no/such/file.jar"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
