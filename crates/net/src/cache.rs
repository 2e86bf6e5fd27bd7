//! Download cache keyed by source URL
//!
//! Layout: `<cache_dir>/<percent-encoded URL>`. A file at that path is a
//! complete download: bodies stream into `<name>.part` and are renamed into
//! place only after the last byte is synced, and a failed transfer deletes
//! its `.part` file. Cache hits are not re-validated.

use crate::NetClient;
use assetpack_config::Config;
use assetpack_errors::{Error, NetworkError, StorageError};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use url::form_urlencoded;

/// Suffix of in-flight downloads
const PARTIAL_SUFFIX: &str = ".part";

/// Cache file name for a source address
#[must_use]
pub fn cache_key(url: &str) -> String {
    form_urlencoded::byte_serialize(url.as_bytes()).collect()
}

/// Fetches remote files once and serves later requests from disk
#[derive(Clone)]
pub struct CachingDownloader {
    client: NetClient,
    cache_dir: PathBuf,
}

impl CachingDownloader {
    #[must_use]
    pub fn new(client: NetClient, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// Build a downloader for the cache under `root` described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &Config, root: &Path) -> Result<Self, Error> {
        let client = NetClient::new((&config.network).into())?;
        Ok(Self::new(client, config.cache_dir(root)))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local path a source address is cached at
    #[must_use]
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(cache_key(url))
    }

    /// Return the cached copy of `url`, downloading it first if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the request fails or returns a
    /// non-success status, or the body cannot be written to the cache.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, Error> {
        let path = self.cache_path(url);
        let cached = fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &path))?;
        if cached {
            tracing::debug!(url, path = %path.display(), "cache hit");
            return Ok(path);
        }

        url::Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;

        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &self.cache_dir))?;

        tracing::info!(url, "downloading file");
        let partial = partial_path(&path);
        let size = match self.download_to(url, &partial).await {
            Ok(size) => size,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial, &path).await {
            discard_partial(&partial).await;
            return Err(StorageError::AtomicRenameFailed {
                message: format!("{} -> {}: {e}", partial.display(), path.display()),
            }
            .into());
        }

        tracing::info!(url, path = %path.display(), bytes = size, "download completed");
        Ok(path)
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, Error> {
        let response = self.client.get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::HttpError {
                url: url.to_string(),
                status: status.as_u16(),
                message: status.to_string(),
            }
            .into());
        }

        let mut file = File::create(dest)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, dest))?;
        let write_error = |e: std::io::Error| -> Error {
            StorageError::IoError {
                message: format!("failed to write {}: {e}", dest.display()),
            }
            .into()
        };

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| NetworkError::DownloadFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            file.write_all(&chunk).await.map_err(write_error)?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        Ok(downloaded)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn discard_partial(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %partial.display(), error = %e, "failed to remove partial download");
        }
    }
}
