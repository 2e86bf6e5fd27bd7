//! `dist.json`: the version and fingerprint of a package's artifacts

use crate::{compute_fingerprint, Fingerprint};
use assetpack_config::constants::METADATA_FILENAME;
use assetpack_errors::{Error, PackageError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Metadata record written next to the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    pub version: String,
    pub hash: Fingerprint,
}

/// Fingerprint `files` and write `{version, hash}` into `dir`
///
/// The record is written to a temporary name and renamed into place, so a
/// reader never observes a half-written file.
///
/// # Errors
///
/// Returns an error if any input file cannot be read or the record cannot be
/// written.
pub async fn write_metadata<P: AsRef<Path>>(
    dir: &Path,
    version: &str,
    files: &[P],
) -> Result<Metadata, Error> {
    let metadata = Metadata {
        version: version.to_string(),
        hash: compute_fingerprint(files).await?,
    };

    let json = serde_json::to_vec(&metadata)?;
    let path = dir.join(METADATA_FILENAME);
    let temp_path = dir.join(format!("{METADATA_FILENAME}.tmp"));

    let write_error = |e: std::io::Error| PackageError::MetadataWrite {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    fs::write(&temp_path, &json).await.map_err(write_error)?;
    if let Err(e) = fs::rename(&temp_path, &path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(write_error(e).into());
    }

    tracing::info!(
        path = %path.display(),
        version = %metadata.version,
        hash = %metadata.hash,
        "wrote package metadata"
    );
    Ok(metadata)
}

/// Read a previously written record
///
/// # Errors
///
/// Returns an error if the file is missing or not valid JSON.
pub async fn read_metadata(dir: &Path) -> Result<Metadata, Error> {
    let path = dir.join(METADATA_FILENAME);
    let bytes = fs::read(&path)
        .await
        .map_err(|e| Error::io_with_path(&e, &path))?;
    Ok(serde_json::from_slice(&bytes)?)
}
