#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! xxHash-128 content fingerprints for assetpack
//!
//! A fingerprint is one XXH3-128 digest accumulated over the bytes of a set of
//! files, streamed in lexicographic path order. Call-site ordering never
//! affects the result.

mod metadata;

pub use metadata::{read_metadata, write_metadata, Metadata};

use assetpack_errors::{Error, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use xxhash_rust::xxh3::Xxh3;

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// A 128-bit content fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u128);

impl Fingerprint {
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    /// High 64 bits
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn hi(self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// Low 64 bits
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn lo(self) -> u64 {
        self.0 as u64
    }

    /// Fingerprint of an in-memory byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data))
    }

    /// Big-endian hex rendering, 32 characters
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse from hex string
    ///
    /// # Errors
    /// Returns an error if the input is not 32 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| StorageError::InvalidFingerprint {
            value: s.to_string(),
            message: e.to_string(),
        })?;
        let array: [u8; 16] =
            bytes
                .try_into()
                .map_err(|b: Vec<u8>| StorageError::InvalidFingerprint {
                    value: s.to_string(),
                    message: format!("expected 16 bytes, got {}", b.len()),
                })?;
        Ok(Self(u128::from_be_bytes(array)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// On-disk shape of a fingerprint: `{"Hi": u64, "Lo": u64}`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Halves {
    hi: u64,
    lo: u64,
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Halves {
            hi: self.hi(),
            lo: self.lo(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let halves = Halves::deserialize(deserializer)?;
        Ok(Self((u128::from(halves.hi) << 64) | u128::from(halves.lo)))
    }
}

/// Streaming hasher that accumulates file contents into one fingerprint
pub struct ContentHasher {
    state: Xxh3,
    buffer: Vec<u8>,
    bytes: u64,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Xxh3::new(),
            buffer: vec![0; CHUNK_SIZE],
            bytes: 0,
        }
    }

    /// Feed raw bytes
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
        self.bytes += data.len() as u64;
    }

    /// Stream a whole file into the hash
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn update_file(&mut self, path: &Path) -> Result<(), Error> {
        let mut file = File::open(path)
            .await
            .map_err(|e| hash_io_error(&e, path))?;

        loop {
            let n = file
                .read(&mut self.buffer)
                .await
                .map_err(|e| hash_io_error(&e, path))?;
            if n == 0 {
                break;
            }
            self.state.update(&self.buffer[..n]);
            self.bytes += n as u64;
        }
        Ok(())
    }

    /// Total bytes fed so far
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.state.digest128())
    }
}

/// Fingerprint a set of files in sorted path order
///
/// Paths are compared as raw strings, not component-wise, so
/// `a/b` sorts after `a.b` exactly as a plain string sort would.
///
/// # Errors
/// Returns an error if any file cannot be opened or read.
pub async fn compute_fingerprint<P: AsRef<Path>>(files: &[P]) -> Result<Fingerprint, Error> {
    let sorted = sorted_paths(files);

    let mut hasher = ContentHasher::new();
    for path in &sorted {
        hasher.update_file(path).await?;
    }

    let fingerprint = hasher.finish();
    tracing::debug!(
        files = sorted.len(),
        bytes = hasher.bytes_hashed(),
        fingerprint = %fingerprint,
        "computed content fingerprint"
    );
    Ok(fingerprint)
}

fn sorted_paths<P: AsRef<Path>>(files: &[P]) -> Vec<PathBuf> {
    let mut sorted: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
    sorted.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    sorted
}

fn hash_io_error(err: &std::io::Error, path: &Path) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        return StorageError::from_io_with_path(err, path).into();
    }
    StorageError::IoError {
        message: format!("failed to hash file {}: {err}", path.display()),
    }
    .into()
}

#[cfg(test)]
mod tests;
