//! Archive writing and repackaging error types

use std::borrow::Cow;
use std::fmt;

use crate::UserFacingError;
use thiserror::Error;

/// Layer of an archive writer that failed to close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseLayer {
    /// The tar entry writer (end-of-archive marker)
    Writer,
    /// The compression encoder (frame epilogue)
    Encoder,
    /// The underlying file handle
    File,
}

impl fmt::Display for CloseLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Writer => "writer",
            Self::Encoder => "encoder",
            Self::File => "file",
        };
        f.write_str(name)
    }
}

/// A single close failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFailure {
    pub layer: CloseLayer,
    pub message: String,
}

impl CloseFailure {
    #[must_use]
    pub fn new(layer: CloseLayer, err: &std::io::Error) -> Self {
        Self {
            layer,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to close {}: {}", self.layer, self.message)
    }
}

struct FailureList<'a>(&'a [CloseFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    #[error("failed to create archive {path}: {message}")]
    CreateFailed { path: String, message: String },

    #[error("failed to initialize zstd encoder for {path}: {message}")]
    Encoding { path: String, message: String },

    #[error("invalid compression level {level}: expected {min}..={max}")]
    InvalidCompressionLevel { level: i32, min: i32, max: i32 },

    #[error("invalid entry name {name:?}: {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("failed to write entry {entry:?} to {path}: {message}")]
    WriteFailed {
        path: String,
        entry: String,
        message: String,
    },

    #[error("entry {entry:?} declared {expected} bytes but its content was {detail}")]
    SizeMismatch {
        entry: String,
        expected: u64,
        detail: String,
    },

    #[error("cannot archive {path}: {reason}")]
    UnsupportedEntry { path: String, reason: String },

    #[error("failed to close archive {path}: {}", FailureList(.failures))]
    CloseFailed {
        path: String,
        failures: Vec<CloseFailure>,
    },

    #[error("could not identify archive format of {name}")]
    UnrecognizedFormat { name: String },

    #[error("{format} is not an extractable archive format: {name}")]
    UnsupportedFormat { name: String, format: String },

    #[error("failed to read {name}: {message}")]
    ReadFailed { name: String, message: String },
}

impl ArchiveError {
    /// Layers that failed to close, if this is a close failure
    #[must_use]
    pub fn close_failures(&self) -> &[CloseFailure] {
        match self {
            Self::CloseFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl UserFacingError for ArchiveError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCompressionLevel { .. } => {
                Some("Set `archive.compression_level` to a valid zstd level.")
            }
            Self::UnsupportedFormat { .. } | Self::UnrecognizedFormat { .. } => {
                Some("Supported sources are tar, tar.gz, tar.bz2, tar.xz, tar.zst and zip.")
            }
            Self::CloseFailed { .. } => {
                Some("The archive on disk is incomplete; delete it and rebuild the package.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::CreateFailed { .. } => "archive.create_failed",
            Self::Encoding { .. } => "archive.encoding",
            Self::InvalidCompressionLevel { .. } => "archive.invalid_compression_level",
            Self::InvalidEntry { .. } => "archive.invalid_entry",
            Self::WriteFailed { .. } => "archive.write_failed",
            Self::SizeMismatch { .. } => "archive.size_mismatch",
            Self::UnsupportedEntry { .. } => "archive.unsupported_entry",
            Self::CloseFailed { .. } => "archive.close_failed",
            Self::UnrecognizedFormat { .. } => "archive.unrecognized_format",
            Self::UnsupportedFormat { .. } => "archive.unsupported_format",
            Self::ReadFailed { .. } => "archive.read_failed",
        };
        Some(code)
    }
}
