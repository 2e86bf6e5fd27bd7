//! Package assembly error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PackageError {
    #[error("unexpected file {file:?} in {package}: extension {extension:?} is not recognized")]
    UnexpectedFile {
        package: String,
        file: String,
        extension: String,
    },

    #[error("invalid source URL {url}: {message}")]
    InvalidSource { url: String, message: String },

    #[error("`{command}` failed in {dir}: {message}")]
    CommandFailed {
        command: String,
        dir: String,
        message: String,
    },

    #[error("failed to write metadata to {path}: {message}")]
    MetadataWrite { path: String, message: String },
}

impl UserFacingError for PackageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnexpectedFile { .. } => Some(
                "Remove the file from the manifest or set `package.unknown_files = \"skip\"`.",
            ),
            Self::CommandFailed { .. } => Some("Inspect the command output above and retry."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnexpectedFile { .. } => "package.unexpected_file",
            Self::InvalidSource { .. } => "package.invalid_source",
            Self::CommandFailed { .. } => "package.command_failed",
            Self::MetadataWrite { .. } => "package.metadata_write",
        };
        Some(code)
    }
}
