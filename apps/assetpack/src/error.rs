//! CLI error handling

use std::fmt;

use assetpack_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Error from configuration, manifest or packaging
    Assetpack(assetpack_errors::Error),
    /// Invalid command arguments
    InvalidArguments(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Assetpack(e) => write_user_facing(f, e),
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
        }
    }
}

/// Message plus code, hint and retry advice when the error provides them
fn write_user_facing(f: &mut fmt::Formatter<'_>, e: &impl UserFacingError) -> fmt::Result {
    write!(f, "{}", e.user_message())?;
    if let Some(code) = e.user_code() {
        write!(f, "\n  Code: {code}")?;
    }
    if let Some(hint) = e.user_hint() {
        write!(f, "\n  Hint: {hint}")?;
    }
    if e.is_retryable() {
        write!(f, "\n  Retry: safe to retry this operation.")?;
    }
    Ok(())
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Assetpack(e) => Some(e),
            CliError::InvalidArguments(_) => None,
        }
    }
}

impl From<assetpack_errors::Error> for CliError {
    fn from(e: assetpack_errors::Error) -> Self {
        CliError::Assetpack(e)
    }
}
