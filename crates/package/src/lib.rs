#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package assembly for assetpack
//!
//! Turns manifest entries into package directories:
//!
//! ```text
//! <output>/<prefix>voice-<name>/  dist.tzst dist.json MODEL_CARD.txt README.md
//! <output>/<prefix>bin-<name>/    dist.tzst dist.json README.md
//! ```

mod assembler;
pub mod naming;
mod scaffold;

pub use assembler::PackageAssembler;
pub use scaffold::{render_readme, run_build_command, write_readme, LicenseSource};

use assetpack_hash::Metadata;
use std::fmt;
use std::path::PathBuf;

/// The two kinds of package this tool emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Voice,
    Binary,
}

impl PackageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Binary => "bin",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one assembled package
#[derive(Debug, Clone)]
pub struct PackageReport {
    pub kind: PackageKind,
    /// Directory name, e.g. `piper-bin-linux`
    pub name: String,
    pub dir: PathBuf,
    /// Entries written to `dist.tzst`
    pub entries: usize,
    pub metadata: Metadata,
}
