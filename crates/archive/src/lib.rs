#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Deterministic package archives for assetpack
//!
//! [`Tarball`] writes `dist.tzst`: a zstd-compressed tar built entry by entry
//! from files on disk or arbitrary readers. [`SourceArchive`] and
//! [`repackage`] stream selected entries of a downloaded third-party archive
//! (tar, compressed tar or zip) into a [`Tarball`] with their paths rewritten.

mod format;
mod header;
mod ingest;
mod writer;

pub use format::{identify_format, ArchiveFormat, Compression, HEADER_PEEK_LEN};
pub use header::{normalize_name, EntryHeader};
pub use ingest::{
    repackage, PathFilter, PathRewrite, RepackageReport, SourceArchive, SourceEntries,
    SourceEntry, SourceEntryKind, SourceStream,
};
pub use writer::{Sink, Tarball};
