//! Fixed names of the artifacts every package directory carries
//!
//! These are not exposed via TOML configuration: consumers of a package look
//! them up by name.

pub const ARCHIVE_FILENAME: &str = "dist.tzst";
pub const METADATA_FILENAME: &str = "dist.json";
pub const MODEL_CARD_FILENAME: &str = "MODEL_CARD.txt";
pub const README_FILENAME: &str = "README.md";

pub const DEFAULT_CACHE_SUBDIR: &str = "assetpack.cache";
pub const DEFAULT_NAME_PREFIX: &str = "piper-";

/// Lowest zstd level accepted from configuration
pub const MIN_COMPRESSION_LEVEL: i32 = 1;
/// Highest zstd level (ultra); also the default
pub const MAX_COMPRESSION_LEVEL: i32 = 22;
