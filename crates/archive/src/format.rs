//! Source archive format detection

use assetpack_errors::{ArchiveError, Error};
use std::fmt;

/// Bytes needed to recognize every supported format (the ustar magic ends at 262)
pub const HEADER_PEEK_LEN: usize = 262;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const BZIP2_MAGIC: &[u8] = b"BZh";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

/// Stream compression wrapped around a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// Identified format of a source stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Uncompressed tar
    Tar,
    /// Tar inside a compression stream
    CompressedTar(Compression),
    /// A compressed single file with no container to extract entries from
    Compressed(Compression),
    Zip,
}

impl ArchiveFormat {
    /// Whether entries can be read one by one
    #[must_use]
    pub fn is_extractable(self) -> bool {
        !matches!(self, Self::Compressed(_))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tar => f.write_str("tar"),
            Self::CompressedTar(c) => write!(f, "tar.{c}"),
            Self::Compressed(c) => write!(f, "{c}"),
            Self::Zip => f.write_str("zip"),
        }
    }
}

/// Identify a source from its leading bytes and a file name or URL hint
///
/// Magic bytes decide the container or compression. For compressed streams
/// the hint decides whether a tar is inside (`.tar.gz`, `.tgz` and so on).
///
/// # Errors
///
/// Returns [`ArchiveError::UnrecognizedFormat`] if the bytes match nothing
/// supported.
pub fn identify_format(name_hint: &str, header: &[u8]) -> Result<ArchiveFormat, Error> {
    let compression = if header.starts_with(GZIP_MAGIC) {
        Some(Compression::Gzip)
    } else if header.starts_with(ZSTD_MAGIC) {
        Some(Compression::Zstd)
    } else if header.starts_with(XZ_MAGIC) {
        Some(Compression::Xz)
    } else if header.starts_with(BZIP2_MAGIC) {
        Some(Compression::Bzip2)
    } else {
        None
    };

    if let Some(compression) = compression {
        return Ok(if hints_tar(name_hint) {
            ArchiveFormat::CompressedTar(compression)
        } else {
            ArchiveFormat::Compressed(compression)
        });
    }

    if header.starts_with(ZIP_MAGIC) || header.starts_with(ZIP_EMPTY_MAGIC) {
        return Ok(ArchiveFormat::Zip);
    }

    if header
        .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
        .is_some_and(|magic| magic == USTAR_MAGIC)
    {
        return Ok(ArchiveFormat::Tar);
    }

    Err(ArchiveError::UnrecognizedFormat {
        name: name_hint.to_string(),
    }
    .into())
}

fn hints_tar(name_hint: &str) -> bool {
    // URLs may carry a query string after the file name
    let name = name_hint
        .split(['?', '#'])
        .next()
        .unwrap_or(name_hint)
        .rsplit('/')
        .next()
        .unwrap_or(name_hint)
        .to_ascii_lowercase();

    name.contains(".tar.")
        || [".tgz", ".tbz", ".tbz2", ".txz", ".tzst"]
            .iter()
            .any(|ext| name.ends_with(ext))
}
