//! Re-packaging third-party archives
//!
//! A [`SourceArchive`] yields its entries lazily, one at a time, with content
//! streamed straight from the source. [`repackage`] drives that sequence into
//! a [`Tarball`] without staging anything on disk.

use crate::format::{identify_format, ArchiveFormat, Compression, HEADER_PEEK_LEN};
use crate::header::EntryHeader;
use crate::writer::{Sink, Tarball};
use assetpack_errors::{ArchiveError, Error};
use std::io::{self, Read, Seek, SeekFrom};
use tokio_util::sync::CancellationToken;

const FILE_TYPE_MASK: u32 = 0o170_000;
const SYMLINK_TYPE: u32 = 0o120_000;
const DIRECTORY_TYPE: u32 = 0o040_000;

/// Readable and seekable source stream
pub trait SourceStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> SourceStream for T {}

type TarReader = Box<dyn Read + Send>;

/// An opened third-party archive
pub struct SourceArchive {
    name: String,
    format: ArchiveFormat,
    inner: SourceInner,
}

enum SourceInner {
    Tar(tar::Archive<TarReader>),
    Zip(zip::ZipArchive<Box<dyn SourceStream>>),
}

/// What a source entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEntryKind {
    File,
    Symlink,
    Directory,
    /// Devices, fifos, hard links and anything else not carried over
    Other,
}

/// One entry read from a source archive
pub struct SourceEntry<'a> {
    pub path: String,
    pub kind: SourceEntryKind,
    pub mode: u32,
    pub size: u64,
    pub link_target: Option<String>,
    pub reader: Box<dyn Read + 'a>,
}

impl std::fmt::Debug for SourceEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("size", &self.size)
            .field("link_target", &self.link_target)
            .finish_non_exhaustive()
    }
}

impl SourceArchive {
    /// Identify `reader`'s format and open it for sequential reading
    ///
    /// `name_hint` is the file name or URL the stream came from.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unknown, has no entries to extract,
    /// or the stream cannot be read.
    pub fn open<R: SourceStream + 'static>(name_hint: &str, mut reader: R) -> Result<Self, Error> {
        let stream_error = |e: io::Error| -> Error {
            ArchiveError::ReadFailed {
                name: name_hint.to_string(),
                message: e.to_string(),
            }
            .into()
        };

        let mut header = Vec::with_capacity(HEADER_PEEK_LEN);
        reader
            .by_ref()
            .take(HEADER_PEEK_LEN as u64)
            .read_to_end(&mut header)
            .map_err(stream_error)?;
        reader.seek(SeekFrom::Start(0)).map_err(stream_error)?;

        let format = identify_format(name_hint, &header)?;
        tracing::debug!(name = name_hint, %format, "identified source archive");

        let inner = match format {
            ArchiveFormat::Tar => {
                let plain: TarReader = Box::new(reader);
                SourceInner::Tar(tar::Archive::new(plain))
            }
            ArchiveFormat::CompressedTar(compression) => {
                let decoded = decoder(compression, reader).map_err(stream_error)?;
                SourceInner::Tar(tar::Archive::new(decoded))
            }
            ArchiveFormat::Zip => {
                let boxed: Box<dyn SourceStream> = Box::new(reader);
                let archive = zip::ZipArchive::new(boxed).map_err(|e| ArchiveError::ReadFailed {
                    name: name_hint.to_string(),
                    message: e.to_string(),
                })?;
                SourceInner::Zip(archive)
            }
            ArchiveFormat::Compressed(_) => {
                return Err(ArchiveError::UnsupportedFormat {
                    name: name_hint.to_string(),
                    format: format.to_string(),
                }
                .into());
            }
        };

        Ok(Self {
            name: name_hint.to_string(),
            format,
            inner,
        })
    }

    #[must_use]
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start reading entries from the beginning of the stream
    ///
    /// Tar sources can be walked only once.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry stream cannot be started.
    pub fn entries(&mut self) -> Result<SourceEntries<'_>, Error> {
        let name = self.name.as_str();
        let inner = match &mut self.inner {
            SourceInner::Tar(archive) => {
                let entries = archive.entries().map_err(|e| ArchiveError::ReadFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
                EntriesInner::Tar(entries)
            }
            SourceInner::Zip(archive) => EntriesInner::Zip { archive, index: 0 },
        };
        Ok(SourceEntries { name, inner })
    }
}

/// Lazy sequence of entries from a [`SourceArchive`]
///
/// Each entry borrows the sequence, so it must be consumed before the next
/// one is requested.
pub struct SourceEntries<'a> {
    name: &'a str,
    inner: EntriesInner<'a>,
}

enum EntriesInner<'a> {
    Tar(tar::Entries<'a, TarReader>),
    Zip {
        archive: &'a mut zip::ZipArchive<Box<dyn SourceStream>>,
        index: usize,
    },
}

impl SourceEntries<'_> {
    /// Advance to the next entry, or `None` at the end of the archive
    pub fn next_entry(&mut self) -> Option<Result<SourceEntry<'_>, Error>> {
        let name = self.name;
        match &mut self.inner {
            EntriesInner::Tar(entries) => {
                let entry = entries.next()?;
                Some(entry.and_then(tar_entry).map_err(|e| read_failed(name, &e)))
            }
            EntriesInner::Zip { archive, index } => {
                if *index >= archive.len() {
                    return None;
                }
                let current = *index;
                *index += 1;
                Some(zip_entry(archive, current).map_err(|e| read_failed(name, &e)))
            }
        }
    }
}

fn read_failed(name: &str, err: &dyn std::fmt::Display) -> Error {
    ArchiveError::ReadFailed {
        name: name.to_string(),
        message: err.to_string(),
    }
    .into()
}

fn decoder(compression: Compression, reader: impl Read + Send + 'static) -> io::Result<TarReader> {
    let decoded: TarReader = match compression {
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
    };
    Ok(decoded)
}

fn tar_entry<'a, R: Read + 'a>(entry: tar::Entry<'a, R>) -> io::Result<SourceEntry<'a>> {
    let path = utf8(entry.path_bytes().into_owned())?;
    let header = entry.header();
    let kind = match header.entry_type() {
        tar::EntryType::Regular | tar::EntryType::Continuous => SourceEntryKind::File,
        tar::EntryType::Symlink => SourceEntryKind::Symlink,
        tar::EntryType::Directory => SourceEntryKind::Directory,
        _ => SourceEntryKind::Other,
    };
    let mode = header.mode()?;
    let link_target = match kind {
        SourceEntryKind::Symlink => entry
            .link_name_bytes()
            .map(|target| utf8(target.into_owned()))
            .transpose()?,
        _ => None,
    };
    let size = if kind == SourceEntryKind::File {
        entry.size()
    } else {
        0
    };

    Ok(SourceEntry {
        path,
        kind,
        mode,
        size,
        link_target,
        reader: Box::new(entry),
    })
}

fn zip_entry<'a>(
    archive: &'a mut zip::ZipArchive<Box<dyn SourceStream>>,
    index: usize,
) -> io::Result<SourceEntry<'a>> {
    let mut file = archive.by_index(index).map_err(io::Error::other)?;
    let path = file.name().to_string();
    let unix_mode = file.unix_mode();
    let type_bits = unix_mode.map(|m| m & FILE_TYPE_MASK);

    let kind = if file.is_dir() || type_bits == Some(DIRECTORY_TYPE) {
        SourceEntryKind::Directory
    } else if type_bits == Some(SYMLINK_TYPE) {
        SourceEntryKind::Symlink
    } else if file.is_file() {
        SourceEntryKind::File
    } else {
        SourceEntryKind::Other
    };
    let mode = unix_mode.map_or(0o644, |m| m & 0o7777);

    if kind == SourceEntryKind::Symlink {
        // zip stores the link target as the entry content
        let mut target = String::new();
        file.read_to_string(&mut target)?;
        return Ok(SourceEntry {
            path,
            kind,
            mode,
            size: 0,
            link_target: Some(target),
            reader: Box::new(io::empty()),
        });
    }

    Ok(SourceEntry {
        path,
        kind,
        mode,
        size: file.size(),
        link_target: None,
        reader: Box::new(file),
    })
}

fn utf8(bytes: Vec<u8>) -> io::Result<String> {
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Which source paths to carry over
///
/// A root ending in `/` selects everything beneath it. Any other root selects
/// that exact path and everything beneath it. No roots selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    roots: Vec<String>,
}

impl PathFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        if self.roots.is_empty() {
            return true;
        }
        self.roots.iter().any(|root| {
            if root.ends_with('/') {
                path.starts_with(root.as_str())
            } else {
                path == root
                    || path
                        .strip_prefix(root.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        })
    }
}

/// How a source path becomes a destination name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PathRewrite {
    #[default]
    Keep,
    /// Remove a leading prefix such as `piper/`; paths without it are kept
    StripPrefix(String),
}

impl PathRewrite {
    /// Destination name for `path`, or `None` when nothing remains
    #[must_use]
    pub fn apply<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rewritten = match self {
            Self::Keep => path,
            Self::StripPrefix(prefix) => path.strip_prefix(prefix.as_str()).unwrap_or(path),
        };
        let rewritten = rewritten.trim_start_matches('/');
        (!rewritten.is_empty()).then_some(rewritten)
    }
}

/// Counts from one repackage run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepackageReport {
    pub written: usize,
    pub skipped: usize,
}

/// Copy the selected entries of `source` into `tarball`
///
/// Directories and special files are skipped. Regular files and symbolic
/// links keep their mode, size and link target. `cancel` is checked between
/// entries, never mid-entry.
///
/// # Errors
///
/// Any failing entry aborts the whole run; the caller should discard the
/// destination archive. Returns [`Error::Cancelled`] if `cancel` fires.
pub fn repackage<W: Sink>(
    source: &mut SourceArchive,
    tarball: &mut Tarball<W>,
    filter: &PathFilter,
    rewrite: &PathRewrite,
    cancel: &CancellationToken,
) -> Result<RepackageReport, Error> {
    let source_name = source.name().to_string();
    let mut entries = source.entries()?;
    let mut report = RepackageReport::default();

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(source = %source_name, "repackage cancelled");
            return Err(Error::Cancelled);
        }
        let Some(entry) = entries.next_entry() else {
            break;
        };
        let entry = entry?;

        let path = entry.path.trim_start_matches("./");
        if !filter.matches(path) {
            continue;
        }

        let header = match entry.kind {
            SourceEntryKind::File | SourceEntryKind::Symlink => {
                let Some(dest) = rewrite.apply(path) else {
                    report.skipped += 1;
                    continue;
                };
                match &entry.link_target {
                    Some(target) => EntryHeader::symlink(dest, target)?,
                    None => EntryHeader::file(dest, entry.size)?,
                }
                .with_mode(entry.mode)
            }
            SourceEntryKind::Directory => continue,
            SourceEntryKind::Other => {
                tracing::debug!(source = %source_name, path, "skipping special entry");
                report.skipped += 1;
                continue;
            }
        };

        tarball.append(&header, entry.reader)?;
        report.written += 1;
    }

    tracing::info!(
        source = %source_name,
        written = report.written,
        skipped = report.skipped,
        "repackaged archive"
    );
    Ok(report)
}
