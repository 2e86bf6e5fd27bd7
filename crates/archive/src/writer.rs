//! Streaming writer for `dist.tzst` archives
//!
//! Layers are strictly nested: tar entry writer over a zstd encoder over the
//! output sink. Closing walks them inner to outer and attempts every layer
//! even after an earlier one fails.

use crate::header::EntryHeader;
use assetpack_config::constants::{MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL};
use assetpack_errors::{ArchiveError, CloseFailure, CloseLayer, Error};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

type Encoder<W> = zstd::stream::write::Encoder<'static, W>;

/// Output end of an archive
pub trait Sink: Write {
    /// Release the sink once all bytes have been written
    ///
    /// # Errors
    ///
    /// Returns the error reported while persisting buffered data.
    fn close(&mut self) -> io::Result<()>;
}

impl Sink for File {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

/// Append-only compressed tar archive
///
/// Entries are written one at a time in call order. Nothing is final until
/// [`Tarball::close`] succeeds.
pub struct Tarball<W: Sink = File> {
    path: PathBuf,
    builder: tar::Builder<Encoder<W>>,
    entries: usize,
}

impl Tarball<File> {
    /// Create an archive at `path` using the highest compression level
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the file cannot be created,
    /// or the encoder fails to initialize.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::create_with(path, MAX_COMPRESSION_LEVEL)
    }

    /// Create an archive at `path` with an explicit zstd level
    ///
    /// # Errors
    ///
    /// Returns an error if `level` is out of range, the parent directory or
    /// the file cannot be created, or the encoder fails to initialize.
    pub fn create_with(path: impl AsRef<Path>, level: i32) -> Result<Self, Error> {
        let path = path.as_ref();
        check_level(level)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
        }

        let file = File::create(path).map_err(|e| ArchiveError::CreateFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        match Self::from_writer(file, path, level) {
            Ok(tarball) => {
                tracing::debug!(path = %path.display(), level, "created archive");
                Ok(tarball)
            }
            Err(e) => {
                // the encoder owned the handle and has already dropped it
                remove_quietly(path);
                Err(e)
            }
        }
    }

    /// Close the archive and delete it
    ///
    /// Used on failure paths so a half-written archive never stays on disk.
    pub fn discard(self) {
        let path = self.path.clone();
        if let Err(e) = self.close() {
            tracing::debug!(path = %path.display(), error = %e, "close failed while discarding archive");
        }
        remove_quietly(&path);
        tracing::debug!(path = %path.display(), "discarded partial archive");
    }
}

impl<W: Sink> Tarball<W> {
    /// Wrap an arbitrary sink; `path` is only used to label errors
    ///
    /// # Errors
    ///
    /// Returns an error if `level` is out of range or the encoder fails to
    /// initialize.
    pub fn from_writer(sink: W, path: impl Into<PathBuf>, level: i32) -> Result<Self, Error> {
        let path = path.into();
        check_level(level)?;

        let encoder = Encoder::new(sink, level).map_err(|e| ArchiveError::Encoding {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            path,
            builder: tar::Builder::new(encoder),
            entries: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries appended so far
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Write one entry; tar padding completes it, the encoder keeps buffering
    ///
    /// Regular entries must supply exactly `header.size()` bytes. Symbolic
    /// links never read from `content`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content length disagrees with the header or
    /// any layer fails to accept the bytes. The archive must then be
    /// discarded.
    pub fn append<R: Read>(&mut self, header: &EntryHeader, content: R) -> Result<(), Error> {
        let mut tar_header = header.to_tar_header();

        if let Some(target) = header.link_target() {
            self.builder
                .append_link(&mut tar_header, header.name(), target)
                .map_err(|e| self.write_failed(header, &e))?;
        } else {
            let mut reader = SizedReader::new(content, header.size());
            if let Err(e) = self
                .builder
                .append_data(&mut tar_header, header.name(), &mut reader)
            {
                return Err(match reader.mismatch() {
                    Some(detail) => ArchiveError::SizeMismatch {
                        entry: header.name().to_string(),
                        expected: header.size(),
                        detail,
                    }
                    .into(),
                    None => self.write_failed(header, &e),
                });
            }
        }

        self.entries += 1;

        tracing::debug!(
            archive = %self.path.display(),
            entry = header.name(),
            size = header.size(),
            "appended entry"
        );
        Ok(())
    }

    /// Append a file from disk under the name `dest`
    ///
    /// The source is inspected without following links, so a symbolic link
    /// is stored as a link and its target is never read.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be inspected or read, is neither
    /// a regular file nor a symbolic link, or the entry cannot be written.
    pub fn append_file(&mut self, dest: &str, source: &Path) -> Result<(), Error> {
        let metadata =
            fs::symlink_metadata(source).map_err(|e| Error::io_with_path(&e, source))?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(source).map_err(|e| Error::io_with_path(&e, source))?;
            let target = target.to_str().ok_or_else(|| ArchiveError::UnsupportedEntry {
                path: source.display().to_string(),
                reason: "link target is not valid UTF-8".to_string(),
            })?;
            let header = EntryHeader::symlink(dest, target)?.with_mode(permission_bits(&metadata));
            return self.append(&header, io::empty());
        }

        if !file_type.is_file() {
            return Err(ArchiveError::UnsupportedEntry {
                path: source.display().to_string(),
                reason: "not a regular file or symbolic link".to_string(),
            }
            .into());
        }

        let header = EntryHeader::file(dest, metadata.len())?.with_mode(permission_bits(&metadata));
        let file = File::open(source).map_err(|e| Error::io_with_path(&e, source))?;
        self.append(&header, BufReader::new(file))
    }

    /// Finish the archive: tar trailer, zstd epilogue, then the sink
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::CloseFailed`] listing every layer that failed.
    pub fn close(self) -> Result<(), Error> {
        let Self {
            path,
            mut builder,
            entries,
        } = self;
        let mut failures = Vec::new();

        if let Err(e) = builder.finish() {
            failures.push(CloseFailure::new(CloseLayer::Writer, &e));
        }

        match builder.into_inner() {
            Ok(encoder) => match encoder.try_finish() {
                Ok(mut sink) => {
                    if let Err(e) = sink.close() {
                        failures.push(CloseFailure::new(CloseLayer::File, &e));
                    }
                }
                Err((mut encoder, e)) => {
                    failures.push(CloseFailure::new(CloseLayer::Encoder, &e));
                    if let Err(e) = encoder.get_mut().close() {
                        failures.push(CloseFailure::new(CloseLayer::File, &e));
                    }
                }
            },
            Err(e) => failures.push(CloseFailure::new(CloseLayer::Writer, &e)),
        }

        if failures.is_empty() {
            tracing::debug!(path = %path.display(), entries, "closed archive");
            Ok(())
        } else {
            Err(ArchiveError::CloseFailed {
                path: path.display().to_string(),
                failures,
            }
            .into())
        }
    }

    fn write_failed(&self, header: &EntryHeader, err: &io::Error) -> Error {
        ArchiveError::WriteFailed {
            path: self.path.display().to_string(),
            entry: header.name().to_string(),
            message: err.to_string(),
        }
        .into()
    }
}

fn check_level(level: i32) -> Result<(), Error> {
    if (MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(ArchiveError::InvalidCompressionLevel {
            level,
            min: MIN_COMPRESSION_LEVEL,
            max: MAX_COMPRESSION_LEVEL,
        }
        .into())
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove archive");
        }
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Reader that yields exactly `expected` bytes or fails
struct SizedReader<R> {
    inner: R,
    expected: u64,
    remaining: u64,
    mismatch: Option<String>,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, expected: u64) -> Self {
        Self {
            inner,
            expected,
            remaining: expected,
            mismatch: None,
        }
    }

    fn mismatch(&mut self) -> Option<String> {
        self.mismatch.take()
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            let mut probe = [0u8; 1];
            if self.inner.read(&mut probe)? > 0 {
                self.mismatch = Some("longer".to_string());
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "content longer than declared size",
                ));
            }
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let limit = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(buf.len());
        let n = self.inner.read(&mut buf[..limit])?;
        if n == 0 {
            let got = self.expected - self.remaining;
            self.mismatch = Some(format!("only {got} bytes"));
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "content shorter than declared size",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
