//! Entry headers for the package archive

use assetpack_errors::{ArchiveError, Error};

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_LINK_MODE: u32 = 0o777;
const PERMISSION_BITS: u32 = 0o7777;

/// Header of one archive entry
///
/// The name is relative and forward-slash separated with no leading `./`.
/// A link target is present exactly when the entry is a symbolic link, and
/// symbolic links always carry a size of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    name: String,
    mode: u32,
    size: u64,
    link_target: Option<String>,
}

impl EntryHeader {
    /// Header for a regular file of exactly `size` bytes
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is empty, absolute or escapes the archive root.
    pub fn file(name: &str, size: u64) -> Result<Self, Error> {
        Ok(Self {
            name: normalize_name(name)?,
            mode: DEFAULT_FILE_MODE,
            size,
            link_target: None,
        })
    }

    /// Header for a symbolic link pointing at `target`
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is invalid or `target` is empty.
    pub fn symlink(name: &str, target: &str) -> Result<Self, Error> {
        let name = normalize_name(name)?;
        if target.is_empty() {
            return Err(ArchiveError::InvalidEntry {
                name,
                reason: "symbolic link has an empty target".to_string(),
            }
            .into());
        }
        Ok(Self {
            name,
            mode: DEFAULT_LINK_MODE,
            size: 0,
            link_target: Some(target.to_string()),
        })
    }

    /// Replace the permission bits; type bits in `mode` are dropped
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & PERMISSION_BITS;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.link_target.is_some()
    }

    /// Tar header with everything but the path filled in
    ///
    /// Ownership and timestamps are zeroed so identical inputs produce
    /// identical archives.
    pub(crate) fn to_tar_header(&self) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        if self.is_symlink() {
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(self.size);
        }
        header.set_mode(self.mode);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header
    }
}

/// Normalize an entry name to the archive's relative forward-slash form
///
/// Leading `./`, empty segments and `.` segments are removed.
///
/// # Errors
///
/// Returns an error for empty names, absolute names and names containing `..`.
pub fn normalize_name(name: &str) -> Result<String, Error> {
    let invalid = |reason: &str| -> Error {
        ArchiveError::InvalidEntry {
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    if name.starts_with('/') || name.starts_with('\\') {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid("parent directory segments are not allowed")),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(invalid("name is empty"));
    }
    Ok(segments.join("/"))
}
