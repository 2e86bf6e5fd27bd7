//! Package assembly: download, archive, fingerprint, scaffold

use crate::naming::VoiceFile;
use crate::scaffold::{run_build_command, write_readme, LicenseSource};
use crate::{PackageKind, PackageReport};
use assetpack_archive::{repackage, PathFilter, PathRewrite, SourceArchive, Tarball};
use assetpack_config::constants::{ARCHIVE_FILENAME, MODEL_CARD_FILENAME};
use assetpack_config::{BinaryAsset, Config, UnknownFilePolicy, VoiceAsset};
use assetpack_errors::{Error, PackageError};
use assetpack_hash::write_metadata;
use assetpack_net::CachingDownloader;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;

/// Builds package directories under one output root
///
/// Each call owns its own archive writer, so independent packages can be
/// assembled concurrently from clones of the same assembler.
#[derive(Clone)]
pub struct PackageAssembler {
    config: Config,
    output_dir: PathBuf,
    downloader: CachingDownloader,
    cancel: CancellationToken,
}

impl PackageAssembler {
    #[must_use]
    pub fn new(config: Config, output_dir: impl Into<PathBuf>, downloader: CachingDownloader) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
            downloader,
            cancel: CancellationToken::new(),
        }
    }

    /// Assembler whose download cache lives under `output_dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: Config, output_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let output_dir = output_dir.into();
        let downloader = CachingDownloader::from_config(&config, &output_dir)?;
        Ok(Self::new(config, output_dir, downloader))
    }

    /// Stop work at the next entry or file boundary when `cancel` fires
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory name of a package, e.g. `piper-voice-alan`
    #[must_use]
    pub fn package_name(&self, kind: PackageKind, name: &str) -> String {
        format!("{}{}-{name}", self.config.package.name_prefix, kind.as_str())
    }

    #[must_use]
    pub fn package_dir(&self, kind: PackageKind, name: &str) -> PathBuf {
        self.output_dir.join(self.package_name(kind, name))
    }

    /// Build a voice package from its individually hosted files
    ///
    /// # Errors
    ///
    /// Returns an error if a file has no known role and the policy is
    /// `error`, a download fails, the archive cannot be written, or a
    /// finishing step fails.
    pub async fn assemble_voice(&self, voice: &VoiceAsset) -> Result<PackageReport, Error> {
        let package = self.package_name(PackageKind::Voice, &voice.name);
        let dir = self.package_dir(PackageKind::Voice, &voice.name);

        let mut files = Vec::new();
        let mut model_card = None;
        for url in &voice.urls {
            self.check_cancelled()?;
            let role = VoiceFile::from_url(url)?;
            let Some(entry) = role.entry_name() else {
                let VoiceFile::Unknown { file, extension } = role else {
                    continue;
                };
                match self.config.package.unknown_files {
                    UnknownFilePolicy::Error => {
                        return Err(PackageError::UnexpectedFile {
                            package,
                            file,
                            extension,
                        }
                        .into());
                    }
                    UnknownFilePolicy::Skip => {
                        tracing::warn!(package = %package, file = %file, "skipping voice file with unknown extension");
                        continue;
                    }
                }
            };

            let cached = self.downloader.fetch(url).await?;
            if role == VoiceFile::ModelCard {
                model_card = Some(cached.clone());
            }
            files.push((entry, cached));
        }

        let archive_path = dir.join(ARCHIVE_FILENAME);
        let level = self.config.archive.compression_level;
        let cancel = self.cancel.clone();
        let entries = run_archive_task(archive_path, level, move |tarball| {
            for (entry, source) in &files {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                tarball.append_file(entry, source)?;
            }
            Ok(())
        })
        .await?;

        let license = if let Some(card) = model_card {
            let dest = dir.join(MODEL_CARD_FILENAME);
            fs::copy(&card, &dest)
                .await
                .map_err(|e| Error::io_with_path(&e, &dest))?;
            LicenseSource::ModelCard
        } else {
            LicenseSource::Upstream(voice.urls.first().map_or("", String::as_str))
        };

        self.finish(PackageKind::Voice, package, &voice.version, dir, entries, license)
            .await
    }

    /// Build a binary package by repackaging part of a distribution archive
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails, the distribution format cannot
    /// be extracted, any entry fails to copy, or a finishing step fails.
    pub async fn assemble_binary(&self, binary: &BinaryAsset) -> Result<PackageReport, Error> {
        let package = self.package_name(PackageKind::Binary, &binary.name);
        let dir = self.package_dir(PackageKind::Binary, &binary.name);

        self.check_cancelled()?;
        let cached = self.downloader.fetch(&binary.url).await?;

        let (filter, rewrite) = match binary.root.as_deref().map(|r| r.trim_matches('/')) {
            Some(root) if !root.is_empty() => (
                PathFilter::new([root]),
                PathRewrite::StripPrefix(format!("{root}/")),
            ),
            _ => (PathFilter::all(), PathRewrite::Keep),
        };

        let archive_path = dir.join(ARCHIVE_FILENAME);
        let level = self.config.archive.compression_level;
        let cancel = self.cancel.clone();
        let hint = binary.url.clone();
        let entries = run_archive_task(archive_path, level, move |tarball| {
            let file = std::fs::File::open(&cached).map_err(|e| Error::io_with_path(&e, &cached))?;
            let mut source = SourceArchive::open(&hint, file)?;
            repackage(&mut source, tarball, &filter, &rewrite, &cancel)?;
            Ok(())
        })
        .await?;

        self.finish(
            PackageKind::Binary,
            package,
            &binary.version,
            dir,
            entries,
            LicenseSource::Upstream(&binary.url),
        )
        .await
    }

    async fn finish(
        &self,
        kind: PackageKind,
        package: String,
        version: &str,
        dir: PathBuf,
        entries: usize,
        license: LicenseSource<'_>,
    ) -> Result<PackageReport, Error> {
        let archive = dir.join(ARCHIVE_FILENAME);
        let metadata = write_metadata(&dir, version, &[archive]).await?;
        write_readme(&dir, &package, license, &metadata).await?;

        if let Some(command) = &self.config.package.build_command {
            run_build_command(&dir, command).await?;
        }

        tracing::info!(
            package = %package,
            version,
            entries,
            hash = %metadata.hash,
            "package assembled"
        );
        Ok(PackageReport {
            kind,
            name: package,
            dir,
            entries,
            metadata,
        })
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Create an archive, fill it on the blocking pool, and close it
///
/// The archive is deleted if filling or closing fails. Returns the number of
/// entries written.
async fn run_archive_task<F>(path: PathBuf, level: i32, fill: F) -> Result<usize, Error>
where
    F: FnOnce(&mut Tarball) -> Result<(), Error> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut tarball = Tarball::create_with(&path, level)?;
        if let Err(e) = fill(&mut tarball) {
            tarball.discard();
            return Err(e);
        }

        let entries = tarball.entry_count();
        if let Err(e) = tarball.close() {
            if let Err(remove) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %remove, "failed to remove unfinished archive");
            }
            return Err(e);
        }
        Ok(entries)
    })
    .await
    .map_err(|e| Error::internal(format!("archive task failed: {e}")))?
}
