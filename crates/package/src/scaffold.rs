//! Files written around the archive: README and the post-build command

use assetpack_config::constants::{
    ARCHIVE_FILENAME, METADATA_FILENAME, MODEL_CARD_FILENAME, README_FILENAME,
};
use assetpack_errors::{Error, PackageError};
use assetpack_hash::Metadata;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

/// Where the license of `dist.tzst` is documented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseSource<'a> {
    /// `MODEL_CARD.txt` next to the archive
    ModelCard,
    /// The upstream location the content was fetched from
    Upstream(&'a str),
}

/// Render the package README
#[must_use]
pub fn render_readme(package: &str, license: LicenseSource<'_>, metadata: &Metadata) -> String {
    let license = match license {
        LicenseSource::ModelCard => format!("see [{MODEL_CARD_FILENAME}]({MODEL_CARD_FILENAME})"),
        LicenseSource::Upstream(source) => format!("see the upstream distribution at <{source}>"),
    };

    format!(
        "# {package}\n\
         \n\
         Package generated by assetpack.\n\
         \n\
         - Version: {version}\n\
         - Fingerprint: `{hash}`\n\
         - `{ARCHIVE_FILENAME}`: zstd-compressed tar, described by `{METADATA_FILENAME}`\n\
         - `{ARCHIVE_FILENAME}` license: {license}\n",
        version = metadata.version,
        hash = metadata.hash,
    )
}

/// Write `README.md` into `dir`
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn write_readme(
    dir: &Path,
    package: &str,
    license: LicenseSource<'_>,
    metadata: &Metadata,
) -> Result<(), Error> {
    let path = dir.join(README_FILENAME);
    let contents = render_readme(package, license, metadata);
    fs::write(&path, contents)
        .await
        .map_err(|e| Error::io_with_path(&e, &path))
}

/// Run `command` inside `dir`, failing on a non-zero exit
///
/// # Errors
///
/// Returns [`PackageError::CommandFailed`] with the captured output if the
/// command cannot start or exits unsuccessfully.
pub async fn run_build_command(dir: &Path, command: &[String]) -> Result<(), Error> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };
    let display = command.join(" ");
    let failed = |message: String| -> Error {
        PackageError::CommandFailed {
            command: display.clone(),
            dir: dir.display().to_string(),
            message,
        }
        .into()
    };

    tracing::info!(program = %program, ?args, dir = %dir.display(), "running build command");
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| failed(e.to_string()))?;

    if output.status.success() {
        return Ok(());
    }

    let mut message = output.status.to_string();
    for stream in [&output.stdout, &output.stderr] {
        let text = String::from_utf8_lossy(stream);
        let text = text.trim();
        if !text.is_empty() {
            message.push_str(": ");
            message.push_str(text);
        }
    }
    Err(failed(message))
}
