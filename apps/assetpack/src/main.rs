//! assetpack - deterministic asset package builder
//!
//! Reads the asset manifest, then builds one package directory per voice
//! and per binary distribution through the package crate.

mod cli;
mod error;

use crate::cli::Cli;
use crate::error::CliError;
use assetpack_config::{AssetManifest, Config};
use assetpack_errors::{Error, UserFacingError};
use assetpack_package::{PackageAssembler, PackageReport};
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.debug);

    match run(cli).await {
        Ok(summary) if summary.failed == 0 => {
            info!(built = summary.built, "all packages built");
        }
        Ok(summary) => {
            error!(
                built = summary.built,
                failed = summary.failed,
                "some packages failed to build"
            );
            process::exit(1);
        }
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Counts across every job in one invocation
#[derive(Debug, Default)]
struct Summary {
    built: usize,
    failed: usize,
}

/// Main application logic
async fn run(cli: Cli) -> Result<Summary, CliError> {
    info!("Starting assetpack v{}", env!("CARGO_PKG_VERSION"));

    // 1. file config (or defaults), 2. environment, 3. CLI flags
    let mut config = Config::load_or_default(cli.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli)?;

    let manifest = AssetManifest::load(&cli.manifest).await?.filtered(&cli.only);
    if manifest.is_empty() {
        return Err(CliError::InvalidArguments(if cli.only.is_empty() {
            format!("{} lists no assets", cli.manifest.display())
        } else {
            format!("no assets named {}", cli.only.join(", "))
        }));
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let assembler = PackageAssembler::from_config(config, &cli.dir)?.with_cancellation(cancel);
    let mut summary = Summary::default();

    for voice in &manifest.voice {
        let result = assembler.assemble_voice(voice).await;
        record(&mut summary, "voice", &voice.name, result);
    }
    for binary in &manifest.binary {
        let result = assembler.assemble_binary(binary).await;
        record(&mut summary, "binary", &binary.name, result);
    }

    Ok(summary)
}

/// Apply CLI flags on top of file and environment configuration
fn apply_cli_config(config: &mut Config, cli: &Cli) -> Result<(), CliError> {
    if let Some(level) = cli.compression_level {
        config.archive.compression_level = level;
    }
    config.validate()?;
    Ok(())
}

fn record(summary: &mut Summary, kind: &str, name: &str, result: Result<PackageReport, Error>) {
    match result {
        Ok(report) => {
            summary.built += 1;
            info!(
                kind,
                asset = name,
                package = %report.name,
                dir = %report.dir.display(),
                hash = %report.metadata.hash,
                "package ready"
            );
        }
        Err(e) => {
            summary.failed += 1;
            let code = e.user_code().unwrap_or("-");
            let details = CliError::from(e);
            error!(kind, asset = name, code, "failed to build package: {details}");
        }
    }
}

/// Cancel in-flight work on Ctrl-C; the current entry is finished first
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current entry");
            cancel.cancel();
        }
    });
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "info,assetpack=debug,assetpack_package=debug,assetpack_archive=debug,assetpack_net=debug,assetpack_hash=debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(debug_enabled)
            .init();
    }
}
