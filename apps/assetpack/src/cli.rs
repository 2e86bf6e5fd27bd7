//! Command line interface definition

use clap::Parser;
use std::path::PathBuf;

/// assetpack - build deterministic packages from remote voices and binaries
#[derive(Parser, Debug)]
#[command(name = "assetpack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build deterministic asset packages from remote voices and binaries")]
#[command(long_about = None)]
pub struct Cli {
    /// Output root; package directories and the download cache go here
    #[arg(long, value_name = "DIR", env = "ASSETPACK_DIR")]
    pub dir: PathBuf,

    /// Asset manifest listing voices and binaries
    #[arg(long, value_name = "FILE", default_value = "assets.toml")]
    pub manifest: PathBuf,

    /// Use alternate config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only build the named assets (repeatable)
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Override the zstd compression level (1-22)
    #[arg(long, value_name = "N")]
    pub compression_level: Option<i32>,

    /// Emit log lines as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}
