//! Command line interface for the vault client.
//!
//! A `clap`-derive `Cli`/`Commands` pair, `clap_verbosity_flag` driving the
//! `tracing-subscriber` filter level, and a `directories::ProjectDirs`-resolved
//! per-platform config path.

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config_store;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which configured device this command should run against
    #[arg(short, long, value_name = "NAME", default_value = "default")]
    device: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the vault configuration file
    Config {
        #[command(subcommand)]
        cmd: cmd::config::CmdConfig,
    },
    /// Run one backup session: scan, pack, upload, commit
    Backup,
    /// List every file currently tracked, with its latest version info
    List,
    /// Show the full version history of one file
    History {
        /// absolute path as it was backed up
        path: PathBuf,
    },
    /// Aggregate catalog statistics
    Status,
    /// Restore a single file as it existed at or before a point in time
    RestoreFile {
        path: PathBuf,
        /// RFC 3339 timestamp, e.g. 2024-01-15T10:00:00+00:00
        #[arg(long)]
        at: String,
        /// write the restored file here instead of back to `path`
        #[arg(long)]
        to: Option<PathBuf>,
    },
    /// Restore a whole directory subtree as it existed at or before a point in time
    RestoreDir {
        path: PathBuf,
        #[arg(long)]
        at: String,
        #[arg(long)]
        to: Option<PathBuf>,
    },
    /// Restore every tracked file as it existed at or before a point in time
    RestoreSnapshot {
        #[arg(long)]
        at: String,
        #[arg(long)]
        to: PathBuf,
    },
    /// Rebuild the local catalog from encrypted catalog snapshots on the server
    Recover,
    /// Re-derive the vault key under Argon2id and re-seal the catalog snapshot
    MigrateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.verbosity).init();

    let dirs = ProjectDirs::from("dev", "cvault", "cvault")
        .context("failed to determine config directory path")?;

    let config_file = dirs
        .config_dir()
        .join("devices")
        .join(&cli.device)
        .with_extension("toml");
    let data_dir = dirs.data_dir().join("devices").join(&cli.device);

    cmd::run_command(&config_file, &data_dir, cli.cmd).await
}
