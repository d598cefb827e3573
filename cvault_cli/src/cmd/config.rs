//! `cvault config` — writes and inspects the frozen configuration record.
//!
//! Edits a `toml_edit::DocumentMut` in place (preserving comments/formatting
//! on repeat runs) and persists via write-to-tmp-then-rename, never an
//! in-place truncate.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use rand::RngCore;
use toml_edit::DocumentMut;
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Create the config file if it doesn't exist, generating a fresh
    /// Argon2id key salt for this device.
    Init {
        #[arg(long)]
        server_base_url: String,
        #[arg(long)]
        bearer_token: String,
        #[arg(long)]
        device_id: String,
        #[arg(long)]
        passphrase: String,
        /// one or more absolute directories to back up
        #[arg(long = "root", required = true)]
        roots: Vec<PathBuf>,
    },
    /// Print the current configuration with secrets redacted
    Show,
}

impl CmdConfig {
    pub fn run(self, config_file: &Path) -> anyhow::Result<()> {
        match self {
            Self::Init {
                server_base_url,
                bearer_token,
                device_id,
                passphrase,
                roots,
            } => init(config_file, server_base_url, bearer_token, device_id, passphrase, roots),
            Self::Show => show(config_file),
        }
    }
}

fn init(
    config_file: &Path,
    server_base_url: String,
    bearer_token: String,
    device_id: String,
    passphrase: String,
    roots: Vec<PathBuf>,
) -> anyhow::Result<()> {
    fs::create_dir_all(config_file.parent().context("config file has no parent directory")?)?;

    let mut doc = DocumentMut::new();
    doc["server_base_url"] = toml_edit::value(server_base_url);
    doc["bearer_token"] = toml_edit::value(bearer_token);
    doc["device_id"] = toml_edit::value(device_id);
    doc["passphrase"] = toml_edit::value(passphrase);
    let mut roots_array = toml_edit::Array::new();
    for root in &roots {
        roots_array.push(root.to_string_lossy().into_owned());
    }
    doc["roots"] = toml_edit::value(roots_array);

    info!("writing to config file {config_file:?}");
    let tmp_path = config_file.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new().write(true).create(true).truncate(true).open(&tmp_path)?;
    tmp.write_all(doc.to_string().as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, config_file)?;

    let salt_path = crate::config_store::salt_path(config_file);
    if !salt_path.exists() {
        info!("generating Argon2id key salt for new device");
        let mut salt = [0u8; 16];
        rand::rng().fill_bytes(&mut salt);
        fs::write(&salt_path, hex::encode(salt))?;
    }

    Ok(())
}

fn show(config_file: &Path) -> anyhow::Result<()> {
    let config = crate::config_store::load_config(config_file)?;
    println!("{config:#?}");
    Ok(())
}
