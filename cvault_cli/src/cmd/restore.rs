use std::path::Path;

use anyhow::{Context, Result};
use cvault_catalog_redb::RedbCatalog;
use cvault_core::config::VaultConfig;
use cvault_core::restore::{self, RestoreTarget};

fn parse_target_time(at: &str) -> Result<chrono::DateTime<chrono::FixedOffset>> {
    chrono::DateTime::parse_from_rfc3339(at)
        .with_context(|| format!("'{at}' is not a valid RFC 3339 timestamp"))
}

pub async fn run_restore_file(
    config_file: &Path,
    vault_config: &VaultConfig,
    catalog: &RedbCatalog,
    path: &Path,
    at: &str,
    to: Option<&Path>,
) -> Result<()> {
    let key = crate::config_store::load_key_derivation(config_file)?.derive(&vault_config.passphrase);
    let downloader = crate::cmd::http_transport(vault_config)?;
    let target_time = parse_target_time(at)?;
    let should_stop = || false;

    let restored = restore::restore(
        catalog,
        &downloader,
        &key,
        RestoreTarget::File { orig_path: path },
        target_time,
        to,
        &should_stop,
    )
    .await?;
    println!("restored {restored} file(s)");
    Ok(())
}

pub async fn run_restore_dir(
    config_file: &Path,
    vault_config: &VaultConfig,
    catalog: &RedbCatalog,
    path: &Path,
    at: &str,
    to: Option<&Path>,
) -> Result<()> {
    let key = crate::config_store::load_key_derivation(config_file)?.derive(&vault_config.passphrase);
    let downloader = crate::cmd::http_transport(vault_config)?;
    let target_time = parse_target_time(at)?;
    let should_stop = || false;

    let restored = restore::restore(
        catalog,
        &downloader,
        &key,
        RestoreTarget::Directory { dir_prefix: path },
        target_time,
        to,
        &should_stop,
    )
    .await?;
    println!("restored {restored} file(s)");
    Ok(())
}

pub async fn run_restore_snapshot(
    config_file: &Path,
    vault_config: &VaultConfig,
    catalog: &RedbCatalog,
    at: &str,
    to: &Path,
) -> Result<()> {
    let key = crate::config_store::load_key_derivation(config_file)?.derive(&vault_config.passphrase);
    let downloader = crate::cmd::http_transport(vault_config)?;
    let target_time = parse_target_time(at)?;
    let should_stop = || false;

    let restored = restore::restore(
        catalog,
        &downloader,
        &key,
        RestoreTarget::Snapshot,
        target_time,
        Some(to),
        &should_stop,
    )
    .await?;
    println!("restored {restored} file(s)");
    Ok(())
}
