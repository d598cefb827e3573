//! `cvault migrate-key` moves a device from the legacy unsalted derivation
//! to Argon2id, re-sealing only the catalog snapshot. Historical shards are
//! never retroactively re-sealed, preserving shard immutability.

use std::path::Path;

use anyhow::{Context, Result};
use cvault_catalog_redb::RedbCatalog;
use cvault_core::catalog::CatalogStore;
use cvault_core::config::VaultConfig;
use cvault_core::crypto::KeyDerivation;
use cvault_core::packer;
use cvault_core::session::SessionId;
use rand::RngCore;
use tracing::info;

pub async fn run(config_file: &Path, vault_config: &VaultConfig, catalog: &RedbCatalog) -> Result<()> {
    let salt_path = crate::config_store::salt_path(config_file);
    if salt_path.exists() {
        println!("device is already on Argon2id key derivation; nothing to do");
        return Ok(());
    }

    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let new_derivation = KeyDerivation::Argon2idSalted { salt };
    let new_key = new_derivation.derive(&vault_config.passphrase);

    let snapshot_path = std::env::temp_dir().join("cvault-migrate-key.snapshot");
    catalog.export_snapshot(&snapshot_path).await?;
    let snapshot_bytes = std::fs::read(&snapshot_path).context("reading exported catalog snapshot")?;
    let _ = std::fs::remove_file(&snapshot_path);

    let uploader = crate::cmd::http_transport(vault_config)?;
    let session_id = SessionId::from_timestamp(chrono::Local::now().fixed_offset());
    packer::upload_catalog_snapshot(&snapshot_bytes, &new_key, &session_id, &uploader).await?;

    std::fs::write(&salt_path, hex::encode(salt))?;
    info!("re-sealed catalog snapshot under Argon2id key");
    println!("migrated to Argon2id key derivation; historical shards remain sealed under the legacy key");
    Ok(())
}
