use std::path::Path;

use anyhow::Result;
use cvault_catalog_redb::RedbCatalog;
use cvault_core::config::VaultConfig;
use cvault_core::recovery;

pub async fn run(
    config_file: &Path,
    vault_config: &VaultConfig,
    catalog: &RedbCatalog,
    data_dir: &Path,
) -> Result<()> {
    let key = crate::config_store::load_key_derivation(config_file)?.derive(&vault_config.passphrase);
    let downloader = crate::cmd::http_transport(vault_config)?;

    let merged = recovery::recover(catalog, &downloader, &key, data_dir).await?;
    println!("merged {merged} catalog snapshot(s)");
    Ok(())
}
