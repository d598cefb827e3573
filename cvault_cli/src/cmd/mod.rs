use std::path::Path;

use anyhow::Result;
use cvault_catalog_redb::RedbCatalog;
use cvault_core::config::VaultConfig;
use cvault_transport_http::HttpTransport;

pub mod backup;
pub mod config;
pub mod migrate_key;
pub mod query;
pub mod recover;
pub mod restore;

pub async fn run_command(config_file: &Path, data_dir: &Path, cmd: crate::Commands) -> Result<()> {
    let cmd = match cmd {
        crate::Commands::Config { cmd } => return cmd.run(config_file),
        other => other,
    };

    std::fs::create_dir_all(data_dir)?;
    let vault_config = crate::config_store::load_config(config_file)?;
    let catalog = RedbCatalog::open(data_dir)?;

    match cmd {
        crate::Commands::Config { .. } => unreachable!(),
        crate::Commands::Backup => backup::run(config_file, &vault_config, &catalog).await,
        crate::Commands::List => query::run_list(&catalog).await,
        crate::Commands::History { path } => query::run_history(&catalog, &path).await,
        crate::Commands::Status => query::run_status(&catalog).await,
        crate::Commands::RestoreFile { path, at, to } => {
            restore::run_restore_file(config_file, &vault_config, &catalog, &path, &at, to.as_deref()).await
        }
        crate::Commands::RestoreDir { path, at, to } => {
            restore::run_restore_dir(config_file, &vault_config, &catalog, &path, &at, to.as_deref()).await
        }
        crate::Commands::RestoreSnapshot { at, to } => {
            restore::run_restore_snapshot(config_file, &vault_config, &catalog, &at, &to).await
        }
        crate::Commands::Recover => recover::run(config_file, &vault_config, &catalog, data_dir).await,
        crate::Commands::MigrateKey => migrate_key::run(config_file, &vault_config, &catalog).await,
    }
}

pub fn http_transport(vault_config: &VaultConfig) -> Result<HttpTransport> {
    let base_url = url::Url::parse(&vault_config.server_base_url)?;
    Ok(HttpTransport::new(
        base_url,
        vault_config.device_id.clone(),
        vault_config.bearer_token.clone(),
    ))
}
