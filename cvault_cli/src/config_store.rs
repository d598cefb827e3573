//! Loads the frozen [`VaultConfig`] record and the key-derivation salt that
//! lives alongside it, per the key-derivation design note: "a per-user salt
//! stored alongside configuration," not inside the config record itself.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cvault_core::crypto::KeyDerivation;
use cvault_core::config::VaultConfig;

pub fn salt_path(config_file: &Path) -> PathBuf {
    config_file.with_extension("keysalt")
}

pub fn load_config(config_file: &Path) -> anyhow::Result<VaultConfig> {
    let content = std::fs::read_to_string(config_file)
        .with_context(|| format!("reading config file {}", config_file.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config file {}", config_file.display()))
}

/// `Legacy` if no salt file exists next to the config (pre-migration or
/// reference-compatible device); `Argon2idSalted` otherwise.
pub fn load_key_derivation(config_file: &Path) -> anyhow::Result<KeyDerivation> {
    let path = salt_path(config_file);
    if !path.exists() {
        return Ok(KeyDerivation::Legacy);
    }
    let hex_salt = std::fs::read_to_string(&path)
        .with_context(|| format!("reading key salt file {}", path.display()))?;
    let bytes = hex::decode(hex_salt.trim()).context("key salt file is not valid hex")?;
    let salt: [u8; 16] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("key salt file must contain exactly 16 bytes"))?;
    Ok(KeyDerivation::Argon2idSalted { salt })
}
