//! Frozen configuration record consumed by the driver and restore planner:
//! a single struct naming exactly the fields the core needs, with
//! deserializers built on top of it (see `cvault_cli`) rejecting unknown
//! fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Default shard size bound (25 MiB).
pub const DEFAULT_MAX_SHARD_BYTES: u64 = 25 * 1024 * 1024;

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    pub server_base_url: String,
    pub bearer_token: String,
    pub device_id: String,
    /// Held in a zeroize-on-drop wrapper since it is key material in waiting.
    pub passphrase: Zeroizing<String>,
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub extension_blacklist: Vec<String>,
    #[serde(default = "default_max_shard_bytes")]
    pub max_shard_bytes: u64,
}

fn default_max_shard_bytes() -> u64 {
    DEFAULT_MAX_SHARD_BYTES
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("server_base_url", &self.server_base_url)
            .field("bearer_token", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("passphrase", &"<redacted>")
            .field("roots", &self.roots)
            .field("extension_blacklist", &self.extension_blacklist)
            .field("max_shard_bytes", &self.max_shard_bytes)
            .finish()
    }
}

impl VaultConfig {
    /// Preflight checks required before a backup session may begin
    /// scanning: device registered, passphrase set, at least one root.
    pub fn validate_for_backup(&self) -> Result<(), String> {
        if self.device_id.trim().is_empty() {
            return Err("device is not registered".to_string());
        }
        if self.passphrase.trim().is_empty() {
            return Err("passphrase is not set".to_string());
        }
        if self.roots.is_empty() {
            return Err("no backup roots are configured".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_fields() {
        let toml = r#"
            server_base_url = "https://example.com"
            bearer_token = "tok"
            device_id = "dev"
            passphrase = "pw"
            roots = ["/data"]
            bogus_field = true
        "#;
        let err = toml::from_str::<VaultConfig>(toml).unwrap_err();
        assert!(err.to_string().contains("bogus_field") || err.to_string().contains("unknown"));
    }

    #[test]
    fn fills_default_shard_size() {
        let toml = r#"
            server_base_url = "https://example.com"
            bearer_token = "tok"
            device_id = "dev"
            passphrase = "pw"
            roots = ["/data"]
        "#;
        let cfg: VaultConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_shard_bytes, DEFAULT_MAX_SHARD_BYTES);
    }
}
