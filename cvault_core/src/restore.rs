//! Restore planner (C6): resolves a (path-or-subtree, target-time) query
//! against the catalog, requests the smallest shard-set from the server,
//! and decrypts+materializes the originals.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tracing::warn;

use crate::catalog::CatalogStore;
use crate::crypto::{self, VaultKey};
use crate::error::{CoreError, CoreResult};
use crate::model::{FileVersion, PathHash};

/// One (path_hash, effective_timestamp) pair sent to the server. The
/// timestamp is the FileVersion's own session timestamp, never the user's
/// requested `target_time` — using the latter would miss versions created a
/// fraction of a second before a whole-second query.
#[derive(Clone, Debug)]
pub struct RestoreItem {
    pub path_hash: PathHash,
    pub effective_timestamp: DateTime<FixedOffset>,
}

/// External collaborator the restore planner downloads shard archives and
/// catalog snapshots through.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Sends a restore-files request; returns the raw gzip-tar archive body.
    async fn request_restore(&self, items: &[RestoreItem]) -> CoreResult<Vec<u8>>;

    /// Lists encrypted catalog snapshot download URLs for this device.
    async fn list_catalog_snapshots(&self) -> CoreResult<Vec<String>>;

    /// Downloads an arbitrary previously-listed URL.
    async fn download_url(&self, url: &str) -> CoreResult<Vec<u8>>;
}

/// Where restored bytes should land.
pub enum RestoreTarget<'a> {
    File {
        orig_path: &'a Path,
    },
    Directory {
        dir_prefix: &'a Path,
    },
    Snapshot,
}

/// Resolves `target` against the catalog into the set of FileVersions that
/// must be fetched. Empty iff nothing matches, which callers turn into
/// [`CoreError::NotFoundAtTime`].
pub async fn resolve(
    catalog: &dyn CatalogStore,
    target: &RestoreTarget<'_>,
    target_time: DateTime<FixedOffset>,
) -> CoreResult<Vec<FileVersion>> {
    match target {
        RestoreTarget::File { orig_path } => {
            Ok(catalog.file_at_time(orig_path, target_time).await?.into_iter().collect())
        }
        RestoreTarget::Directory { dir_prefix } => {
            catalog.files_in_dir_at_time(dir_prefix, target_time).await
        }
        RestoreTarget::Snapshot => catalog.files_at_time(target_time).await,
    }
}

/// Runs the full restore flow: resolve → request → decrypt → materialize.
///
/// `destination_root`: if set, restored files are written under it (shape
/// depends on `target`); otherwise files are written back to their
/// `orig_path`.
pub async fn restore(
    catalog: &dyn CatalogStore,
    downloader: &dyn Downloader,
    key: &VaultKey,
    target: RestoreTarget<'_>,
    target_time: DateTime<FixedOffset>,
    destination_root: Option<&Path>,
    should_stop: &dyn Fn() -> bool,
) -> CoreResult<usize> {
    let versions = resolve(catalog, &target, target_time).await?;
    if versions.is_empty() {
        return Err(CoreError::NotFoundAtTime);
    }

    let items: Vec<RestoreItem> = versions
        .iter()
        .map(|v| RestoreItem {
            path_hash: v.path_hash.clone(),
            effective_timestamp: v.timestamp,
        })
        .collect();

    let archive_bytes = downloader.request_restore(&items).await?;

    let by_hash: HashMap<&str, &FileVersion> = versions
        .iter()
        .map(|v| (v.path_hash.as_str(), v))
        .collect();

    let mut restored = 0usize;
    for (member_name, sealed) in unpack_gzip_tar(&archive_bytes)? {
        if should_stop() {
            return Err(CoreError::Cancelled);
        }

        let hash = member_name.trim_end_matches(".enc");
        let Some(version) = by_hash.get(hash) else {
            warn!(member = %member_name, "restore archive contained an unrequested member");
            continue;
        };

        let plaintext = match crypto::open(&sealed, key) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %version.orig_path.display(), error = %e, "skipping member that failed to decrypt");
                continue;
            }
        };

        let destination = destination_path(&target, destination_root, version);
        if let Some(parent) = destination.parent() {
            create_parent_dirs(parent)
                .map_err(|e| CoreError::filesystem(parent, e))?;
        }
        std::fs::write(&destination, &plaintext)
            .map_err(|e| CoreError::filesystem(&destination, e))?;
        restored += 1;
    }

    Ok(restored)
}

fn destination_path(
    target: &RestoreTarget<'_>,
    destination_root: Option<&Path>,
    version: &FileVersion,
) -> PathBuf {
    match (destination_root, target) {
        (None, _) => version.orig_path.clone(),
        (Some(root), RestoreTarget::File { .. }) => {
            let name = version
                .orig_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| version.orig_path.clone());
            root.join(name)
        }
        (Some(root), RestoreTarget::Directory { dir_prefix }) => {
            let rel = version.orig_path.strip_prefix(dir_prefix).unwrap_or(&version.orig_path);
            root.join(rel)
        }
        (Some(root), RestoreTarget::Snapshot) => {
            let rel = version.orig_path.strip_prefix("/").unwrap_or(&version.orig_path);
            root.join(rel)
        }
    }
}

#[cfg(unix)]
fn create_parent_dirs(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
}

#[cfg(not(unix))]
fn create_parent_dirs(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Gunzips `bytes` and reads the inner tar archive, returning
/// `(member_name, raw_member_bytes)` pairs in archive order.
fn unpack_gzip_tar(bytes: &[u8]) -> CoreResult<Vec<(String, Vec<u8>)>> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    let mut members = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| CoreError::Network(format!("malformed restore archive: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| CoreError::Network(format!("malformed restore archive entry: {e}")))?;
        let name = entry
            .path()
            .map_err(|e| CoreError::Network(format!("invalid member path: {e}")))?
            .to_string_lossy()
            .into_owned();
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| CoreError::Network(format!("failed reading archive member {name}: {e}")))?;
        members.push((name, buf));
    }

    Ok(members)
}
