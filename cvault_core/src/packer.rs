//! Shard packer (C4): streams changed files through the crypto primitives
//! into size-bounded `tar` shards and hands each sealed shard to an
//! [`Uploader`].

use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::crypto::{self, VaultKey};
use crate::error::CoreResult;
use crate::model::{ChangeRecord, FileVersion};
use crate::session::SessionId;

/// External collaborator the packer uploads sealed shards and catalog
/// snapshots through. The concrete implementation (HTTP multipart, in this
/// repository) lives outside `cvault_core`; tests use an in-memory fake.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_shard(
        &self,
        bytes: Vec<u8>,
        session_id: &SessionId,
        shard_index: u32,
    ) -> CoreResult<()>;

    async fn upload_catalog_snapshot(&self, bytes: Vec<u8>, session_id: &SessionId)
    -> CoreResult<()>;
}

/// A sealed-but-not-yet-persisted shard being accumulated in memory.
struct OpenShard {
    builder: tar::Builder<Cursor<Vec<u8>>>,
    bytes_written: u64,
}

impl OpenShard {
    fn new() -> Self {
        Self {
            builder: tar::Builder::new(Cursor::new(Vec::new())),
            bytes_written: 0,
        }
    }

    fn append(&mut self, member_name: &str, sealed: &[u8]) -> CoreResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(sealed.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        self.builder
            .append_data(&mut header, member_name, sealed)
            .map_err(|e| crate::error::CoreError::Filesystem {
                path: PathBuf::from(member_name),
                source: e,
            })?;
        self.bytes_written += sealed.len() as u64;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.bytes_written == 0
    }

    fn finish(self) -> CoreResult<Vec<u8>> {
        let cursor = self
            .builder
            .into_inner()
            .map_err(|e| crate::error::CoreError::Filesystem {
                path: PathBuf::from("<shard>"),
                source: e,
            })?;
        Ok(cursor.into_inner())
    }
}

/// Progress observed by the driver while packing one session.
#[derive(Clone, Copy, Debug, Default)]
pub struct PackProgress {
    pub done_files: u64,
    pub total_files: u64,
    pub done_bytes: u64,
    pub total_bytes: u64,
}

/// Packs `changes` into one or more size-bounded shards, uploading each as
/// it seals, and returns the `FileVersion`s to be committed atomically by
/// the caller.
///
/// Per the ordering guarantee in the design, the returned versions are NOT
/// committed to the catalog by this function — that commit is the caller's
/// responsibility and is the session's durability point.
pub async fn pack_and_upload(
    changes: Vec<ChangeRecord>,
    session_t: DateTime<FixedOffset>,
    key: &VaultKey,
    uploader: &dyn Uploader,
    max_shard_bytes: u64,
    should_stop: &dyn Fn() -> bool,
    mut on_progress: impl FnMut(PackProgress),
) -> CoreResult<Vec<FileVersion>> {
    let session_id = SessionId::from_timestamp(session_t);
    let total_files = changes.len() as u64;
    let total_bytes: u64 = changes.iter().map(|c| c.plain_size).sum();

    let mut shard_index: u32 = 1;
    let mut shard = OpenShard::new();
    let mut pending = Vec::with_capacity(changes.len());
    let mut done_files = 0u64;
    let mut done_bytes = 0u64;

    for change in changes {
        if should_stop() {
            return Err(crate::error::CoreError::Cancelled);
        }

        let plaintext = match std::fs::read(&change.orig_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %change.orig_path.display(), error = %e, "dropping unreadable file from session");
                continue;
            }
        };

        let sealed = crypto::seal(&plaintext, key)?;
        let packed_size = sealed.len() as u64;
        shard.append(&change.path_hash.member_name(), &sealed)?;

        let directory = change
            .orig_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| change.orig_path.clone());

        pending.push(FileVersion {
            timestamp: session_t,
            directory,
            orig_path: change.orig_path,
            path_hash: change.path_hash,
            content_hash: change.content_hash,
            plain_size: change.plain_size,
            packed_size,
        });

        done_files += 1;
        done_bytes += change.plain_size;
        on_progress(PackProgress {
            done_files,
            total_files,
            done_bytes,
            total_bytes,
        });

        if shard.bytes_written > max_shard_bytes {
            seal_and_upload(
                std::mem::replace(&mut shard, OpenShard::new()),
                &session_id,
                shard_index,
                uploader,
            )
            .await?;
            shard_index += 1;
        }
    }

    if !shard.is_empty() {
        seal_and_upload(shard, &session_id, shard_index, uploader).await?;
    }

    Ok(pending)
}

async fn seal_and_upload(
    shard: OpenShard,
    session_id: &SessionId,
    shard_index: u32,
    uploader: &dyn Uploader,
) -> CoreResult<()> {
    let bytes = shard.finish()?;
    uploader.upload_shard(bytes, session_id, shard_index).await
}

/// Exposed for the driver's final step: seal and upload a catalog snapshot
/// export.
pub async fn upload_catalog_snapshot(
    snapshot_bytes: &[u8],
    key: &VaultKey,
    session_id: &SessionId,
    uploader: &dyn Uploader,
) -> CoreResult<()> {
    let sealed = crypto::seal(snapshot_bytes, key)?;
    uploader.upload_catalog_snapshot(sealed, session_id).await
}
