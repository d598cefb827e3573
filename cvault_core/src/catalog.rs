//! Catalog (C2): the storage contract every embedded-database backend must
//! satisfy, plus the point-in-time query algebra built on top of it.
//!
//! This module defines only the trait; `cvault_catalog_redb::RedbCatalog` is
//! the one concrete implementation shipped in this repository, keeping the
//! storage backend in a sibling crate behind the trait boundary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::error::CoreResult;
use crate::model::{CatalogStats, ContentHash, FileSummary, FileVersion, HistoryEntry};

/// The one-second forward slack applied by every at-or-before-t query, to
/// absorb truncation-to-whole-seconds in user-facing time strings. Never
/// used to reach into a later session.
pub const TIME_TOLERANCE_SECS: i64 = 1;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Atomically appends all `versions` or none. Fails with
    /// [`crate::error::CoreError::Catalog`] on storage error.
    async fn add_entries(&self, versions: Vec<FileVersion>) -> CoreResult<()>;

    /// The version with the maximum timestamp for `orig_path`, or `None`.
    async fn latest_version(&self, orig_path: &Path) -> CoreResult<Option<FileVersion>>;

    /// `true` iff `latest_version(orig_path)` is absent or its
    /// `content_hash` differs from `current_content_hash`.
    async fn needs_backup(
        &self,
        orig_path: &Path,
        current_content_hash: &ContentHash,
        _current_size: u64,
    ) -> CoreResult<bool> {
        Ok(match self.latest_version(orig_path).await? {
            None => true,
            Some(v) => &v.content_hash != current_content_hash,
        })
    }

    /// The version of `orig_path` whose timestamp is maximal subject to
    /// `timestamp < t + 1s`.
    async fn file_at_time(
        &self,
        orig_path: &Path,
        t: DateTime<FixedOffset>,
    ) -> CoreResult<Option<FileVersion>>;

    /// One version per extant path, each the latest at-or-before `t + 1s`.
    ///
    /// Paths whose last-known version predates `t` forever remain in this
    /// result for any later `t`: the catalog never records deletions. This
    /// is a documented limitation, not a bug.
    async fn files_at_time(&self, t: DateTime<FixedOffset>) -> CoreResult<Vec<FileVersion>>;

    /// As [`files_at_time`](Self::files_at_time), restricted to paths whose
    /// `orig_path` begins with `dir_prefix`.
    async fn files_in_dir_at_time(
        &self,
        dir_prefix: &Path,
        t: DateTime<FixedOffset>,
    ) -> CoreResult<Vec<FileVersion>>;

    /// Full history of `orig_path`, descending by timestamp.
    async fn history(&self, orig_path: &Path) -> CoreResult<Vec<HistoryEntry>>;

    /// All distinct session timestamps, descending. Drives the time-travel
    /// UI.
    async fn distinct_timestamps(&self) -> CoreResult<Vec<DateTime<FixedOffset>>>;

    /// All distinct containing directories ever observed.
    async fn distinct_directories(&self) -> CoreResult<Vec<PathBuf>>;

    /// One summary row per path currently tracked.
    async fn files_with_info(&self) -> CoreResult<Vec<FileSummary>>;

    /// `(record_count, sum_plain_size, sum_packed_size)`.
    async fn stats(&self) -> CoreResult<CatalogStats>;

    /// Deletes every record. Irreversible.
    async fn clear_all(&self) -> CoreResult<()>;

    /// Writes a self-contained copy of the current catalog state to `path`.
    async fn export_snapshot(&self, path: &Path) -> CoreResult<()>;

    /// Merges records from a snapshot file previously written by
    /// [`export_snapshot`](Self::export_snapshot). Conflicting records
    /// (identical key) are replaced, making repeated imports idempotent.
    async fn import_snapshot(&self, path: &Path) -> CoreResult<()>;
}

/// Bounds a session timestamp `t` to the half-open window that
/// at-or-before-t queries must respect: `timestamp < t + TOLERANCE`.
pub fn at_or_before_bound(t: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    t + chrono::Duration::seconds(TIME_TOLERANCE_SECS)
}
