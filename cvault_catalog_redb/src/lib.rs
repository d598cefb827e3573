//! `RedbCatalog` — the one `CatalogStore` implementation shipped in this
//! repository, backed by a single redb database file.
//!
//! Opens with a write-transaction that ensures every table exists before
//! the first caller observes it, and wraps every blocking redb call in
//! `tokio::task::spawn_blocking` since redb transactions are synchronous.
//!
//! Six tables cover the query algebra in `cvault_core::catalog`:
//! - `by_path_ts`: `{orig_path}\0{ts}` → record, full per-path history.
//! - `by_time_path`: `{ts}\0{orig_path}` → record, full at-or-before-t scans.
//! - `latest_by_path`: `orig_path` → record, O(1) `latest_version`.
//! - `version_count`: `orig_path` → u64, drives `files_with_info`.
//! - `stats`: three fixed keys (`record_count`, `sum_plain_size`,
//!   `sum_packed_size`).
//!
//! `ts` keys are `DateTime<Utc>` formatted with
//! [`chrono::SecondsFormat::Nanos`], a fixed-width representation chosen so
//! that redb's byte-lexicographic key ordering matches chronological order.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use cvault_core::catalog::{at_or_before_bound, CatalogStore};
use cvault_core::error::{CoreError, CoreResult};
use cvault_core::model::{CatalogStats, FileSummary, FileVersion, FileVersionRecord, HistoryEntry};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

const TBL_BY_PATH: TableDefinition<&str, &[u8]> = TableDefinition::new("by_path_ts");
const TBL_BY_TIME: TableDefinition<&str, &[u8]> = TableDefinition::new("by_time_path");
const TBL_LATEST: TableDefinition<&str, &[u8]> = TableDefinition::new("latest_by_path");
const TBL_VERSION_COUNT: TableDefinition<&str, u64> = TableDefinition::new("version_count");
const TBL_STATS: TableDefinition<&str, u64> = TableDefinition::new("stats");

const STAT_RECORD_COUNT: &str = "record_count";
const STAT_SUM_PLAIN_SIZE: &str = "sum_plain_size";
const STAT_SUM_PACKED_SIZE: &str = "sum_packed_size";

#[derive(Clone)]
pub struct RedbCatalog {
    db: Arc<Database>,
}

impl RedbCatalog {
    /// Opens (creating if absent) the database file `catalog.redb` under
    /// `dir`, ensuring every table exists before returning.
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db = Database::create(dir.join("catalog.redb"))?;

        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(TBL_BY_PATH)?;
                let _ = write_txn.open_table(TBL_BY_TIME)?;
                let _ = write_txn.open_table(TBL_LATEST)?;
                let _ = write_txn.open_table(TBL_VERSION_COUNT)?;
                let _ = write_txn.open_table(TBL_STATS)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    async fn run_blocking<T: Send + 'static>(
        &self,
        f: impl FnOnce(Arc<Database>) -> anyhow::Result<T> + Send + 'static,
    ) -> CoreResult<T> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| CoreError::Catalog(anyhow::anyhow!("redb task panicked: {e}")))?
            .map_err(CoreError::Catalog)
    }
}

impl std::fmt::Debug for RedbCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCatalog").finish()
    }
}

fn ts_sortable(t: DateTime<FixedOffset>) -> String {
    t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn key_by_path(orig_path: &str, ts: &str) -> String {
    format!("{orig_path}\u{0}{ts}")
}

fn key_by_time(ts: &str, orig_path: &str) -> String {
    format!("{ts}\u{0}{orig_path}")
}

fn decode_record(bytes: &[u8]) -> anyhow::Result<FileVersion> {
    let record: FileVersionRecord = minicbor::decode(bytes)?;
    FileVersion::try_from(record).map_err(|e| anyhow::anyhow!("malformed catalog record: {e}"))
}

fn encode_record(v: &FileVersion) -> anyhow::Result<Vec<u8>> {
    let record = FileVersionRecord::from(v);
    minicbor::to_vec(&record).map_err(|e| anyhow::anyhow!("failed to encode catalog record: {e}"))
}

/// Inserts one batch of versions into every table, atomically within one
/// write transaction. Re-inserting an already-present (orig_path, ts) pair
/// is a no-op on the counters — this is what makes `import_snapshot` merges
/// idempotent.
fn insert_versions(db: &Database, versions: &[FileVersion]) -> anyhow::Result<()> {
    let write_txn = db.begin_write()?;
    {
        let mut by_path = write_txn.open_table(TBL_BY_PATH)?;
        let mut by_time = write_txn.open_table(TBL_BY_TIME)?;
        let mut latest = write_txn.open_table(TBL_LATEST)?;
        let mut version_count = write_txn.open_table(TBL_VERSION_COUNT)?;
        let mut stats = write_txn.open_table(TBL_STATS)?;

        for v in versions {
            let orig_path = v.orig_path.to_string_lossy().into_owned();
            let ts = ts_sortable(v.timestamp);
            let bytes = encode_record(v)?;

            let path_key = key_by_path(&orig_path, &ts);
            let is_new = by_path.insert(path_key.as_str(), bytes.as_slice())?.is_none();

            let time_key = key_by_time(&ts, &orig_path);
            by_time.insert(time_key.as_str(), bytes.as_slice())?;

            // `<=`, not `<`: a re-insert of an existing (orig_path, ts) key
            // must still refresh TBL_LATEST's cached bytes when that key is
            // the current latest, per import_snapshot's full-tuple
            // replacement contract.
            let replace_latest = match latest.get(orig_path.as_str())? {
                Some(guard) => decode_record(guard.value())?.timestamp <= v.timestamp,
                None => true,
            };
            if replace_latest {
                latest.insert(orig_path.as_str(), bytes.as_slice())?;
            }

            if !is_new {
                continue;
            }

            let count = version_count.get(orig_path.as_str())?.map(|g| g.value()).unwrap_or(0);
            version_count.insert(orig_path.as_str(), count + 1)?;

            let record_count = stats.get(STAT_RECORD_COUNT)?.map(|g| g.value()).unwrap_or(0);
            stats.insert(STAT_RECORD_COUNT, record_count + 1)?;
            let sum_plain = stats.get(STAT_SUM_PLAIN_SIZE)?.map(|g| g.value()).unwrap_or(0);
            stats.insert(STAT_SUM_PLAIN_SIZE, sum_plain + v.plain_size)?;
            let sum_packed = stats.get(STAT_SUM_PACKED_SIZE)?.map(|g| g.value()).unwrap_or(0);
            stats.insert(STAT_SUM_PACKED_SIZE, sum_packed + v.packed_size)?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

#[async_trait]
impl CatalogStore for RedbCatalog {
    async fn add_entries(&self, versions: Vec<FileVersion>) -> CoreResult<()> {
        self.run_blocking(move |db| insert_versions(&db, &versions)).await
    }

    async fn latest_version(&self, orig_path: &Path) -> CoreResult<Option<FileVersion>> {
        let orig_path = orig_path.to_string_lossy().into_owned();
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_LATEST)?;
            table
                .get(orig_path.as_str())?
                .map(|g| decode_record(g.value()))
                .transpose()
        })
        .await
    }

    async fn file_at_time(
        &self,
        orig_path: &Path,
        t: DateTime<FixedOffset>,
    ) -> CoreResult<Option<FileVersion>> {
        let orig_path = orig_path.to_string_lossy().into_owned();
        let bound = ts_sortable(at_or_before_bound(t));
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_BY_PATH)?;
            let start = key_by_path(&orig_path, "");
            let end = key_by_path(&orig_path, &bound);
            let mut best: Option<FileVersion> = None;
            for entry in table.range(start.as_str()..end.as_str())? {
                let (_, guard) = entry?;
                best = Some(decode_record(guard.value())?);
            }
            Ok(best)
        })
        .await
    }

    async fn files_at_time(&self, t: DateTime<FixedOffset>) -> CoreResult<Vec<FileVersion>> {
        let bound = ts_sortable(at_or_before_bound(t));
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_BY_TIME)?;
            let mut by_path = HashMap::new();
            for entry in table.range(..bound.as_str())? {
                let (_, guard) = entry?;
                let v = decode_record(guard.value())?;
                by_path.insert(v.orig_path.clone(), v);
            }
            Ok(by_path.into_values().collect())
        })
        .await
    }

    async fn files_in_dir_at_time(
        &self,
        dir_prefix: &Path,
        t: DateTime<FixedOffset>,
    ) -> CoreResult<Vec<FileVersion>> {
        let dir_prefix = dir_prefix.to_path_buf();
        let bound = ts_sortable(at_or_before_bound(t));
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_BY_TIME)?;
            let mut by_path = HashMap::new();
            for entry in table.range(..bound.as_str())? {
                let (_, guard) = entry?;
                let v = decode_record(guard.value())?;
                if v.orig_path.starts_with(&dir_prefix) {
                    by_path.insert(v.orig_path.clone(), v);
                }
            }
            Ok(by_path.into_values().collect())
        })
        .await
    }

    async fn history(&self, orig_path: &Path) -> CoreResult<Vec<HistoryEntry>> {
        let orig_path = orig_path.to_string_lossy().into_owned();
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_BY_PATH)?;
            let start = key_by_path(&orig_path, "");
            let end = format!("{orig_path}\u{1}");
            let mut entries = Vec::new();
            for entry in table.range(start.as_str()..end.as_str())? {
                let (_, guard) = entry?;
                let v = decode_record(guard.value())?;
                entries.push(HistoryEntry {
                    timestamp: v.timestamp,
                    content_hash: v.content_hash,
                    plain_size: v.plain_size,
                });
            }
            entries.reverse();
            Ok(entries)
        })
        .await
    }

    async fn distinct_timestamps(&self) -> CoreResult<Vec<DateTime<FixedOffset>>> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_BY_TIME)?;
            let mut sortable = BTreeSet::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                if let Some((ts, _)) = key.value().split_once('\u{0}') {
                    sortable.insert(ts.to_string());
                }
            }
            let mut out = Vec::with_capacity(sortable.len());
            for ts in sortable {
                out.push(DateTime::parse_from_rfc3339(&ts)?);
            }
            out.reverse();
            Ok(out)
        })
        .await
    }

    async fn distinct_directories(&self) -> CoreResult<Vec<PathBuf>> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_LATEST)?;
            let mut dirs = BTreeSet::new();
            for entry in table.iter()? {
                let (_, guard) = entry?;
                let v = decode_record(guard.value())?;
                dirs.insert(v.directory);
            }
            Ok(dirs.into_iter().collect())
        })
        .await
    }

    async fn files_with_info(&self) -> CoreResult<Vec<FileSummary>> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read()?;
            let latest = read_txn.open_table(TBL_LATEST)?;
            let counts = read_txn.open_table(TBL_VERSION_COUNT)?;
            let mut out = Vec::new();
            for entry in latest.iter()? {
                let (key, guard) = entry?;
                let v = decode_record(guard.value())?;
                let version_count = counts.get(key.value())?.map(|g| g.value()).unwrap_or(1);
                out.push(FileSummary {
                    orig_path: v.orig_path,
                    directory: v.directory,
                    latest_timestamp: v.timestamp,
                    version_count,
                    latest_size: v.plain_size,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn stats(&self) -> CoreResult<CatalogStats> {
        self.run_blocking(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_STATS)?;
            let get = |k: &str| -> anyhow::Result<u64> {
                Ok(table.get(k)?.map(|g| g.value()).unwrap_or(0))
            };
            Ok(CatalogStats {
                record_count: get(STAT_RECORD_COUNT)?,
                sum_plain_size: get(STAT_SUM_PLAIN_SIZE)?,
                sum_packed_size: get(STAT_SUM_PACKED_SIZE)?,
            })
        })
        .await
    }

    async fn clear_all(&self) -> CoreResult<()> {
        self.run_blocking(|db| {
            let write_txn = db.begin_write()?;
            {
                write_txn.open_table(TBL_BY_PATH)?.retain(|_, _| false)?;
                write_txn.open_table(TBL_BY_TIME)?.retain(|_, _| false)?;
                write_txn.open_table(TBL_LATEST)?.retain(|_, _| false)?;
                write_txn.open_table(TBL_VERSION_COUNT)?.retain(|_, _| false)?;
                write_txn.open_table(TBL_STATS)?.retain(|_, _| false)?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn export_snapshot(&self, path: &Path) -> CoreResult<()> {
        let path = path.to_path_buf();
        self.run_blocking(move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TBL_BY_PATH)?;
            let mut records = Vec::new();
            for entry in table.iter()? {
                let (_, guard) = entry?;
                let record: FileVersionRecord = minicbor::decode(guard.value())?;
                records.push(record);
            }
            let bytes = minicbor::to_vec(&records)
                .map_err(|e| anyhow::anyhow!("failed to encode snapshot: {e}"))?;
            std::fs::write(&path, bytes)?;
            Ok(())
        })
        .await
    }

    async fn import_snapshot(&self, path: &Path) -> CoreResult<()> {
        let path = path.to_path_buf();
        self.run_blocking(move |db| {
            let bytes = std::fs::read(&path)?;
            let records: Vec<FileVersionRecord> = minicbor::decode(&bytes)
                .map_err(|e| anyhow::anyhow!("failed to decode snapshot: {e}"))?;
            let versions = records
                .into_iter()
                .map(FileVersion::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| anyhow::anyhow!("malformed snapshot record: {e}"))?;
            insert_versions(&db, &versions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cvault_core::model::{ContentHash, PathHash};

    fn version(path: &str, ts: DateTime<FixedOffset>, content: &str) -> FileVersion {
        FileVersion {
            timestamp: ts,
            directory: PathBuf::from("/data"),
            orig_path: PathBuf::from(path),
            path_hash: PathHash::from_hex(cvault_core::crypto::hash_path(path)),
            content_hash: ContentHash::from_hex(
                cvault_core::crypto::hash_content(content.as_bytes()).unwrap(),
            ),
            plain_size: content.len() as u64,
            packed_size: content.len() as u64 + 40,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[tokio::test]
    async fn round_trips_history_and_time_travel() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = RedbCatalog::open(tmp.path()).unwrap();

        let t1 = at(2024, 1, 15, 10, 0, 0);
        let t3 = at(2024, 1, 15, 10, 0, 2);

        catalog
            .add_entries(vec![version("/data/a.txt", t1, "hello")])
            .await
            .unwrap();
        catalog
            .add_entries(vec![version("/data/a.txt", t3, "hello!")])
            .await
            .unwrap();

        let history = catalog.history(Path::new("/data/a.txt")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, t3);
        assert_eq!(history[1].timestamp, t1);

        let t2 = at(2024, 1, 15, 10, 0, 1);
        let at_t2 = catalog.file_at_time(Path::new("/data/a.txt"), t2).await.unwrap();
        assert_eq!(at_t2.unwrap().timestamp, t1);

        let summary = catalog.files_with_info().await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].version_count, 2);

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.record_count, 2);
    }

    #[tokio::test]
    async fn needs_backup_default_impl_detects_content_change() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = RedbCatalog::open(tmp.path()).unwrap();
        let t1 = at(2024, 1, 15, 10, 0, 0);
        catalog
            .add_entries(vec![version("/data/a.txt", t1, "hello")])
            .await
            .unwrap();

        let same_hash = ContentHash::from_hex(cvault_core::crypto::hash_content(&b"hello"[..]).unwrap());
        let diff_hash = ContentHash::from_hex(cvault_core::crypto::hash_content(&b"bye"[..]).unwrap());

        assert!(!catalog.needs_backup(Path::new("/data/a.txt"), &same_hash, 5).await.unwrap());
        assert!(catalog.needs_backup(Path::new("/data/a.txt"), &diff_hash, 3).await.unwrap());
    }

    #[tokio::test]
    async fn export_then_import_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = RedbCatalog::open(tmp.path()).unwrap();
        let t1 = at(2024, 1, 15, 10, 0, 0);
        catalog
            .add_entries(vec![version("/data/a.txt", t1, "hello")])
            .await
            .unwrap();

        let snapshot_path = tmp.path().join("snap.bin");
        catalog.export_snapshot(&snapshot_path).await.unwrap();
        catalog.import_snapshot(&snapshot_path).await.unwrap();
        catalog.import_snapshot(&snapshot_path).await.unwrap();

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.record_count, 1);
    }
}
