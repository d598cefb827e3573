//! Incremental scanner (C3): walks configured roots and emits the set of
//! paths whose content has changed since their latest catalog entry.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::catalog::CatalogStore;
use crate::crypto;
use crate::error::CoreResult;
use crate::model::{ChangeRecord, ContentHash, PathHash};

/// Extensions (without the configured blacklist's leading dot, if any) that
/// the scanner skips entirely.
#[derive(Clone, Debug, Default)]
pub struct ExtensionBlacklist(HashSet<String>);

impl ExtensionBlacklist {
    pub fn new(extensions: impl IntoIterator<Item = String>) -> Self {
        Self(
            extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        )
    }

    fn blocks(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.0.contains(&ext.to_ascii_lowercase()),
            None => false,
        }
    }
}

/// Running counters surfaced to the driver at a coarse cadence.
#[derive(Debug, Default)]
pub struct ScanCounters {
    pub scanned: AtomicU64,
    pub unchanged: AtomicU64,
    pub to_backup: AtomicU64,
}

impl ScanCounters {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.scanned.load(Ordering::Relaxed),
            self.unchanged.load(Ordering::Relaxed),
            self.to_backup.load(Ordering::Relaxed),
        )
    }
}

/// Walks `roots` in order, querying `catalog` for each regular, non-empty
/// file, and returns the ordered sequence of paths that need backing up.
///
/// Per-file I/O errors (unreadable file, permission denied mid-walk) are
/// skipped and never abort the scan, per the scanner's per-file error
/// policy.
pub async fn scan(
    catalog: &dyn CatalogStore,
    roots: &[PathBuf],
    blacklist: &ExtensionBlacklist,
    counters: Arc<ScanCounters>,
    should_stop: &dyn Fn() -> bool,
    mut on_progress: impl FnMut(u64, u64, u64),
) -> CoreResult<Vec<ChangeRecord>> {
    let mut seen = HashSet::new();
    let mut changes = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if should_stop() {
                return Ok(changes);
            }

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            let abs_path = match path.canonicalize() {
                Ok(p) => p,
                Err(_) => path.to_path_buf(),
            };
            if !seen.insert(abs_path.clone()) {
                continue;
            }

            if blacklist.blocks(&abs_path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() == 0 {
                continue;
            }

            let content_hash = match hash_file(&abs_path) {
                Ok(h) => h,
                Err(_) => continue,
            };

            counters.scanned.fetch_add(1, Ordering::Relaxed);

            let needs = catalog
                .needs_backup(&abs_path, &content_hash, metadata.len())
                .await?;

            if needs {
                counters.to_backup.fetch_add(1, Ordering::Relaxed);
                let path_hash = PathHash::from_hex(crypto::hash_path(&abs_path.to_string_lossy()));
                changes.push(ChangeRecord {
                    orig_path: abs_path,
                    plain_size: metadata.len(),
                    path_hash,
                    content_hash,
                });
            } else {
                counters.unchanged.fetch_add(1, Ordering::Relaxed);
            }

            let (scanned, unchanged, to_backup) = counters.snapshot();
            if scanned % 100 == 0 {
                on_progress(scanned, unchanged, to_backup);
            }
        }
    }

    let (scanned, unchanged, to_backup) = counters.snapshot();
    on_progress(scanned, unchanged, to_backup);

    Ok(changes)
}

fn hash_file(path: &Path) -> CoreResult<ContentHash> {
    let file = File::open(path)
        .map_err(|e| crate::error::CoreError::filesystem(path, e))?;
    crypto::hash_content(file).map(ContentHash::from_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_normalizes_leading_dot_and_case() {
        let bl = ExtensionBlacklist::new(vec![".TMP".to_string(), "log".to_string()]);
        assert!(bl.blocks(Path::new("/x/a.tmp")));
        assert!(bl.blocks(Path::new("/x/a.LOG")));
        assert!(!bl.blocks(Path::new("/x/a.txt")));
    }
}
