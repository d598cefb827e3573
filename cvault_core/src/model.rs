//! Pure data types shared across the catalog, scanner, packer and restore
//! planner. Nothing in this module performs I/O.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use minicbor::{CborLen, Decode, Encode};
use serde::{Deserialize, Serialize};

/// SHA-224 hex digest of an absolute source path. Used only as an opaque,
/// server-visible object name — never reversed by the server.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathHash(String);

impl PathHash {
    pub fn from_hex(hex: String) -> Self {
        debug_assert_eq!(hex.len(), 56, "path hash must be 56 hex chars (SHA-224)");
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Archive member name for this hash: `{path_hash}.enc`.
    pub fn member_name(&self) -> String {
        format!("{}.enc", self.0)
    }
}

impl fmt::Display for PathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 hex digest of plaintext file bytes. Used for change detection and
/// version identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_hex(hex: String) -> Self {
        debug_assert_eq!(hex.len(), 64, "content hash must be 64 hex chars (SHA-256)");
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable record asserting what a file's contents were at one
/// session's timestamp.
///
/// Invariants (enforced by the catalog, not this type): append-only,
/// `path_hash = hash_path(orig_path)`, and two consecutive versions of the
/// same `orig_path` never share a `content_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub timestamp: DateTime<FixedOffset>,
    pub directory: PathBuf,
    pub orig_path: PathBuf,
    pub path_hash: PathHash,
    pub content_hash: ContentHash,
    pub plain_size: u64,
    pub packed_size: u64,
}

/// Wire/on-disk shape of [`FileVersion`]: timestamps as RFC 3339 strings and
/// paths as UTF-8, so the catalog's storage engine never has to special-case
/// `chrono` or `PathBuf` encodings.
#[derive(Clone, Debug, Encode, Decode, CborLen)]
#[cbor(array)]
pub struct FileVersionRecord {
    #[n(0)]
    pub timestamp: String,
    #[n(1)]
    pub directory: String,
    #[n(2)]
    pub orig_path: String,
    #[n(3)]
    pub path_hash: String,
    #[n(4)]
    pub content_hash: String,
    #[n(5)]
    pub plain_size: u64,
    #[n(6)]
    pub packed_size: u64,
}

impl From<&FileVersion> for FileVersionRecord {
    fn from(v: &FileVersion) -> Self {
        Self {
            timestamp: v.timestamp.to_rfc3339(),
            directory: v.directory.to_string_lossy().into_owned(),
            orig_path: v.orig_path.to_string_lossy().into_owned(),
            path_hash: v.path_hash.as_str().to_owned(),
            content_hash: v.content_hash.as_str().to_owned(),
            plain_size: v.plain_size,
            packed_size: v.packed_size,
        }
    }
}

impl TryFrom<FileVersionRecord> for FileVersion {
    type Error = chrono::ParseError;

    fn try_from(r: FileVersionRecord) -> Result<Self, Self::Error> {
        Ok(FileVersion {
            timestamp: DateTime::parse_from_rfc3339(&r.timestamp)?,
            directory: PathBuf::from(r.directory),
            orig_path: PathBuf::from(r.orig_path),
            path_hash: PathHash::from_hex(r.path_hash),
            content_hash: ContentHash::from_hex(r.content_hash),
            plain_size: r.plain_size,
            packed_size: r.packed_size,
        })
    }
}

/// One entry in [`history`](crate::catalog::CatalogStore::history) output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub content_hash: ContentHash,
    pub plain_size: u64,
}

/// One row of [`files_with_info`](crate::catalog::CatalogStore::files_with_info).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSummary {
    pub orig_path: PathBuf,
    pub directory: PathBuf,
    pub latest_timestamp: DateTime<FixedOffset>,
    pub version_count: u64,
    pub latest_size: u64,
}

/// Aggregate catalog statistics: `(record_count, sum_plain_size, sum_packed_size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CatalogStats {
    pub record_count: u64,
    pub sum_plain_size: u64,
    pub sum_packed_size: u64,
}

/// One path the scanner has determined needs backing up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    pub orig_path: PathBuf,
    pub plain_size: u64,
    pub path_hash: PathHash,
    pub content_hash: ContentHash,
}
