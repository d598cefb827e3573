//! Session identifiers: `YYYYMMDD-HHMMSS` in the local time of the
//! originating client, plus tolerant parsing of the legacy `YYYY-MM-DD`
//! directory form some older clients wrote.

use chrono::{DateTime, FixedOffset};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Derives the session id from a session's start timestamp.
    pub fn from_timestamp(t: DateTime<FixedOffset>) -> Self {
        Self(t.format("%Y%m%d-%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts the canonical `YYYYMMDD-HHMMSS` form and the legacy
    /// `YYYY-MM-DD` form on read, per the wire-format tolerance contract.
    pub fn parse(raw: &str) -> Option<Self> {
        if is_canonical(raw) {
            return Some(Self(raw.to_string()));
        }
        if is_legacy_date(raw) {
            return Some(Self(raw.to_string()));
        }
        None
    }

    /// Shard filename for the `n`-th (1-based) shard of this session.
    pub fn shard_name(&self, index: u32) -> String {
        format!("{}-{:06}.tar", self.0, index)
    }

    /// Catalog snapshot object name for this session.
    pub fn catalog_name(&self) -> String {
        format!("{}.katalog.enc", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_canonical(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 15
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'-'
        && bytes[9..].iter().all(u8::is_ascii_digit)
}

fn is_legacy_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_canonical_session_id() {
        let t = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
            .unwrap();
        let id = SessionId::from_timestamp(t);
        assert_eq!(id.as_str(), "20240115-100000");
        assert_eq!(id.shard_name(1), "20240115-100000-000001.tar");
        assert_eq!(id.catalog_name(), "20240115-100000.katalog.enc");
    }

    #[test]
    fn parses_canonical_and_legacy_forms() {
        assert!(SessionId::parse("20240115-100000").is_some());
        assert!(SessionId::parse("2024-01-15").is_some());
        assert!(SessionId::parse("not-a-session").is_none());
    }
}
