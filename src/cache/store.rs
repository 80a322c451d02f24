//! Generic TTL-stamped JSON record storage
//!
//! Provides read/write of a single serializable value per file, wrapped in a
//! `{"ts": <epoch seconds>, "data": ...}` record, plus a staleness predicate.
//! Every call re-touches disk; there is no in-memory state. Files are
//! replaced atomically (temp file + rename) so a reader never observes a
//! half-written record. Single-writer usage pattern; concurrent writers to
//! the same path from multiple processes are out of scope.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// On-disk record wrapper: write timestamp plus payload.
#[derive(Debug, Serialize, Deserialize)]
struct Record<T> {
    /// Epoch seconds at write time, never retroactively modified
    #[serde(with = "chrono::serde::ts_seconds")]
    ts: DateTime<Utc>,
    /// The cached payload
    data: T,
}

/// Timestamp-only view of a record, for freshness probes that skip
/// deserializing the payload.
#[derive(Debug, Deserialize)]
struct Stamp {
    #[serde(with = "chrono::serde::ts_seconds")]
    ts: DateTime<Utc>,
}

/// Reads a record's payload, honoring the TTL.
///
/// Returns `None` if the file does not exist, is unreadable, contains
/// invalid data, or (`ttl > 0`) the record's age meets or exceeds the TTL.
/// A zero TTL disables expiry entirely: only absence counts as a miss.
pub fn read<T: DeserializeOwned>(path: &Path, ttl: Duration) -> Option<T> {
    let content = fs::read_to_string(path).ok()?;
    let record: Record<T> = match serde_json::from_str(&content) {
        Ok(record) => record,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "discarding unreadable cache record");
            return None;
        }
    };
    if expired(record.ts, ttl) {
        return None;
    }
    Some(record.data)
}

/// Writes `data` as a fresh record, replacing any prior content of `path`.
///
/// The record is serialized to a sibling temp file and renamed into place,
/// so readers see either the old record or the new one, never a torn write.
pub fn write<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let record = Record {
        ts: Utc::now(),
        data,
    };
    write_json(path, &record)
}

/// Same staleness predicate as [`read`], without deserializing the payload.
///
/// A missing or unreadable file counts as stale.
pub fn is_stale(path: &Path, ttl: Duration) -> bool {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return true,
    };
    match serde_json::from_str::<Stamp>(&content) {
        Ok(stamp) => expired(stamp.ts, ttl),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "treating unreadable cache record as stale");
            true
        }
    }
}

/// Serializes any value to `path` atomically (temp file + rename).
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)
}

fn expired(ts: DateTime<Utc>, ttl: Duration) -> bool {
    !ttl.is_zero() && Utc::now().signed_duration_since(ts) >= ttl
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn test_data() -> TestData {
        TestData {
            name: "test".to_string(),
            value: 42,
        }
    }

    /// Rewrites a record file with its timestamp moved `days` into the past.
    pub(crate) fn backdate_record(path: &Path, days: i64) {
        let content = fs::read_to_string(path).expect("record should exist");
        let mut value: serde_json::Value =
            serde_json::from_str(&content).expect("record should parse");
        let ts = value["ts"].as_i64().expect("record should carry ts");
        value["ts"] = serde_json::Value::from(ts - days * 86_400);
        fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write(&path, &test_data()).expect("write should succeed");
        let result: Option<TestData> = read(&path, Duration::days(1));

        assert_eq!(result, Some(test_data()));
    }

    #[test]
    fn test_read_missing_file_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");

        let result: Option<TestData> = read(&path, Duration::days(1));

        assert!(result.is_none());
    }

    #[test]
    fn test_read_invalid_json_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "not valid json").unwrap();

        let result: Option<TestData> = read(&path, Duration::days(1));

        assert!(result.is_none());
    }

    #[test]
    fn test_read_expired_record_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write(&path, &test_data()).unwrap();
        backdate_record(&path, 2);

        let result: Option<TestData> = read(&path, Duration::days(1));
        assert!(result.is_none(), "record older than TTL should be a miss");
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write(&path, &test_data()).unwrap();
        backdate_record(&path, 10_000);

        let result: Option<TestData> = read(&path, Duration::zero());
        assert_eq!(result, Some(test_data()), "zero TTL disables expiry");
        assert!(!is_stale(&path, Duration::zero()));
    }

    #[test]
    fn test_is_stale_matches_read_semantics() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        assert!(is_stale(&path, Duration::days(1)), "missing file is stale");

        write(&path, &test_data()).unwrap();
        assert!(!is_stale(&path, Duration::days(1)));

        backdate_record(&path, 2);
        assert!(is_stale(&path, Duration::days(1)));
    }

    #[test]
    fn test_is_stale_treats_garbage_as_stale() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{}").unwrap();

        assert!(is_stale(&path, Duration::days(1)));
    }

    #[test]
    fn test_overwrite_replaces_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write(&path, &test_data()).unwrap();
        let second = TestData {
            name: "second".to_string(),
            value: 2,
        };
        write(&path, &second).unwrap();

        let result: Option<TestData> = read(&path, Duration::days(1));
        assert_eq!(result, Some(second));
    }

    #[test]
    fn test_write_leaves_no_temp_file_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        write(&path, &test_data()).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("deep").join("record.json");

        write(&path, &test_data()).unwrap();

        let result: Option<TestData> = read(&path, Duration::days(1));
        assert_eq!(result, Some(test_data()));
    }

    #[test]
    fn test_record_serializes_ts_as_epoch_seconds() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record.json");

        let before = Utc::now().timestamp();
        write(&path, &test_data()).unwrap();
        let after = Utc::now().timestamp();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let ts = value["ts"].as_i64().expect("ts should be an integer");
        assert!(ts >= before && ts <= after);
        assert!(value["data"].is_object());
    }
}
