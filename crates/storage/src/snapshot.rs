//! Point-in-time snapshots of the full table.
//!
//! A snapshot is a gzip-compressed JSON array of `[key, record]` pairs.
//! Snapshots bound recovery time; they do not replace the WAL (see the
//! engine's recovery path).

use crate::record::Record;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Write all entries to `path` as gzip-JSON. Entries must already be in
/// deterministic (key) order.
pub fn write(path: &Path, entries: &[(String, Record)]) -> Result<(), SnapshotError> {
    let json = serde_json::to_vec(entries)?;
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&json)?;
    encoder.finish()?.sync_data()?;
    Ok(())
}

/// Read a snapshot back. Returns `Ok(None)` when the file does not
/// exist; decode failures bubble up so the caller can log and discard.
pub fn read(path: &Path) -> Result<Option<Vec<(String, Record)>>, SnapshotError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SnapshotError::Io(e)),
    };
    let decoder = GzDecoder::new(BufReader::new(file));
    let entries: Vec<(String, Record)> = serde_json::from_reader(decoder)?;
    Ok(Some(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringkv_common::Value;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json.gz");

        let entries = vec![
            (
                "a".to_string(),
                Record::with_ts(Value::Bytes("one".into()), 1),
            ),
            (
                "b".to_string(),
                Record::with_ts(Value::Json(json!({"n": 2})), 2),
            ),
        ];
        write(&path, &entries).unwrap();

        let back = read(&path).unwrap().unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn test_snapshot_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(read(&dir.path().join("nope.json.gz")).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_corrupt_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json.gz");
        std::fs::write(&path, b"this is not gzip").unwrap();
        assert!(read(&path).is_err());
    }

    #[test]
    fn test_snapshot_is_gzipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snap.json.gz");
        write(&path, &[]).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b], "gzip magic bytes");
    }
}
