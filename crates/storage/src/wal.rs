//! Write-ahead log for durability.
//!
//! Binary format, big-endian: each entry is
//! `[op:1][klen:u32][vlen:u32][key bytes][value bytes]`.
//! `op` is 1 for PUT, 2 for DELETE; DELETE entries carry `vlen = 0`.
//! On recovery, entries are replayed in order and replay stops at the
//! first torn or malformed entry (the expected shape of a crash mid-flush).

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Keys beyond this length cannot have been written by us; a larger
/// header field means the tail is garbage.
const MAX_KEY_LEN: u32 = 64 * 1024;
const MAX_VALUE_LEN: u32 = 64 * 1024 * 1024;

pub const OP_PUT: u8 = 1;
pub const OP_DELETE: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A single decoded WAL entry.
#[derive(Debug, Clone, PartialEq)]
pub enum WalRecord {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WalRecord {
    pub fn key(&self) -> &str {
        match self {
            WalRecord::Put { key, .. } | WalRecord::Delete { key } => key,
        }
    }
}

/// Append the binary encoding of a PUT to `buf`.
pub fn encode_put(buf: &mut Vec<u8>, key: &str, value: &[u8]) {
    buf.push(OP_PUT);
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value);
}

/// Append the binary encoding of a DELETE to `buf`.
pub fn encode_delete(buf: &mut Vec<u8>, key: &str) {
    buf.push(OP_DELETE);
    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(key.as_bytes());
}

/// The open WAL file. Only the flush path writes to it; entries are
/// batched in memory by the engine and handed over as one byte run.
#[derive(Debug)]
pub struct WalFile {
    file: File,
    path: PathBuf,
}

impl WalFile {
    /// Open or create the WAL at `path` in append mode.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Write a batch of encoded entries and fsync.
    pub fn write_batch(&mut self, bytes: &[u8]) -> Result<(), WalError> {
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Drop all entries. Used only when snapshot truncation is enabled.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replay all decodable entries from a WAL file, in write order.
///
/// A missing file yields an empty log. A truncated header, an impossible
/// length field, an unknown op byte, or a short body all end the replay
/// at that point without error: everything before the tear is kept.
pub fn replay(path: &Path) -> Result<Vec<WalRecord>, WalError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(WalError::Io(e)),
    };

    let mut reader = BufReader::new(file);
    let mut records = Vec::new();

    loop {
        let mut op = [0u8; 1];
        match reader.read_exact(&mut op) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // clean EOF
            Err(e) => return Err(WalError::Io(e)),
        }
        let op = op[0];
        if op != OP_PUT && op != OP_DELETE {
            tracing::warn!(
                "WAL entry {} has unknown op {}; stopping replay",
                records.len(),
                op
            );
            break;
        }

        // From here on, any short read is a torn tail: stop, keep the prefix.
        macro_rules! read_or_break {
            ($buf:expr) => {
                match reader.read_exact($buf) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        tracing::warn!(
                            "WAL truncated mid-entry at entry {}; stopping replay",
                            records.len()
                        );
                        break;
                    }
                    Err(e) => return Err(WalError::Io(e)),
                }
            };
        }

        let mut klen_buf = [0u8; 4];
        read_or_break!(&mut klen_buf);
        let klen = u32::from_be_bytes(klen_buf);

        let mut vlen_buf = [0u8; 4];
        read_or_break!(&mut vlen_buf);
        let vlen = u32::from_be_bytes(vlen_buf);

        if klen == 0 || klen > MAX_KEY_LEN || vlen > MAX_VALUE_LEN {
            tracing::warn!(
                "WAL entry {} has impossible lengths (klen={}, vlen={}); stopping replay",
                records.len(),
                klen,
                vlen
            );
            break;
        }

        let mut key_bytes = vec![0u8; klen as usize];
        read_or_break!(&mut key_bytes);

        let mut value = vec![0u8; vlen as usize];
        read_or_break!(&mut value);

        let key = match String::from_utf8(key_bytes) {
            Ok(k) => k,
            Err(_) => {
                tracing::warn!(
                    "WAL entry {} has non-UTF-8 key; stopping replay",
                    records.len()
                );
                break;
            }
        };

        records.push(match op {
            OP_PUT => WalRecord::Put { key, value },
            _ => WalRecord::Delete { key },
        });
    }

    Ok(records)
}
