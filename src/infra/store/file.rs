//! Directory-backed context store.
//!
//! Each key is one file holding an expiry header line followed by the raw
//! value. Writes go to a temporary file that is renamed into place, so a
//! reader in another process never observes a half-written value. This makes
//! the store usable between a supervisor and its OS worker processes on one
//! host without an external service.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ContextStore;
use crate::core::StoreError;
use crate::util::clock::now_ms;

const NO_EXPIRY: &str = "-";

/// File-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.entry", encode_key(key)))
    }

    /// Remove every expired entry and return how many were removed.
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the directory cannot be listed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let dir = fs::read_dir(&self.root).map_err(|e| StoreError::Io(e.to_string()))?;
        for entry in dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("entry") {
                continue;
            }
            if let Ok(bytes) = fs::read(&path) {
                if matches!(parse_entry(&bytes), Ok(None)) && fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

/// Percent-style encoding that keeps file names portable and collision-free.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Returns `Ok(None)` when the entry has expired.
fn parse_entry(bytes: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
    let split = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| StoreError::Codec("entry header missing".into()))?;
    let header = std::str::from_utf8(&bytes[..split])
        .map_err(|e| StoreError::Codec(e.to_string()))?
        .trim();
    if header != NO_EXPIRY {
        let expires_at_ms: u128 = header
            .parse()
            .map_err(|_| StoreError::Codec(format!("bad expiry header `{header}`")))?;
        if expires_at_ms <= now_ms() {
            return Ok(None);
        }
    }
    Ok(Some(bytes[split + 1..].to_vec()))
}

impl ContextStore for FileStore {
    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let header = ttl.map_or_else(
            || NO_EXPIRY.to_owned(),
            |ttl| (now_ms() + ttl.as_millis()).to_string(),
        );
        let target = self.path_for(key);
        let tmp = self.root.join(format!(
            ".{}.{}.tmp",
            encode_key(key),
            uuid::Uuid::new_v4().simple()
        ));

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
            file.write_all(header.as_bytes())?;
            file.write_all(b"\n")?;
            file.write_all(value)?;
            file.sync_data()?;
            fs::rename(&tmp, &target)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(e.to_string())
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        let value = parse_entry(&bytes)?;
        if value.is_none() {
            let _ = fs::remove_file(&path);
        }
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let live = self.get(key)?.is_some();
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(live),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}
