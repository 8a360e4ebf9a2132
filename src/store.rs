//! Key-value stores standing in for browser local storage.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{TrackerError, TrackerResult};

/// Whole-blob key-value store. `get` returns `Ok(None)` for a missing key.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> TrackerResult<Option<String>>;

    fn set(&mut self, key: &str, blob: &str) -> TrackerResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> TrackerResult<()> {
        self.entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory. Bytes of the key other
/// than ASCII alphanumerics, `-` and `_` are written as `%XX`, so distinct
/// keys never share a file and no key can leave the directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> TrackerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| TrackerError::StorageUnavailable(format!("{}: {}", dir.display(), e)))?;
        Ok(FileStore { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => name.push(byte as char),
                _ => name.push_str(&format!("%{:02X}", byte)),
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TrackerError::StorageUnavailable(e.to_string())),
        }
    }

    fn set(&mut self, key: &str, blob: &str) -> TrackerResult<()> {
        fs::write(self.path_for(key), blob)
            .map_err(|e| TrackerError::StorageUnavailable(e.to_string()))
    }
}
