//! Blob storage for originals and derivatives.
//!
//! Keys are the `/`-separated strings built by
//! [`PathResolver`](crate::paths::PathResolver). A store only needs to answer
//! four questions: does a key exist, what bytes are under it, store these
//! bytes, and which keys live below a prefix.
//!
//! [`FsBlobStore`] maps keys to files under a root directory. Writes go to a
//! hidden temp file in the target directory and are renamed into place, so a
//! reader never sees a half-written derivative.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Blob Storage Provider.
///
/// `write` overwrites unconditionally and creates any intermediate
/// directories. `list` returns every key below `prefix` (recursively),
/// sorted.
pub trait BlobStore: Sync {
    fn exists(&self, key: &str) -> Result<bool, StorageError>;
    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Filesystem-backed blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

/// Distinguishes concurrent writers' temp files within one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path below the root, refusing anything that could
    /// escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidKey(key.to_string());
        if key.is_empty() || key.contains('\\') {
            return Err(invalid());
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(invalid()),
            }
        }
        if key.split('/').any(str::is_empty) {
            return Err(invalid());
        }
        Ok(self.root.join(relative))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        path.with_file_name(format!(".{file_name}.{}.{n}.tmp", std::process::id()))
    }
}

impl BlobStore for FsBlobStore {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io(e),
        })
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = Self::temp_path(&path);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = std::fs::remove_file(&tmp);
        })?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.path_for(prefix)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            keys.push(key.join("/"));
        }
        keys.sort();
        Ok(keys)
    }
}
