//! Durable backing for the caches.
//!
//! Caches snapshot themselves to a named blob after every mutation and reload
//! it at construction. [`FileStore`] is the production backing;
//! [`MemoryStore`] serves tests and the `--memory-cache` mode.

use crate::Result;
use core::fmt::Debug;
use ohno::IntoAppError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Named-blob persistence used by the caches.
pub trait Store: Send + Sync + Debug {
    /// Read a blob, if present. Read failures count as absence.
    fn load(&self, name: &str) -> Option<String>;

    /// Write a blob, replacing any previous content.
    fn save(&self, name: &str, payload: &str) -> Result<()>;

    /// Delete a blob. Deleting a missing blob is not an error.
    fn remove(&self, name: &str) -> Result<()>;
}

/// In-process store with no durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, name: &str) -> Option<String> {
        self.blobs.lock().ok()?.get(name).cloned()
    }

    fn save(&self, name: &str, payload: &str) -> Result<()> {
        let mut blobs = self.blobs.lock().map_err(|_| ohno::app_err!("store mutex poisoned"))?;
        let _ = blobs.insert(name.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut blobs = self.blobs.lock().map_err(|_| ohno::app_err!("store mutex poisoned"))?;
        let _ = blobs.remove(name);
        Ok(())
    }
}

/// Store that keeps each blob as a JSON file in one directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir` as the blob directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .into_app_err_with(|| format!("couldn't create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl Store for FileStore {
    fn load(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.blob_path(name)).ok()
    }

    fn save(&self, name: &str, payload: &str) -> Result<()> {
        let path = self.blob_path(name);
        fs::write(&path, payload)
            .into_app_err_with(|| format!("couldn't write cache file {}", path.display()))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.blob_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).into_app_err_with(|| format!("couldn't remove cache file {}", path.display()))
            }
        }
    }
}
