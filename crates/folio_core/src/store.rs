//! Document persistence abstraction.
//!
//! The engine only ever loads, saves and deletes whole documents by
//! canonical path; everything else about persistence is the store's
//! business. `save` followed by `load` must yield identical text, and
//! `delete` must make a subsequent `load` fail with `NotFound`.

use std::collections::HashMap;
use std::future::Future;
use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Async persistence for paper documents.
pub trait DocumentStore: Send + Sync {
    /// Load the text of the document at `path`.
    ///
    /// Fails with [`ErrorKind::NotFound`] when no document exists there; the
    /// caller decides whether that means "create empty".
    fn load(&self, path: &Path) -> impl Future<Output = Result<String>> + Send;

    /// Persist `text` as the document at `path`.
    ///
    /// Atomic enough that a concurrent reader sees either the old or the new
    /// content, never a torn mix.
    fn save(&self, path: &Path, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove the document at `path`. After this, `load` fails with
    /// [`ErrorKind::NotFound`].
    fn delete(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// In-memory store for tests and guest papers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document, bypassing the async interface.
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.documents
            .lock()
            .unwrap()
            .insert(path.into(), text.into());
    }

    /// Read a document back, bypassing the async interface.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.documents.lock().unwrap().get(path).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.lock().unwrap().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, path: &Path) -> impl Future<Output = Result<String>> + Send {
        let result = self
            .documents
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("{}", path.display())));
        async move { result }
    }

    fn save(&self, path: &Path, text: &str) -> impl Future<Output = Result<()>> + Send {
        self.documents
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), text.to_string());
        async move { Ok(()) }
    }

    fn delete(&self, path: &Path) -> impl Future<Output = Result<()>> + Send {
        let result = match self.documents.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("{}", path.display()),
            )),
        };
        async move { result }
    }
}

/// Filesystem-backed store.
///
/// Saves write a sibling temp file and rename it into place, so readers see
/// either the old or the new document.
#[derive(Debug, Default, Clone)]
pub struct FsStore;

impl FsStore {
    /// A store reading and writing regular files.
    pub fn new() -> Self {
        FsStore
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl DocumentStore for FsStore {
    fn load(&self, path: &Path) -> impl Future<Output = Result<String>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::read_to_string(&path).await }
    }

    fn save(&self, path: &Path, text: &str) -> impl Future<Output = Result<()>> + Send {
        let path = path.to_path_buf();
        let text = text.to_string();
        async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let temp = Self::temp_path(&path);
            tokio::fs::write(&temp, text.as_bytes()).await?;
            tokio::fs::rename(&temp, &path).await
        }
    }

    fn delete(&self, path: &Path) -> impl Future<Output = Result<()>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::remove_file(&path).await }
    }
}
