//! File-backed key/value JSON documents.
//!
//! A document is a JSON object persisted as one file. `DocumentStore` owns a
//! data directory and caches one handle per document name. Probing never
//! creates files: `open` checks existence first and fails with
//! `StoreError::StoreNotFound`, while `open_or_create` hands out an in-memory
//! document whose file appears on the first `save`.
//!
//! Handles wrap the document in an async mutex. Holding the lock for the
//! whole of a load or save serializes operations on the same document.
//!
//! A cached document never runs ahead of the disk: edits are staged until
//! `save` succeeds, and a failed flush puts the last committed entries back.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Shared handle to a cached document.
pub type DocumentHandle = Arc<tokio::sync::Mutex<Document>>;

/// One JSON key/value document.
#[derive(Debug)]
pub struct Document {
    name: String,
    path: PathBuf,
    entries: Map<String, Value>,
    /// Entries as last read from or written to disk.
    committed: Map<String, Value>,
}

impl Document {
    fn empty(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            entries: Map::new(),
            committed: Map::new(),
        }
    }

    async fn read(name: &str, path: PathBuf) -> Result<Self> {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::StoreNotFound(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::empty(name, path));
        }

        let entries = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => {
                return Err(StoreError::Corrupted(format!(
                    "{} is not a JSON object",
                    name
                )))
            }
            Err(e) => return Err(StoreError::Corrupted(format!("{}: {}", name, e))),
        };

        Ok(Self {
            name: name.to_string(),
            path,
            committed: entries.clone(),
            entries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Typed read of `key`. A value of the wrong shape is `Corrupted`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| {
                    StoreError::Corrupted(format!("Key {} in {}: {}", key, self.name, e))
                }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(value) if !value.is_null())
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether there are edits that have not been flushed yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.entries != self.committed
    }

    /// Drop unsaved edits, back to the last committed entries.
    pub fn discard_changes(&mut self) {
        if self.has_unsaved_changes() {
            debug!(document = %self.name, "discarding unsaved changes");
            self.entries = self.committed.clone();
        }
    }

    /// Flush the whole document to disk atomically.
    ///
    /// # Errors
    ///
    /// On failure the file keeps its previous contents and the unsaved
    /// edits are discarded, so the document still matches the disk.
    pub async fn save(&mut self) -> Result<()> {
        let written = match serde_json::to_vec_pretty(&self.entries) {
            Ok(bytes) => crate::fs::write_atomic(&self.path, &bytes)
                .await
                .map_err(StoreError::from),
            Err(err) => Err(err.into()),
        };

        match written {
            Ok(()) => {
                self.committed = self.entries.clone();
                debug!(document = %self.name, keys = self.entries.len(), "document saved");
                Ok(())
            }
            Err(err) => {
                warn!(document = %self.name, error = %err, "document flush failed");
                self.entries = self.committed.clone();
                Err(err)
            }
        }
    }
}

/// Owner of a data directory and its cached document handles.
///
/// Create one per composition root and share it (`Arc`) with every component
/// that reads or writes documents in that directory.
#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    handles: Mutex<HashMap<String, DocumentHandle>>,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn lock_handles(&self) -> Result<MutexGuard<'_, HashMap<String, DocumentHandle>>> {
        self.handles
            .lock()
            .map_err(|_| StoreError::Storage("Document cache poisoned".to_string()))
    }

    fn cached(&self, name: &str) -> Result<Option<DocumentHandle>> {
        Ok(self.lock_handles()?.get(name).cloned())
    }

    fn cache(&self, name: &str, document: Document) -> Result<DocumentHandle> {
        let mut handles = self.lock_handles()?;
        let handle = handles
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(document)));
        Ok(Arc::clone(handle))
    }

    /// Whether the backing file of `name` exists on disk.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(name)).await?)
    }

    /// Open an existing document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::StoreNotFound` if the file does not exist and no
    /// handle is cached. The file is not created.
    pub async fn open(&self, name: &str) -> Result<DocumentHandle> {
        if let Some(handle) = self.cached(name)? {
            return Ok(handle);
        }

        if !self.exists(name).await? {
            return Err(StoreError::StoreNotFound(name.to_string()));
        }

        let document = Document::read(name, self.path(name)).await?;
        debug!(document = name, "document opened");
        self.cache(name, document)
    }

    /// Open a document, or start an empty one that is written on first save.
    pub async fn open_or_create(&self, name: &str) -> Result<DocumentHandle> {
        match self.open(name).await {
            Ok(handle) => Ok(handle),
            Err(StoreError::StoreNotFound(_)) => {
                debug!(document = name, "starting new document");
                self.cache(name, Document::empty(name, self.path(name)))
            }
            Err(err) => Err(err),
        }
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cached(name).map(|h| h.is_some()).unwrap_or(false)
    }

    /// Drop the cached handle for `name` so the next open re-checks the disk.
    ///
    /// Must only be called between awaited operations on that document.
    pub fn reset(&self, name: &str) -> Result<bool> {
        Ok(self.lock_handles()?.remove(name).is_some())
    }

    /// Drop the cached handle for `name` if its file has never been written.
    ///
    /// `open_or_create` caches an empty document before anything reaches the
    /// disk. If the first write fails, that handle would otherwise keep
    /// answering `open` for a file that does not exist. Returns whether a
    /// handle was dropped.
    pub async fn forget_if_unsaved(&self, name: &str) -> Result<bool> {
        if crate::fs::exists_conservative(&self.path(name)).await {
            return Ok(false);
        }
        let forgotten = self.reset(name)?;
        if forgotten {
            debug!(document = name, "forgot handle of unwritten document");
        }
        Ok(forgotten)
    }

    /// Drop every cached handle.
    pub fn reset_all(&self) -> Result<()> {
        self.lock_handles()?.clear();
        Ok(())
    }

    /// Wait for any in-flight operation on `name` to finish, then reset its
    /// handle. Returns whether a handle was cached.
    pub async fn invalidate(&self, name: &str) -> Result<bool> {
        if let Some(handle) = self.cached(name)? {
            let _guard = handle.lock().await;
            return self.reset(name);
        }
        Ok(false)
    }
}
