//! Generic persisted key-collection store
//!
//! Each logical collection (clients, loans, payments, tokens) is one aggregate
//! document held behind an [`EntityStore`]. The store loads the document
//! lazily, writes it back wholesale after every mutation, and serializes all
//! access through a single per-document mutex. There is no versioning and no
//! merge: the lock fully orders writers, and the second writer under
//! contention wins at document granularity. Callers that need read-modify-write
//! must go through [`EntityStore::update`] - a separate read followed by a
//! later write re-opens the lost-update window the lock exists to close.

pub mod backend;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};

use crate::core::{CoreError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

/// Bounds every aggregate document must satisfy.
pub trait Document: Default + Clone + Serialize + DeserializeOwned + Send + 'static {}

impl<T> Document for T where T: Default + Clone + Serialize + DeserializeOwned + Send + 'static {}

/// One typed aggregate document with a mutual-exclusion concurrency contract.
///
/// `read` observes either the state before or after any given `write`, never a
/// partial state. `update` performs read-apply-write as one atomic step while
/// holding the document lock. The lock is scoped to the whole document, not to
/// individual records inside it: unrelated updates to the same collection
/// serialize, which is the intended tradeoff at this scale.
pub struct EntityStore<T: Document> {
    backend: Box<dyn StorageBackend>,
    doc: Mutex<Option<T>>,
}

impl<T: Document> EntityStore<T> {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            doc: Mutex::new(None),
        }
    }

    /// Current state of the aggregate document.
    ///
    /// The first access with no backing record initialises the default
    /// document and persists it. An unreadable or undecodable backing record
    /// is an error - the default is never substituted once a record exists.
    pub async fn read(&self) -> Result<T> {
        let mut guard = self.doc.lock().await;
        let doc = self.load_into(&mut guard).await?;
        Ok(doc.clone())
    }

    /// Replace the aggregate document wholesale.
    pub async fn write(&self, doc: T) -> Result<()> {
        let mut guard = self.doc.lock().await;
        self.persist(&doc).await?;
        *guard = Some(doc);
        Ok(())
    }

    /// Read-modify-write as one logically atomic step.
    ///
    /// The closure mutates a working copy; the result is persisted and only
    /// then installed as the cached state, so a failed persist leaves no
    /// partial mutation behind. The document lock is held for the whole step.
    pub async fn update<R, F>(&self, apply: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let mut guard = self.doc.lock().await;
        let current = self.load_into(&mut guard).await?;
        let mut next = current.clone();
        let out = apply(&mut next);
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(out)
    }

    async fn load_into<'a>(&self, slot: &'a mut Option<T>) -> Result<&'a mut T> {
        if slot.is_none() {
            let doc = match self.backend.load().await? {
                Some(text) => serde_json::from_str(&text).map_err(|e| {
                    CoreError::StorageCorruption(self.backend.describe(), e.to_string())
                })?,
                None => {
                    let doc = T::default();
                    self.persist(&doc).await?;
                    doc
                }
            };
            *slot = Some(doc);
        }

        match slot {
            Some(doc) => Ok(doc),
            None => Err(CoreError::ConcurrencyViolation(format!(
                "document slot for '{}' empty after load",
                self.backend.describe()
            ))),
        }
    }

    async fn persist(&self, doc: &T) -> Result<()> {
        let payload = serde_json::to_string_pretty(doc)
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        self.backend.store(&payload).await
    }
}
