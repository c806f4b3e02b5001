//! A thread-safe in-memory storage for the currently active document. [`DocumentStore`]
//! provides concurrent access for readers (experiment evaluation) and writers (the manifest
//! poller).
use std::sync::{Arc, RwLock};

use crate::Document;

/// `DocumentStore` provides a thread-safe (`Sync`) storage for the active experiment document
/// that allows concurrent access for readers and writers.
///
/// `Document` itself is always immutable and can only be replaced completely. Readers take a
/// snapshot reference once per call and operate against it without further synchronization;
/// no lock is held across evaluation.
#[derive(Default)]
pub struct DocumentStore {
    document: RwLock<Option<Arc<Document>>>,
}

impl DocumentStore {
    /// Create a new empty document store.
    pub fn new() -> Self {
        DocumentStore::default()
    }

    /// Get the currently-active document. Returns None if no manifest has been loaded yet.
    pub fn get_document(&self) -> Option<Arc<Document>> {
        // self.document.read() should always return Ok(). Err() is possible only if the lock
        // is poisoned (writer panicked while holding the lock), which should never happen.
        let document = self
            .document
            .read()
            .expect("thread holding document lock should not panic");

        document.clone()
    }

    /// Set a new document.
    pub fn set_document(&self, document: Arc<Document>) {
        let mut document_slot = self
            .document
            .write()
            .expect("thread holding document lock should not panic");

        *document_slot = Some(document);
    }
}
