//! Index sinks: a JSON-lines index on disk and an in-memory one for tests.

use crate::index::document::{index_schema, Document, Field};
use crate::traits::{IndexSink, SinkError};
use async_trait::async_trait;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const SCHEMA_FILE: &str = "schema.json";
pub const DOCUMENTS_FILE: &str = "documents.jsonl";
/// Documents of a run in progress; renamed over `DOCUMENTS_FILE` on commit.
pub const STAGED_DOCUMENTS_FILE: &str = "documents.jsonl.staged";

#[derive(Serialize)]
struct StoredDocument<'a> {
    id: &'a str,
    fields: &'a [Field],
    data: serde_json::Value,
}

/// Writes the field schema to `schema.json` and one document per line to
/// `documents.jsonl` inside the index directory.
///
/// Documents are written to a staging file first. A previous index in the
/// directory stays readable until [`IndexSink::commit`] swaps the staged file
/// in; a sink dropped without committing removes its staging file.
pub struct JsonlIndexSink {
    location: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    added: AtomicUsize,
}

impl JsonlIndexSink {
    /// Creates the index directory and its field schema.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unwritable`] if the directory or its files cannot
    /// be created.
    pub fn create(location: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let location = location.into();
        let unwritable = |source: std::io::Error| SinkError::Unwritable {
            location: location.clone(),
            source,
        };

        std::fs::create_dir_all(&location).map_err(unwritable)?;
        let schema = serde_json::to_vec_pretty(&index_schema())?;
        std::fs::write(location.join(SCHEMA_FILE), schema).map_err(unwritable)?;
        let file = File::create(location.join(STAGED_DOCUMENTS_FILE)).map_err(unwritable)?;

        info!(path = %location.display(), "Staging index");
        Ok(Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
            location,
            added: AtomicUsize::new(0),
        })
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexSink for JsonlIndexSink {
    async fn add(&self, document: Document) -> Result<(), SinkError> {
        let stored = StoredDocument {
            id: &document.id,
            fields: &document.fields,
            data: serde_json::from_slice(&document.payload)?,
        };
        let line = serde_json::to_vec(&stored)?;

        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let writer = guard.as_mut().ok_or(SinkError::Committed)?;
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        self.added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<(), SinkError> {
        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let mut writer = guard.take().ok_or(SinkError::Committed)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        std::fs::rename(
            self.location.join(STAGED_DOCUMENTS_FILE),
            self.location.join(DOCUMENTS_FILE),
        )?;
        info!(path = %self.location.display(), documents = self.added(), "Committed index");
        Ok(())
    }
}

impl Drop for JsonlIndexSink {
    fn drop(&mut self) {
        let staged = self.writer.get_mut().map(|w| w.take()).unwrap_or_else(|p| p.into_inner().take());
        if staged.is_some() {
            drop(staged);
            let path = self.location.join(STAGED_DOCUMENTS_FILE);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to discard uncommitted index");
            } else {
                debug!(path = %path.display(), "Discarded uncommitted index");
            }
        }
    }
}

/// Keeps documents in memory.
#[derive(Default)]
pub struct MemoryIndexSink {
    documents: RwLock<Vec<Document>>,
    committed: AtomicBool,
}

impl MemoryIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexSink for MemoryIndexSink {
    async fn add(&self, document: Document) -> Result<(), SinkError> {
        if self.is_committed() {
            return Err(SinkError::Committed);
        }
        self.documents
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(document);
        Ok(())
    }

    async fn commit(&self) -> Result<(), SinkError> {
        self.committed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
