use crate::filter::filter_search_string;
use crate::index::document::{project, Document, ProjectionError};
use crate::index::enrich::Enricher;
use crate::model::PackageEntry;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum EntryError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Runs enrichment and projection of single entries on the blocking pool,
/// at most `concurrency_limit` at a time. Each worker holds at most one
/// archive open.
#[derive(Clone)]
pub struct EnrichExecutor {
    semaphore: Arc<Semaphore>,
    enricher: Arc<Enricher>,
}

impl EnrichExecutor {
    pub fn new(enricher: Arc<Enricher>, concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            enricher,
        }
    }

    #[instrument(skip(self, entry), fields(package = %entry.name))]
    pub async fn execute(&self, entry: PackageEntry) -> Result<Document, EntryError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EntryError::Worker(format!("Semaphore error: {}", e)))?;

        let indexed_as = filter_search_string(&entry.name);
        if indexed_as == entry.name {
            info!("Indexing {}", entry.name);
        } else {
            info!("Indexing {} as {}", entry.name, indexed_as);
        }

        let enricher = self.enricher.clone();
        let document = tokio::task::spawn_blocking(move || project(enricher.enrich(entry)))
            .await
            .map_err(|e| EntryError::Worker(format!("Task join error: {}", e)))??;

        Ok(document)
    }
}
