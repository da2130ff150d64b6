//! Indexing pipeline orchestrator.
//!
//! [`IndexPipeline`] drives one run over a repository:
//! 1. **Fetch**: read raw records from the [`RepositoryProvider`] under a timeout
//! 2. **Aggregate**: fold records into base packages (theme packages pre-warm
//!    the icon resolver on the way)
//! 3. **Enrich + project**: per entry, on the [`EnrichExecutor`]
//! 4. **Submit**: hand each document to the [`IndexSink`]
//!
//! Per-entry failures are logged and counted; only setup failures, a
//! repository that cannot be read and a sink that rejects a document abort
//! the run. The icon resolver is closed exactly once per run on every path.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backends::{
    JsonOwnerDirectory, JsonRepository, JsonlIndexSink, NullOwnerDirectory, TarArchiveAccess,
};
use crate::cache::{IconResolver, OwnerResolver};
use crate::config::IndexerConfig;
use crate::executor::EnrichExecutor;
use crate::index::aggregate::Aggregator;
use crate::index::enrich::Enricher;
use crate::model::DEFAULT_ICON;
use crate::traits::{
    ArchiveAccess, IndexSink, OwnerDirectory, RepositoryError, RepositoryProvider, SinkError,
};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Outcome of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    /// Indexed units: one per base package plus one per sub-package.
    pub documents: usize,
    /// Documents submitted to the sink.
    pub packages: usize,
    pub sub_packages: usize,
    /// Records read from the repository.
    pub records: usize,
    /// Malformed records dropped during aggregation.
    pub skipped: usize,
    /// Entries that could not be enriched or projected.
    pub failed: usize,
    pub icons_generated: usize,
    pub duration_ms: u64,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' timed out after {timeout_secs}s")]
    StageTimeout { stage: String, timeout_secs: u64 },

    #[error("Repository '{provider}' unavailable: {source}")]
    Repository {
        provider: String,
        source: RepositoryError,
    },

    /// The index could not be created.
    #[error("Index setup failed: {0}")]
    Setup(SinkError),

    #[error("Index sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Worker task failed: {0}")]
    Task(String),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// One indexing run over a repository.
///
/// Collaborators are injected, so two pipelines never share caches.
///
/// ```ignore
/// let pipeline = IndexPipeline::new(repository, owners, icons, access, sink)
///     .with_timeout(Duration::from_secs(300))
///     .with_concurrency(4);
/// let report = pipeline.run().await?;
/// println!("Indexed {} packages", report.documents);
/// ```
pub struct IndexPipeline {
    repository: Arc<dyn RepositoryProvider>,
    owners: Arc<OwnerResolver>,
    icons: Arc<IconResolver>,
    enricher: Arc<Enricher>,
    sink: Arc<dyn IndexSink>,
    default_icon: String,

    /// Timeout for the repository fetch (default: 5 minutes)
    fetch_timeout: Duration,

    /// Entries enriched concurrently (default: 1)
    concurrency: usize,
}

impl IndexPipeline {
    pub fn new(
        repository: Arc<dyn RepositoryProvider>,
        owners: Arc<OwnerResolver>,
        icons: Arc<IconResolver>,
        access: Arc<dyn ArchiveAccess>,
        sink: Arc<dyn IndexSink>,
    ) -> Self {
        let enricher = Arc::new(Enricher::new(access, icons.clone()));
        Self {
            repository,
            owners,
            icons,
            enricher,
            sink,
            default_icon: DEFAULT_ICON.to_string(),
            fetch_timeout: Duration::from_secs(300),
            concurrency: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_default_icon(mut self, icon: impl Into<String>) -> Self {
        self.default_icon = icon.into();
        self
    }

    /// Runs the pipeline once and reports what was indexed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the repository cannot be read (or the
    /// read times out), or if the sink rejects a document.
    pub async fn run(&self) -> Result<IndexReport, PipelineError> {
        let result = self.index().await;
        self.icons.close();
        result
    }

    async fn index(&self) -> Result<IndexReport, PipelineError> {
        let start = Instant::now();
        let mut report = IndexReport::default();

        // ====================================================================
        // Stage 1: Fetch
        // ====================================================================

        info!(provider = self.repository.name(), "Fetching package records");
        let records = timeout(self.fetch_timeout, self.repository.fetch_records())
            .await
            .map_err(|_| PipelineError::StageTimeout {
                stage: "fetch".to_string(),
                timeout_secs: self.fetch_timeout.as_secs(),
            })?
            .map_err(|source| PipelineError::Repository {
                provider: self.repository.name().to_string(),
                source,
            })?;
        info!(records = records.len(), "Package records fetched");

        // ====================================================================
        // Stage 2: Aggregate
        // ====================================================================

        let aggregation = Aggregator::new(&self.owners)
            .with_icons(&self.icons)
            .with_default_icon(self.default_icon.clone())
            .aggregate(records)
            .await;
        report.records = aggregation.records_seen;
        report.skipped = aggregation.skipped;
        let total = aggregation.len();

        // ====================================================================
        // Stage 3: Enrich, project and submit
        // ====================================================================
        //
        // Entries go to the executor as independent tasks; documents come
        // back in completion order and are added from this task only.

        let executor = EnrichExecutor::new(self.enricher.clone(), self.concurrency);
        let mut tasks = JoinSet::new();
        for entry in aggregation.into_entries() {
            let executor = executor.clone();
            let name = entry.name.clone();
            let units = entry.unit_count();
            tasks.spawn(async move { (name, units, executor.execute(entry).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (name, units, outcome) = joined.map_err(|e| PipelineError::Task(e.to_string()))?;
            match outcome {
                Ok(document) => {
                    self.sink.add(document).await?;
                    report.packages += 1;
                    report.sub_packages += units - 1;
                    report.documents += units;
                    debug!(package = %name, done = report.packages + report.failed, total, "Package indexed");
                }
                Err(e) => {
                    warn!(package = %name, error = %e, "Skipping package");
                    report.failed += 1;
                }
            }
        }

        report.icons_generated = self.icons.generated_count();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            documents = report.documents,
            packages = report.packages,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Indexing completed"
        );
        Ok(report)
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Builds the file-backed collaborators described by `config`, runs the
/// pipeline once into the configured index and commits it.
///
/// # Errors
///
/// Returns [`PipelineError::Setup`] if the index location is not writable,
/// otherwise whatever [`IndexPipeline::run`] or the commit returns.
pub async fn index_repository(config: &IndexerConfig) -> Result<IndexReport, PipelineError> {
    let sink = Arc::new(JsonlIndexSink::create(&config.index.path).map_err(PipelineError::Setup)?);

    let access: Arc<dyn ArchiveAccess> = match &config.repository.archive_root {
        Some(root) => Arc::new(TarArchiveAccess::with_root(root)),
        None => Arc::new(TarArchiveAccess::new()),
    };

    let mut repository =
        JsonRepository::new(&config.repository.path).with_arches(config.repository.arches.clone());
    if let Some(root) = &config.repository.archive_root {
        repository = repository.with_archive_root(root);
    }

    let owners = match &config.owners {
        Some(owners) => {
            let directory: Arc<dyn OwnerDirectory> =
                Arc::new(JsonOwnerDirectory::new(&owners.path, owners.collection.clone()));
            OwnerResolver::new(directory).with_retry(owners.retry_policy())
        }
        None => OwnerResolver::new(Arc::new(NullOwnerDirectory)),
    };

    let icons = IconResolver::new(
        config.icons.themes.clone(),
        config.icons.output_dir.clone(),
        access.clone(),
    );

    let pipeline = IndexPipeline::new(
        Arc::new(repository),
        Arc::new(owners),
        Arc::new(icons),
        access,
        sink.clone(),
    )
    .with_timeout(config.pipeline.fetch_timeout())
    .with_concurrency(config.pipeline.concurrency)
    .with_default_icon(config.icons.default_icon.clone());

    let report = pipeline.run().await?;
    sink.commit().await?;
    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================
