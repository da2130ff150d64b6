//! Aggregation, enrichment, projection and the pipeline driving them.

pub mod aggregate;
pub mod document;
pub mod enrich;
pub mod pipeline;

pub use aggregate::{Aggregation, Aggregator, TieBreak};
pub use document::{index_schema, project, Document, Field, FieldAction, FieldSchema, ProjectionError};
pub use enrich::{EnrichedEntry, Enricher, IndexFacets};
pub use pipeline::{index_repository, IndexPipeline, IndexReport, PipelineError};
