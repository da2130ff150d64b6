//! Concrete collaborators for the indexing pipeline.
//!
//! - `archive_tar` - package payloads as `.tar` / `.tar.gz` files
//! - `json` - repository dump and maintainer directory read from JSON files
//! - `sink` - JSON-lines index on disk, plus an in-memory sink

pub mod archive_tar;
pub mod json;
pub mod sink;

pub use archive_tar::TarArchiveAccess;
pub use json::{JsonOwnerDirectory, JsonRepository, NullOwnerDirectory};
pub use sink::{JsonlIndexSink, MemoryIndexSink};
