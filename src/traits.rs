//! Seams to the collaborators the indexer consumes or produces to.
//!
//! Everything behind these traits is replaceable: the binary wires the
//! file-backed implementations from [`crate::backends`], tests wire mocks.

use crate::index::document::Document;
use crate::model::RawPackageRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key/value attributes produced by a [`MetadataParser`].
pub type Attributes = HashMap<String, String>;

/// Package name to maintainer identity.
pub type OwnerMap = HashMap<String, String>;

// ============================================================================
// Parsers
// ============================================================================

/// Recoverable failure while parsing a metadata file.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse content: {0}")]
    InvalidContent(String),
    #[error("Content is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub trait MetadataParser: Send + Sync {
    /// Returns the metadata format this parser handles (e.g., "desktop", "spec").
    fn format_id(&self) -> &str;

    /// Parses raw file content into attributes.
    fn parse(&self, content: &[u8]) -> Result<Attributes, ParseError>;
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Repository metadata at '{}' is unavailable: {source}", .location.display())]
    Unavailable {
        location: PathBuf,
        source: std::io::Error,
    },
    #[error("Repository metadata is malformed: {0}")]
    Malformed(String),
}

/// Supplies the flat stream of package records.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_records(&self) -> Result<Vec<RawPackageRecord>, RepositoryError>;
}

// ============================================================================
// Owner directory
// ============================================================================

#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Worth retrying (service unreachable, timed out).
    #[error("Owner directory temporarily unavailable: {0}")]
    Transient(String),
    /// Retrying will not help.
    #[error("Owner directory unavailable: {0}")]
    Permanent(String),
}

impl DirectoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Bulk maintainer directory. Fetched once per run.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn fetch_owners(&self) -> Result<OwnerMap, DirectoryError>;
}

// ============================================================================
// Archives
// ============================================================================

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive '{}' not found", .0.display())]
    NotFound(PathBuf),
    #[error("Corrupted archive '{}': {reason}", .location.display())]
    Corrupted { location: PathBuf, reason: String },
    #[error("I/O error reading archive: {0}")]
    Io(#[from] std::io::Error),
}

/// A single extracted archive member. Paths are absolute (`/usr/bin/foo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub path: String,
    pub data: Vec<u8>,
}

/// Opens package payloads.
pub trait ArchiveAccess: Send + Sync {
    fn open(&self, location: &Path) -> Result<Box<dyn ArchiveReader>, ArchiveError>;
}

/// An open package payload.
pub trait ArchiveReader: Send {
    /// Extracts every regular member whose path satisfies `wanted`.
    fn extract(
        &mut self,
        wanted: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<ArchiveMember>, ArchiveError>;

    /// Releases the underlying handle. Called at most once.
    fn close(&mut self) {}
}

// ============================================================================
// Index sink
// ============================================================================

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Index location '{}' is not writable: {source}", .location.display())]
    Unwritable {
        location: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error writing index: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Index already committed")]
    Committed,
}

/// Destination of projected documents. Flushing and durability belong to
/// the sink; the pipeline only ever calls [`IndexSink::add`].
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn add(&self, document: Document) -> Result<(), SinkError>;

    async fn commit(&self) -> Result<(), SinkError>;
}
