//! Lazily extracted view over one package payload.
//!
//! # RAII release
//!
//! `ArchiveFileCache` implements [`Drop`] so the underlying reader is closed
//! on every exit path, including early returns after a parse failure.
//! [`ArchiveFileCache::close`] may also be called explicitly; the reader is
//! closed exactly once either way. The type intentionally does not implement
//! `Clone`: one cache belongs to one archive reference.

use crate::model::PackageArchive;
use crate::traits::{ArchiveAccess, ArchiveReader};
use globset::Glob;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    Unopened,
    Open,
    Failed,
    Closed,
}

pub struct ArchiveFileCache {
    archive: PackageArchive,
    access: Arc<dyn ArchiveAccess>,
    reader: Option<Box<dyn ArchiveReader>>,
    state: CacheState,
    /// Members extracted so far, keyed by absolute path.
    members: HashMap<String, Vec<u8>>,
    /// Filters (or exact paths) whose extraction pass already ran.
    scanned: HashSet<String>,
}

impl ArchiveFileCache {
    pub fn new(archive: PackageArchive, access: Arc<dyn ArchiveAccess>) -> Self {
        Self {
            archive,
            access,
            reader: None,
            state: CacheState::Unopened,
            members: HashMap::new(),
            scanned: HashSet::new(),
        }
    }

    /// Creates the cache and opens it immediately.
    pub fn scoped(archive: PackageArchive, access: Arc<dyn ArchiveAccess>) -> Self {
        let mut cache = Self::new(archive, access);
        cache.open();
        cache
    }

    /// Manifest advertised by the repository for this payload.
    pub fn files(&self) -> &[String] {
        &self.archive.files
    }

    pub fn is_open(&self) -> bool {
        self.state == CacheState::Open
    }

    /// Acquires the archive. Returns whether it is usable; calling it again
    /// after the first attempt does nothing.
    pub fn open(&mut self) -> bool {
        if self.state == CacheState::Unopened {
            match self.access.open(&self.archive.location) {
                Ok(reader) => {
                    self.reader = Some(reader);
                    self.state = CacheState::Open;
                }
                Err(e) => {
                    warn!(archive = %self.archive.location.display(), error = %e, "Could not open archive");
                    self.state = CacheState::Failed;
                }
            }
        }
        self.state == CacheState::Open
    }

    /// Extracts one member.
    ///
    /// With a `decompress_filter` (a wildcard such as `*.desktop`), the first
    /// request extracts every member matching the filter in a single pass so
    /// later requests for siblings are served from memory; a `path` the
    /// filter does not match is never extracted. Returns `None` when the
    /// member is absent, filtered out, or unreadable.
    pub fn open_file(&mut self, path: &str, decompress_filter: Option<&str>) -> Option<Vec<u8>> {
        if let Some(data) = self.members.get(path) {
            return Some(data.clone());
        }
        if !self.open() {
            return None;
        }

        let matcher = match decompress_filter {
            Some(pattern) => match Glob::new(pattern) {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(e) => {
                    warn!(filter = pattern, error = %e, "Invalid decompress filter");
                    return None;
                }
            },
            None => None,
        };

        if let Some(m) = &matcher {
            if !m.is_match(path) {
                debug!(path, filter = decompress_filter, "Member excluded by decompress filter");
                return None;
            }
        }

        let scan_key = decompress_filter.unwrap_or(path).to_string();
        if !self.scanned.insert(scan_key) {
            return None;
        }

        let reader = self.reader.as_mut()?;
        let extracted = match &matcher {
            Some(m) => reader.extract(&|p: &str| m.is_match(p)),
            None => reader.extract(&|p: &str| p == path),
        };

        match extracted {
            Ok(found) => {
                for member in found {
                    self.members.insert(member.path, member.data);
                }
            }
            Err(e) => {
                warn!(
                    archive = %self.archive.location.display(),
                    path,
                    error = %e,
                    "Failed to extract archive member"
                );
                return None;
            }
        }

        self.members.get(path).cloned()
    }

    /// Releases the reader and every extracted member.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        self.members.clear();
        self.scanned.clear();
        self.state = CacheState::Closed;
    }
}

impl Drop for ArchiveFileCache {
    fn drop(&mut self) {
        if self.reader.is_some() {
            debug!(archive = %self.archive.location.display(), "Closing archive on drop");
            self.close();
        }
    }
}
