//! File-backed repository dump and owner directory.

use crate::model::RawPackageRecord;
use crate::traits::{DirectoryError, OwnerDirectory, OwnerMap, RepositoryError, RepositoryProvider};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Reads package records from a JSON array.
///
/// Rows that do not deserialize are skipped with a warning. Relative archive
/// locations are resolved against `archive_root`; records whose `arch` is
/// not listed in `arches` are dropped (an empty list accepts everything).
pub struct JsonRepository {
    path: PathBuf,
    archive_root: Option<PathBuf>,
    arches: Vec<String>,
}

impl JsonRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive_root: None,
            arches: Vec::new(),
        }
    }

    pub fn with_archive_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.archive_root = Some(root.into());
        self
    }

    pub fn with_arches(mut self, arches: Vec<String>) -> Self {
        self.arches = arches;
        self
    }

    fn accepts(&self, record: &RawPackageRecord) -> bool {
        match &record.arch {
            Some(arch) if !self.arches.is_empty() => self.arches.contains(arch),
            _ => true,
        }
    }
}

#[async_trait]
impl RepositoryProvider for JsonRepository {
    fn name(&self) -> &str {
        "json"
    }

    async fn fetch_records(&self) -> Result<Vec<RawPackageRecord>, RepositoryError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| RepositoryError::Unavailable {
                location: self.path.clone(),
                source,
            })?;
        let rows: Vec<serde_json::Value> =
            serde_json::from_slice(&bytes).map_err(|e| RepositoryError::Malformed(e.to_string()))?;

        let total = rows.len();
        let mut records = Vec::with_capacity(total);
        for (idx, row) in rows.into_iter().enumerate() {
            let mut record: RawPackageRecord = match serde_json::from_value(row) {
                Ok(record) => record,
                Err(e) => {
                    warn!(row = idx, error = %e, "Skipping malformed repository row");
                    continue;
                }
            };

            if !self.accepts(&record) {
                debug!(package = %record.name, arch = ?record.arch, "Skipping unselected architecture");
                continue;
            }

            if let (Some(root), Some(location)) = (&self.archive_root, &record.archive) {
                if location.is_relative() {
                    record.archive = Some(root.join(location));
                }
            }
            records.push(record);
        }

        info!(
            path = %self.path.display(),
            rows = total,
            records = records.len(),
            "Loaded repository metadata"
        );
        Ok(records)
    }
}

/// Maintainer directory stored as a package-database ACL dump:
/// `{ "<collection>": { "<package>": { "owner": "<id>" } } }`.
pub struct JsonOwnerDirectory {
    path: PathBuf,
    collection: String,
}

impl JsonOwnerDirectory {
    pub fn new(path: impl Into<PathBuf>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl OwnerDirectory for JsonOwnerDirectory {
    async fn fetch_owners(&self) -> Result<OwnerMap, DirectoryError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            let message = format!("{}: {e}", self.path.display());
            match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => DirectoryError::Permanent(message),
                _ => DirectoryError::Transient(message),
            }
        })?;
        let document: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| DirectoryError::Permanent(e.to_string()))?;

        let Some(packages) = document.get(&self.collection).and_then(|c| c.as_object()) else {
            warn!(collection = %self.collection, "Owner directory has no data for collection");
            return Ok(OwnerMap::new());
        };

        Ok(packages
            .iter()
            .filter_map(|(package, acl)| {
                let owner = acl.get("owner")?.as_str()?;
                Some((package.clone(), owner.to_string()))
            })
            .collect())
    }
}

/// Directory with no maintainers, for runs without owner data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOwnerDirectory;

#[async_trait]
impl OwnerDirectory for NullOwnerDirectory {
    async fn fetch_owners(&self) -> Result<OwnerMap, DirectoryError> {
        Ok(OwnerMap::new())
    }
}
