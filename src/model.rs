use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Icon used until a desktop entry yields a resolvable one.
pub const DEFAULT_ICON: &str = "package_128x128";

/// Which repository a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    #[default]
    Binary,
    Source,
}

/// A package payload plus the file manifest the repository advertises for it.
///
/// Only lives while an entry is being enriched; never serialised into a
/// stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArchive {
    pub location: PathBuf,
    pub files: Vec<String>,
}

/// One row from the repository metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPackageRecord {
    pub name: String,
    pub base_name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub origin: RecordOrigin,
    /// Location of the package payload (absolute, or relative to the
    /// repository's archive root).
    #[serde(default)]
    pub archive: Option<PathBuf>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl RawPackageRecord {
    pub fn is_source(&self) -> bool {
        self.origin == RecordOrigin::Source
    }

    /// Returns the record's payload together with its manifest, if it has one.
    pub fn package_archive(&self) -> Option<PackageArchive> {
        self.archive.as_ref().map(|location| PackageArchive {
            location: location.clone(),
            files: self.files.clone(),
        })
    }

    /// Rejects records missing the fields aggregation keys on.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("record has no name".to_string());
        }
        if self.base_name.trim().is_empty() {
            return Err(format!("record '{}' has no base package name", self.name));
        }
        Ok(())
    }
}

/// A sub-package embedded in its base package's document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPackageEntry {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub icon: String,
    #[serde(skip)]
    pub archive: Option<PackageArchive>,
}

/// Aggregation root: everything known about one base package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub devel_owner: String,
    pub icon: String,
    #[serde(default)]
    pub upstream_url: Option<String>,
    pub sub_pkgs: Vec<SubPackageEntry>,
    #[serde(skip)]
    pub archive: Option<PackageArchive>,
    #[serde(skip)]
    pub source_archive: Option<PackageArchive>,
}

impl PackageEntry {
    pub fn new(base_name: impl Into<String>, default_icon: impl Into<String>) -> Self {
        Self {
            name: base_name.into(),
            summary: String::new(),
            description: String::new(),
            devel_owner: String::new(),
            icon: default_icon.into(),
            upstream_url: None,
            sub_pkgs: Vec::new(),
            archive: None,
            source_archive: None,
        }
    }

    /// Drops every archive reference held by the entry and its sub-packages.
    pub fn strip_archives(&mut self) {
        self.archive = None;
        self.source_archive = None;
        for sub in &mut self.sub_pkgs {
            sub.archive = None;
        }
    }

    /// Number of logical units this entry accounts for: the base package
    /// plus each sub-package.
    pub fn unit_count(&self) -> usize {
        1 + self.sub_pkgs.len()
    }
}
