//! Folds the flat record stream into base packages with nested sub-packages.

use crate::cache::{IconResolver, OwnerResolver};
use crate::model::{PackageEntry, RawPackageRecord, SubPackageEntry, DEFAULT_ICON};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Which record wins when two records compete for the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    FirstSeen,
    LastSeen,
}

impl TieBreak {
    /// Whether an incoming record should take a slot that may already be
    /// filled.
    pub fn replaces(self, occupied: bool) -> bool {
        match self {
            Self::FirstSeen => !occupied,
            Self::LastSeen => true,
        }
    }
}

/// Binary records repeating an already seen name are architecture variants
/// of the same package; the first one is kept.
pub const BINARY_DUPLICATE_POLICY: TieBreak = TieBreak::FirstSeen;

/// One source record is expected per base package; if several appear the
/// last one is kept.
pub const SOURCE_RECORD_POLICY: TieBreak = TieBreak::LastSeen;

/// Result of one aggregation pass, keyed by base package name.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub entries: BTreeMap<String, PackageEntry>,
    pub records_seen: usize,
    pub skipped: usize,
    pub duplicates: usize,
}

impl Aggregation {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sub_package_count(&self) -> usize {
        self.entries.values().map(|e| e.sub_pkgs.len()).sum()
    }

    pub fn into_entries(self) -> impl Iterator<Item = PackageEntry> {
        self.entries.into_values()
    }
}

pub struct Aggregator<'a> {
    owners: &'a OwnerResolver,
    icons: Option<&'a IconResolver>,
    default_icon: String,
}

impl<'a> Aggregator<'a> {
    pub fn new(owners: &'a OwnerResolver) -> Self {
        Self {
            owners,
            icons: None,
            default_icon: DEFAULT_ICON.to_string(),
        }
    }

    /// Lets theme packages pre-warm the icon resolver as they stream past.
    pub fn with_icons(mut self, icons: &'a IconResolver) -> Self {
        self.icons = Some(icons);
        self
    }

    pub fn with_default_icon(mut self, icon: impl Into<String>) -> Self {
        self.default_icon = icon.into();
        self
    }

    /// Single pass over `records`.
    ///
    /// Source records only set the entry's source archive. Binary records
    /// whose name equals their base name fill the entry's main fields (and
    /// trigger the maintainer lookup); every other binary record becomes a
    /// sub-package. Malformed records are skipped.
    pub async fn aggregate<I>(&self, records: I) -> Aggregation
    where
        I: IntoIterator<Item = RawPackageRecord>,
    {
        let mut result = Aggregation::default();
        let mut seen_names: HashSet<String> = HashSet::new();

        for record in records {
            result.records_seen += 1;

            if let Err(reason) = record.validate() {
                warn!(record = result.records_seen, %reason, "Skipping malformed package record");
                result.skipped += 1;
                continue;
            }

            debug!(
                record = result.records_seen,
                package = %record.name,
                "Pre-processing package"
            );

            if let Some(icons) = self.icons {
                icons.check_pkg(&record);
            }

            let entry = result
                .entries
                .entry(record.base_name.clone())
                .or_insert_with(|| PackageEntry::new(record.base_name.clone(), self.default_icon.clone()));

            if record.is_source() {
                if SOURCE_RECORD_POLICY.replaces(entry.source_archive.is_some()) {
                    entry.source_archive = record.package_archive();
                }
                continue;
            }

            let repeated = !seen_names.insert(record.name.clone());
            if repeated {
                result.duplicates += 1;
                if !BINARY_DUPLICATE_POLICY.replaces(true) {
                    debug!(package = %record.name, "Ignoring duplicate package record");
                    continue;
                }
            }

            if record.name == record.base_name {
                entry.summary = record.summary.clone();
                entry.description = record.description.clone();
                entry.archive = record.package_archive();
                entry.devel_owner = self.owners.resolve_owner(&record.name).await;
            } else {
                let sub = SubPackageEntry {
                    archive: record.package_archive(),
                    name: record.name,
                    summary: record.summary,
                    description: record.description,
                    icon: self.default_icon.clone(),
                };
                match entry.sub_pkgs.iter_mut().find(|s| s.name == sub.name) {
                    Some(existing) => *existing = sub,
                    None => entry.sub_pkgs.push(sub),
                }
            }
        }

        info!(
            records = result.records_seen,
            packages = result.entries.len(),
            sub_packages = result.sub_package_count(),
            skipped = result.skipped,
            duplicates = result.duplicates,
            "Aggregated package records"
        );

        result
    }
}
