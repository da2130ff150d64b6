//! Folds package contents (desktop entries, executables, spec files) into
//! aggregated entries.

use crate::cache::{ArchiveFileCache, IconResolver};
use crate::filter::{exact_match, filter_search_string};
use crate::model::{PackageArchive, PackageEntry};
use crate::parsers::{DesktopEntryParser, SpecFileParser};
use crate::traits::{ArchiveAccess, MetadataParser};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DESKTOP_SUFFIX: &str = ".desktop";
/// Decompression filter used when extracting desktop entries.
pub const DESKTOP_FILTER: &str = "*.desktop";
pub const BIN_DIR: &str = "/usr/bin/";
pub const SPEC_SUFFIX: &str = ".spec";

/// Index-only facts harvested from package contents. Never stored in the
/// document payload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexFacets {
    /// Filtered category tokens, each followed by its exact-match shadow.
    pub category_tags: Vec<String>,
    /// Exact-match tokens of executables under [`BIN_DIR`].
    pub commands: Vec<String>,
    /// Whether at least one desktop entry was indexed.
    pub desktop: bool,
}

impl IndexFacets {
    fn add_category(&mut self, token: String) {
        let shadow = exact_match(&token);
        push_unique(&mut self.category_tags, token);
        push_unique(&mut self.category_tags, shadow);
    }

    fn add_command(&mut self, token: &str) {
        push_unique(&mut self.commands, exact_match(token));
    }
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// An entry after enrichment, with every archive reference released.
#[derive(Debug, Clone)]
pub struct EnrichedEntry {
    pub entry: PackageEntry,
    pub facets: IndexFacets,
}

pub struct Enricher {
    access: Arc<dyn ArchiveAccess>,
    icons: Arc<IconResolver>,
    desktop_parser: Arc<dyn MetadataParser>,
    spec_parser: Arc<dyn MetadataParser>,
}

impl Enricher {
    pub fn new(access: Arc<dyn ArchiveAccess>, icons: Arc<IconResolver>) -> Self {
        Self {
            access,
            icons,
            desktop_parser: Arc::new(DesktopEntryParser),
            spec_parser: Arc::new(SpecFileParser),
        }
    }

    pub fn with_parsers(
        mut self,
        desktop_parser: Arc<dyn MetadataParser>,
        spec_parser: Arc<dyn MetadataParser>,
    ) -> Self {
        self.desktop_parser = desktop_parser;
        self.spec_parser = spec_parser;
        self
    }

    /// Enriches `entry` and its sub-packages.
    ///
    /// Every archive is opened at most once and closed before this returns,
    /// whatever happens while reading it. Nothing here is fatal: unreadable
    /// members and malformed metadata fall back to defaults.
    pub fn enrich(&self, mut entry: PackageEntry) -> EnrichedEntry {
        let mut facets = IndexFacets::default();

        if let Some(source) = entry.source_archive.take() {
            entry.upstream_url = self.index_spec(&entry.name, source);
        }

        if let Some(archive) = entry.archive.take() {
            if let Some(icon) = self.index_files(&entry.name, archive, &mut facets) {
                entry.icon = icon;
            }
        }

        for sub in &mut entry.sub_pkgs {
            if let Some(archive) = sub.archive.take() {
                if let Some(icon) = self.index_files(&sub.name, archive, &mut facets) {
                    sub.icon = icon;
                }
            }
        }

        EnrichedEntry { entry, facets }
    }

    /// Walks the manifest of one binary payload. Returns the last icon that
    /// could be resolved from its desktop entries.
    fn index_files(
        &self,
        package: &str,
        archive: PackageArchive,
        facets: &mut IndexFacets,
    ) -> Option<String> {
        let mut cache = ArchiveFileCache::new(archive, self.access.clone());
        let files = cache.files().to_vec();
        let mut icon = None;

        for path in &files {
            if path.ends_with(DESKTOP_SUFFIX) {
                debug!(package, file = %basename(path), "Indexing desktop file");
                match cache.open_file(path, Some(DESKTOP_FILTER)) {
                    Some(data) => {
                        let found = self.index_desktop_file(package, path, &data, &mut cache, facets);
                        if found.is_some() {
                            icon = found;
                        }
                    }
                    None => warn!(package, file = %path, "Could not open desktop file"),
                }
            }

            if path.starts_with(BIN_DIR) {
                let exe = filter_search_string(basename(path));
                if !exe.is_empty() {
                    debug!(package, exe = %exe, "Indexing executable");
                    facets.add_command(&exe);
                }
            }
        }

        cache.close();
        icon
    }

    fn index_desktop_file(
        &self,
        package: &str,
        path: &str,
        data: &[u8],
        cache: &mut ArchiveFileCache,
        facets: &mut IndexFacets,
    ) -> Option<String> {
        // Shipping a desktop entry is enough for the tag, parsed or not
        facets.desktop = true;
        let attrs = match self.desktop_parser.parse(data) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(
                    package,
                    file = %path,
                    parser = self.desktop_parser.format_id(),
                    error = %e,
                    "Skipping malformed desktop file"
                );
                return None;
            }
        };

        let categories = attrs.get("Categories").map(String::as_str).unwrap_or_default();
        for category in categories.split(';') {
            let token = filter_search_string(category);
            if !token.is_empty() {
                facets.add_category(token);
            }
        }

        let icon = attrs.get("Icon").map(|i| i.trim()).filter(|i| !i.is_empty())?;
        info!(package, icon, "Resolving desktop icon");
        self.icons.generate_icon(icon, cache)
    }

    /// Reads the upstream URL from the source payload's spec file.
    ///
    /// `None` when there is no spec file or it cannot be extracted; an empty
    /// string when it exists but does not parse.
    fn index_spec(&self, package: &str, archive: PackageArchive) -> Option<String> {
        let Some(spec) = select_spec_member(package, &archive.files) else {
            debug!(package, "No spec file in source package");
            return None;
        };
        debug!(package, spec = %spec, "Reading spec file");

        let mut cache = ArchiveFileCache::new(archive, self.access.clone());
        let upstream_url = match cache.open_file(&spec, None) {
            Some(data) => match self.spec_parser.parse(&data) {
                Ok(attrs) => Some(attrs.get("url").cloned().unwrap_or_default()),
                Err(e) => {
                    warn!(
                        package,
                        spec = %spec,
                        parser = self.spec_parser.format_id(),
                        error = %e,
                        "Setting upstream_url to empty string"
                    );
                    Some(String::new())
                }
            },
            None => {
                warn!(package, spec = %spec, "Could not open spec file");
                None
            }
        };
        cache.close();

        upstream_url
    }
}

/// Picks the spec file of a source payload: the one named after the base
/// package if present, otherwise the lexicographically smallest `.spec`
/// path. Independent of manifest order.
pub fn select_spec_member(base_name: &str, files: &[String]) -> Option<String> {
    let preferred = format!("{base_name}{SPEC_SUFFIX}");
    let candidates = files.iter().filter(|f| f.ends_with(SPEC_SUFFIX));

    candidates
        .clone()
        .filter(|f| basename(f) == preferred)
        .min()
        .or_else(|| candidates.min())
        .cloned()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::archive::tests::MockArchives;
    use crate::model::{SubPackageEntry, DEFAULT_ICON};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    const GEDIT_DESKTOP: &str = "[Desktop Entry]\nName=gedit\nIcon=gedit\nCategories=Utility;Office;\n";
    const THEME_ICON: &str = "/usr/share/icons/hicolor/48x48/apps/gedit.png";

    fn archive(location: &str, files: &[&str]) -> Option<PackageArchive> {
        Some(PackageArchive {
            location: PathBuf::from(location),
            files: files.iter().map(|f| f.to_string()).collect(),
        })
    }

    fn enricher(access: Arc<MockArchives>, dir: &std::path::Path) -> Enricher {
        let icons = Arc::new(IconResolver::new(vec!["hicolor-icon-theme".into()], dir, access.clone()));
        icons.check_pkg(&crate::model::RawPackageRecord {
            name: "hicolor-icon-theme".into(),
            base_name: "hicolor-icon-theme".into(),
            summary: String::new(),
            description: String::new(),
            arch: None,
            origin: Default::default(),
            archive: Some(PathBuf::from("/repo/theme")),
            files: vec![THEME_ICON.to_string()],
        });
        Enricher::new(access, icons)
    }

    fn gedit_access() -> Arc<MockArchives> {
        Arc::new(
            MockArchives::default()
                .with("/repo/theme", &[(THEME_ICON, "png")])
                .with(
                    "/repo/gedit",
                    &[
                        ("/usr/share/applications/org.gnome.gedit.desktop", GEDIT_DESKTOP),
                        ("/usr/bin/gedit", "elf"),
                    ],
                )
                .with(
                    "/repo/gedit-src",
                    &[
                        ("/gedit.spec", "Name: gedit\nURL: https://wiki.gnome.org/Apps/Gedit\n"),
                        ("/aaa.spec", "Name: other\nURL: https://wrong.example\n"),
                    ],
                ),
        )
    }

    fn gedit_entry() -> PackageEntry {
        let mut entry = PackageEntry::new("gedit", DEFAULT_ICON);
        entry.archive = archive(
            "/repo/gedit",
            &["/usr/share/applications/org.gnome.gedit.desktop", "/usr/bin/gedit", "/usr/share/doc/gedit/README"],
        );
        entry.source_archive = archive("/repo/gedit-src", &["/aaa.spec", "/gedit.spec", "/gedit-3.0.tar.xz"]);
        entry
    }

    #[test]
    fn test_desktop_categories_icon_and_commands() {
        let dir = tempfile::tempdir().unwrap();
        let access = gedit_access();
        let enricher = enricher(access.clone(), dir.path());
        let enriched = enricher.enrich(gedit_entry());

        assert_eq!(
            enriched.facets.category_tags,
            vec!["utility", "EX__utility__EX", "office", "EX__office__EX"]
        );
        assert_eq!(enriched.facets.commands, vec!["EX__gedit__EX"]);
        assert!(enriched.facets.desktop);
        assert_eq!(enriched.entry.icon, "gedit");
        assert!(dir.path().join("gedit.png").exists());
        assert_eq!(
            enriched.entry.upstream_url.as_deref(),
            Some("https://wiki.gnome.org/Apps/Gedit")
        );
        assert!(enriched.entry.archive.is_none());
        assert!(enriched.entry.source_archive.is_none());
        // Only the theme payload stays open, until the icon cache closes
        assert_eq!(access.opens.load(Ordering::SeqCst), access.closes.load(Ordering::SeqCst) + 1);
        enricher.icons.close();
        assert_eq!(access.opens.load(Ordering::SeqCst), access.closes.load(Ordering::SeqCst));
    }

    #[test]
    fn test_null_archive_enriches_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(MockArchives::default());
        let enriched = enricher(access.clone(), dir.path()).enrich(PackageEntry::new("empty", DEFAULT_ICON));

        assert_eq!(enriched.entry.icon, DEFAULT_ICON);
        assert_eq!(enriched.entry.upstream_url.as_deref().unwrap_or_default(), "");
        assert!(enriched.facets.category_tags.is_empty());
        assert!(enriched.facets.commands.is_empty());
        assert!(!enriched.facets.desktop);
        assert_eq!(access.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_spec_sets_empty_url_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(
            MockArchives::default()
                .with("/repo/theme", &[(THEME_ICON, "png")])
                .with("/repo/gedit", &[("/usr/share/applications/org.gnome.gedit.desktop", GEDIT_DESKTOP)])
                .with("/repo/gedit-src", &[("/gedit.spec", "URL: https://x/%{name\n")]),
        );
        let enricher = enricher(access.clone(), dir.path());
        let enriched = enricher.enrich(gedit_entry());
        enricher.icons.close();

        assert_eq!(enriched.entry.upstream_url.as_deref(), Some(""));
        assert!(enriched.facets.category_tags.contains(&"office".to_string()));
        assert_eq!(enriched.entry.icon, "gedit");
        assert_eq!(access.opens.load(Ordering::SeqCst), access.closes.load(Ordering::SeqCst));
    }

    struct FixedCategories;

    impl MetadataParser for FixedCategories {
        fn format_id(&self) -> &str {
            "fixed"
        }

        fn parse(&self, _content: &[u8]) -> Result<crate::traits::Attributes, crate::traits::ParseError> {
            Ok([("Categories".to_string(), "Science;".to_string())].into_iter().collect())
        }
    }

    #[test]
    fn test_custom_parsers_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = gedit_entry();
        entry.source_archive = None;
        let enriched = enricher(gedit_access(), dir.path())
            .with_parsers(Arc::new(FixedCategories), Arc::new(SpecFileParser))
            .enrich(entry);

        assert_eq!(enriched.facets.category_tags, vec!["science", "EX__science__EX"]);
        assert_eq!(enriched.entry.icon, DEFAULT_ICON);
    }

    #[test]
    fn test_unparsable_desktop_file_still_tags_desktop() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(MockArchives::default().with(
            "/repo/gedit",
            &[("/usr/share/applications/org.gnome.gedit.desktop", "[Desktop Entry\nName=gedit\nCategories=Office;\n")],
        ));
        let mut entry = gedit_entry();
        entry.source_archive = None;
        let enriched = enricher(access, dir.path()).enrich(entry);

        assert!(enriched.facets.desktop);
        assert!(enriched.facets.category_tags.is_empty());
        assert_eq!(enriched.entry.icon, DEFAULT_ICON);
    }

    #[test]
    fn test_corrupt_payload_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(
            MockArchives::default()
                .with("/repo/gedit", &[("/usr/share/applications/org.gnome.gedit.desktop", GEDIT_DESKTOP)])
                .corrupted("/repo/gedit"),
        );
        let mut entry = gedit_entry();
        entry.source_archive = None;
        let enriched = enricher(access.clone(), dir.path()).enrich(entry);

        assert!(enriched.facets.category_tags.is_empty());
        assert!(!enriched.facets.desktop);
        assert_eq!(enriched.entry.icon, DEFAULT_ICON);
        assert_eq!(enriched.entry.upstream_url, None);
        // Executables come from the manifest and survive a corrupt payload
        assert_eq!(enriched.facets.commands, vec!["EX__gedit__EX"]);
        assert_eq!(access.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sub_packages_share_document_facets() {
        let dir = tempfile::tempdir().unwrap();
        let access = Arc::new(
            MockArchives::default()
                .with("/repo/theme", &[(THEME_ICON, "png")])
                .with("/repo/gedit-tools", &[("/usr/share/applications/tools.desktop", "[Desktop Entry]\nIcon=gedit\nCategories=Development;\n")]),
        );
        let mut entry = PackageEntry::new("gedit", DEFAULT_ICON);
        entry.sub_pkgs.push(SubPackageEntry {
            name: "gedit-tools".into(),
            summary: String::new(),
            description: String::new(),
            icon: DEFAULT_ICON.into(),
            archive: archive(
                "/repo/gedit-tools",
                &["/usr/share/applications/tools.desktop", "/usr/bin/gedit-tool"],
            ),
        });

        let enriched = enricher(access, dir.path()).enrich(entry);
        assert_eq!(enriched.entry.icon, DEFAULT_ICON);
        assert_eq!(enriched.entry.sub_pkgs[0].icon, "gedit");
        assert!(enriched.entry.sub_pkgs[0].archive.is_none());
        assert_eq!(enriched.facets.category_tags, vec!["development", "EX__development__EX"]);
        assert_eq!(enriched.facets.commands, vec!["EX__gedit_tool__EX"]);
    }

    #[test]
    fn test_spec_selection_rule() {
        let files: Vec<String> = ["/b.spec", "/a.spec", "/foo.spec", "/foo.tar.gz"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(select_spec_member("foo", &files).as_deref(), Some("/foo.spec"));
        assert_eq!(select_spec_member("bar", &files).as_deref(), Some("/a.spec"));
        assert_eq!(select_spec_member("bar", &files[3..]), None);
    }
}
