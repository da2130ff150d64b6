//! Icon resolution against an ordered list of icon-theme packages.

use crate::cache::archive::ArchiveFileCache;
use crate::model::{PackageArchive, RawPackageRecord};
use crate::traits::ArchiveAccess;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const THEME_ROOT: &str = "/usr/share/icons/";
const PIXMAP_ROOT: &str = "/usr/share/pixmaps/";
const ICON_EXTENSIONS: &[&str] = &["png", "svg", "xpm"];
/// Decompression filter for theme payloads: all icons in one pass.
const THEME_FILTER: &str = "/usr/share/icons/*";
/// Decompression filter for icons shipped inside a package.
const OWN_ICON_FILTER: &str = "{/usr/share/icons/*,/usr/share/pixmaps/*}";

struct ThemeIcons {
    archive: PackageArchive,
    /// Icon name to every member path providing it.
    icons: HashMap<String, Vec<String>>,
    /// Opened on the first icon served from this theme, kept until close.
    cache: Option<ArchiveFileCache>,
}

impl ThemeIcons {
    fn extract(&mut self, member: &str, access: &Arc<dyn ArchiveAccess>) -> Option<Vec<u8>> {
        let archive = &self.archive;
        self.cache
            .get_or_insert_with(|| ArchiveFileCache::new(archive.clone(), access.clone()))
            .open_file(member, Some(THEME_FILTER))
    }
}

#[derive(Default)]
struct IconState {
    themes: HashMap<String, ThemeIcons>,
    generated: HashMap<String, String>,
    closed: bool,
}

/// Resolves icon names and writes the chosen artifact to `output_dir`.
///
/// Shared by every entry of a run; interior state sits behind a mutex so
/// concurrent enrichment workers can use one resolver.
pub struct IconResolver {
    themes: Vec<String>,
    output_dir: PathBuf,
    access: Arc<dyn ArchiveAccess>,
    state: Mutex<IconState>,
}

impl IconResolver {
    /// `themes` is in precedence order: the first theme that provides an
    /// icon wins.
    pub fn new(
        themes: Vec<String>,
        output_dir: impl Into<PathBuf>,
        access: Arc<dyn ArchiveAccess>,
    ) -> Self {
        Self {
            themes,
            output_dir: output_dir.into(),
            access,
            state: Mutex::new(IconState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, IconState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Indexes the icon manifest of `record` if it is one of the configured
    /// theme packages. Cheap: only the manifest is read, never the payload.
    pub fn check_pkg(&self, record: &RawPackageRecord) {
        if record.is_source() || !self.themes.iter().any(|t| *t == record.name) {
            return;
        }
        let Some(archive) = record.package_archive() else {
            return;
        };

        let mut state = self.state();
        if state.closed || state.themes.contains_key(&record.name) {
            return;
        }

        let mut icons: HashMap<String, Vec<String>> = HashMap::new();
        for path in archive.files.iter().filter(|p| p.starts_with(THEME_ROOT)) {
            if let Some(name) = icon_name(path) {
                icons.entry(name.to_string()).or_default().push(path.clone());
            }
        }

        info!(theme = %record.name, icons = icons.len(), "Pre-cached icon theme");
        state
            .themes
            .insert(record.name.clone(), ThemeIcons { archive, icons, cache: None });
    }

    /// Resolves `icon` (a theme icon name, optionally with an extension, or
    /// an absolute path inside the package) and returns the identifier under
    /// which the artifact was stored.
    ///
    /// Lookup order: an absolute path in the package itself, then each theme
    /// in precedence order, then icons shipped in the package's own icon
    /// directories.
    pub fn generate_icon(&self, icon: &str, file_cache: &mut ArchiveFileCache) -> Option<String> {
        let icon = icon.trim();
        let explicit = icon.starts_with('/').then_some(icon);
        let name = if explicit.is_some() {
            icon_name(icon)?
        } else {
            strip_icon_extension(icon)
        };
        if name.is_empty() || name.contains('/') || name == ".." {
            debug!(icon, "Unusable icon name");
            return None;
        }

        let theme_hit = {
            let state = self.state();
            if state.closed {
                return None;
            }
            if let Some(id) = state.generated.get(name) {
                return Some(id.clone());
            }
            self.themes.iter().find_map(|theme| {
                let icons = state.themes.get(theme)?;
                let member = best_candidate(icons.icons.get(name)?)?;
                Some((theme.clone(), member.to_string()))
            })
        };

        if let Some(path) = explicit {
            if let Some(data) = file_cache.open_file(path, own_icon_filter(path)) {
                return self.store(name, path, &data);
            }
        }

        if let Some((theme, member)) = theme_hit {
            let data = self
                .state()
                .themes
                .get_mut(&theme)
                .and_then(|icons| icons.extract(&member, &self.access));
            match data {
                Some(data) => {
                    debug!(icon = name, theme = %theme, "Icon found in theme");
                    return self.store(name, &member, &data);
                }
                None => warn!(
                    icon = name,
                    theme = %theme,
                    member = %member,
                    "Theme icon could not be extracted"
                ),
            }
        }

        let own: Vec<String> = file_cache
            .files()
            .iter()
            .filter(|p| p.starts_with(THEME_ROOT) || p.starts_with(PIXMAP_ROOT))
            .filter(|p| icon_name(p) == Some(name))
            .cloned()
            .collect();
        if let Some(member) = best_candidate(&own) {
            let member = member.to_string();
            if let Some(data) = file_cache.open_file(&member, Some(OWN_ICON_FILTER)) {
                return self.store(name, &member, &data);
            }
        }

        debug!(icon = name, "Icon not found");
        None
    }

    fn store(&self, name: &str, member: &str, data: &[u8]) -> Option<String> {
        let ext = Path::new(member)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let target = self.output_dir.join(format!("{name}.{ext}"));

        let written = std::fs::create_dir_all(&self.output_dir).and_then(|_| std::fs::write(&target, data));
        if let Err(e) = written {
            warn!(icon = name, path = %target.display(), error = %e, "Failed to write icon");
            return None;
        }

        self.state()
            .generated
            .insert(name.to_string(), name.to_string());
        Some(name.to_string())
    }

    /// Number of icons written so far.
    pub fn generated_count(&self) -> usize {
        self.state().generated.len()
    }

    /// Closes every theme payload and drops the cached artifact records.
    /// Later lookups miss.
    pub fn close(&self) {
        let mut state = self.state();
        info!(generated = state.generated.len(), "Closing icon cache");
        for theme in state.themes.values_mut() {
            if let Some(cache) = theme.cache.as_mut() {
                cache.close();
            }
        }
        state.themes.clear();
        state.generated.clear();
        state.closed = true;
    }
}

/// File stem of an icon path with a known image extension.
fn icon_name(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    ICON_EXTENSIONS.contains(&ext).then_some(stem)
}

fn own_icon_filter(path: &str) -> Option<&'static str> {
    (path.starts_with(THEME_ROOT) || path.starts_with(PIXMAP_ROOT)).then_some(OWN_ICON_FILTER)
}

fn strip_icon_extension(icon: &str) -> &str {
    match icon.rsplit_once('.') {
        Some((stem, ext)) if ICON_EXTENSIONS.contains(&ext) => stem,
        _ => icon,
    }
}

/// Raster formats beat vectors, larger sizes beat smaller ones, and ties go
/// to the lexicographically smallest path.
fn best_candidate(paths: &[String]) -> Option<&str> {
    paths
        .iter()
        .max_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| b.cmp(a)))
        .map(String::as_str)
}

fn rank(path: &str) -> (u8, u32) {
    let format = match path.rsplit('.').next() {
        Some("png") => 2,
        Some("svg") => 1,
        _ => 0,
    };
    let size = path
        .split('/')
        .filter_map(|component| {
            let (w, h) = component.split_once('x')?;
            (w == h).then(|| w.parse::<u32>().ok()).flatten()
        })
        .max()
        .unwrap_or(0);
    (format, size)
}
