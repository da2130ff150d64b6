//! Package payloads stored as tar archives, optionally gzip-compressed.

use crate::traits::{ArchiveAccess, ArchiveError, ArchiveMember, ArchiveReader};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Opens `.tar` and `.tar.gz` payloads. Relative locations resolve against
/// the configured root.
#[derive(Debug, Clone, Default)]
pub struct TarArchiveAccess {
    root: Option<PathBuf>,
}

impl TarArchiveAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, location: &Path) -> PathBuf {
        match &self.root {
            Some(root) if location.is_relative() => root.join(location),
            _ => location.to_path_buf(),
        }
    }
}

impl ArchiveAccess for TarArchiveAccess {
    fn open(&self, location: &Path) -> Result<Box<dyn ArchiveReader>, ArchiveError> {
        let path = self.resolve(location);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ArchiveError::NotFound(path.clone()),
            _ => ArchiveError::Io(e),
        })?;
        Ok(Box::new(TarReader {
            location: path,
            file: Some(file),
        }))
    }
}

struct TarReader {
    location: PathBuf,
    file: Option<File>,
}

impl ArchiveReader for TarReader {
    fn extract(&mut self, wanted: &dyn Fn(&str) -> bool) -> Result<Vec<ArchiveMember>, ArchiveError> {
        let file = self.file.as_mut().ok_or_else(|| {
            ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "archive already closed",
            ))
        })?;

        file.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 2];
        let read = file.read(&mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        if read == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
            read_members(tar::Archive::new(GzDecoder::new(&mut *file)), wanted, &self.location)
        } else {
            read_members(tar::Archive::new(&mut *file), wanted, &self.location)
        }
    }

    fn close(&mut self) {
        self.file = None;
    }
}

fn read_members<R: Read>(
    mut archive: tar::Archive<R>,
    wanted: &dyn Fn(&str) -> bool,
    location: &Path,
) -> Result<Vec<ArchiveMember>, ArchiveError> {
    let corrupt = |e: std::io::Error| ArchiveError::Corrupted {
        location: location.to_path_buf(),
        reason: e.to_string(),
    };

    let mut members = Vec::new();
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = member_path(&entry.path().map_err(corrupt)?);
        if !wanted(&path) {
            continue;
        }

        // Header sizes are untrusted: the buffer grows with what is read.
        let declared = entry.size();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(corrupt)?;
        if data.len() as u64 != declared {
            return Err(ArchiveError::Corrupted {
                location: location.to_path_buf(),
                reason: format!("member {path} truncated at {} of {declared} bytes", data.len()),
            });
        }
        members.push(ArchiveMember { path, data });
    }

    Ok(members)
}

/// Tar member names (`./usr/bin/foo`, `usr/bin/foo`) as absolute manifest
/// paths (`/usr/bin/foo`).
fn member_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_start_matches("./").trim_start_matches('/');
    format!("/{trimmed}")
}
