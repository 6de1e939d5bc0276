//! Project scanning: find manifests and candidate source files on disk.

use crate::error::Error;
use crate::manifest::{ManifestError, MANIFEST_NAME};
use crate::partition::SourceFile;
use crate::paths;
use crate::pipeline::ManifestSource;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", "target"];

/// Everything found under a project root. Paths are root-relative and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    pub manifests: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
}

impl SourceSet {
    /// Candidate files for a pass, all requesting the same source-map setting.
    #[must_use]
    pub fn source_files(&self, source_map: bool) -> Vec<SourceFile> {
        self.sources
            .iter()
            .map(|p| SourceFile::new(p.clone()).with_source_map(source_map))
            .collect()
    }
}

fn skipped(entry: &DirEntry, root: &Path, out_dir: &Path) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') || SKIP_DIRS.contains(&&*name) {
        return true;
    }
    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
    !out_dir.as_os_str().is_empty() && (rel == out_dir || entry.path() == out_dir)
}

/// Walk `root`, skipping dependency dirs, dot dirs and `out_dir`
/// (root-relative).
pub fn scan(root: &Path, out_dir: &Path) -> Result<SourceSet, Error> {
    let out_dir = paths::normalize(out_dir);
    let mut set = SourceSet::default();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !skipped(e, root, &out_dir))
    {
        let entry = entry.map_err(|source| Error::Scan {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        if entry.file_name() == MANIFEST_NAME {
            set.manifests.push(rel);
        } else if paths::is_script(&rel) {
            set.sources.push(rel);
        }
    }

    set.manifests.sort();
    set.sources.sort();
    debug!(
        root = %root.display(),
        manifests = set.manifests.len(),
        sources = set.sources.len(),
        "Scanned project"
    );
    Ok(set)
}

/// Read manifests relative to `root`. Unreadable files are returned as errors
/// and do not stop the others.
#[must_use]
pub fn read_manifests(root: &Path, manifests: &[PathBuf]) -> (Vec<ManifestSource>, Vec<ManifestError>) {
    let mut sources = Vec::with_capacity(manifests.len());
    let mut errors = Vec::new();
    for rel in manifests {
        match localpkg_util::fs::read_to_string_lossy(&root.join(rel)) {
            Ok(content) => sources.push(ManifestSource::new(rel.clone(), content)),
            Err(source) => errors.push(ManifestError::Read {
                path: rel.clone(),
                source,
            }),
        }
    }
    (sources, errors)
}
