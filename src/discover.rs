//! Locating Zuul config files inside a project checkout.
//!
//! A project may carry `zuul.yaml` / `.zuul.yaml` at its root and any number
//! of `.yaml` files under `zuul.d/` / `.zuul.d/`. Inside those directories a
//! `.zuul.ignore` marker suppresses the files of the directory it sits in;
//! subdirectories are still visited and judged on their own.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ParseError;

pub const CONFIG_FILES: [&str; 2] = ["zuul.yaml", ".zuul.yaml"];
pub const CONFIG_DIRS: [&str; 2] = ["zuul.d", ".zuul.d"];
pub const IGNORE_MARKER: &str = ".zuul.ignore";

/// Decides whether the files directly inside a directory are processed.
pub trait DirectoryFilter {
    fn include_files_of(&self, dir: &Path) -> bool;
}

/// Skips directories that contain [`IGNORE_MARKER`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreMarker;

impl DirectoryFilter for IgnoreMarker {
    fn include_files_of(&self, dir: &Path) -> bool {
        !dir.join(IGNORE_MARKER).is_file()
    }
}

/// Config files of one project in processing order, plus walk failures.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub failures: Vec<ParseError>,
}

/// Lists the config files of the project rooted at `root`.
///
/// Order: root files (`zuul.yaml` before `.zuul.yaml`), then each config
/// directory (`zuul.d` before `.zuul.d`) walked depth-first with entries
/// sorted by file name.
pub fn discover(root: &Path, filter: &impl DirectoryFilter) -> Discovery {
    let mut discovery = Discovery::default();

    for name in CONFIG_FILES {
        let path = root.join(name);
        if path.is_file() {
            discovery.files.push(path);
        }
    }

    for name in CONFIG_DIRS {
        let dir = root.join(name);
        if dir.is_dir() {
            visit_config_dir(&dir, filter, &mut discovery);
        }
    }

    discovery
}

fn visit_config_dir(dir: &Path, filter: &impl DirectoryFilter, discovery: &mut Discovery) {
    // Directories are yielded before their contents, so each directory's
    // verdict is known by the time its files arrive.
    let mut excluded: HashSet<PathBuf> = HashSet::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_path_buf();
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                discovery.failures.push(ParseError::Io { path, source });
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_dir() {
            if !filter.include_files_of(path) {
                tracing::debug!(dir = %path.display(), "ignore marker present, skipping files");
                excluded.insert(path.to_path_buf());
            }
            continue;
        }

        // Links to files are read like the files themselves; links to
        // directories are not descended into.
        let is_file = entry.file_type().is_file() || (entry.path_is_symlink() && path.is_file());
        if !is_file || !is_yaml(path) {
            continue;
        }
        let in_excluded_dir = path.parent().is_some_and(|p| excluded.contains(p));
        if !in_excluded_dir {
            discovery.files.push(path.to_path_buf());
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "yaml")
}
