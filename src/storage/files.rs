//! Discovery of implementation and test files inside a repository.

use std::path::{Component, Path};

use regex::Regex;
use walkdir::WalkDir;

/// A set of directories to search and the patterns selecting files in them.
///
/// Patterns are matched against paths relative to the repository root, using
/// `/` as the separator.
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    /// Directories (or single files) to walk, relative to the repository root.
    pub paths: Vec<String>,
    /// Only files matching this pattern are selected. Everything matches if
    /// unset.
    pub matching_pattern: Option<Regex>,
    /// Files matching any of these patterns are skipped.
    pub ignored_patterns: Vec<Regex>,
}

impl FileQuery {
    /// Walks the query paths under `root` and returns the selected files,
    /// relative to `root`.
    ///
    /// Entries that cannot be read, including paths that do not exist, are
    /// skipped with a warning. Results are in walk order, each directory's
    /// entries sorted by name.
    #[must_use]
    pub fn find(&self, root: &Path) -> Vec<String> {
        self.paths
            .iter()
            .flat_map(|path| {
                WalkDir::new(root.join(path))
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| {
                        entry
                            .inspect_err(|error| tracing::warn!("Skipping {path}: {error}"))
                            .ok()
                    })
                    .filter(|entry| entry.file_type().is_file())
                    .filter_map(|entry| relative_path(root, entry.path()))
                    .filter(|relative| self.selects(relative))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn selects(&self, relative: &str) -> bool {
        if self
            .ignored_patterns
            .iter()
            .any(|pattern| pattern.is_match(relative))
        {
            tracing::trace!("Ignoring {relative}");
            return false;
        }

        self.matching_pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(relative))
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>();
    Some(parts.join("/"))
}
