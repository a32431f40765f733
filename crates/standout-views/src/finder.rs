//! View name to file resolution.
//!
//! [`FileViewFinder`] maps a view name to a concrete file inside an ordered
//! list of directories.
//!
//! # Names
//!
//! - Dots separate directories: `"emails.welcome"` → `emails/welcome.<ext>`
//! - A `namespace::` prefix searches the namespace's hint paths instead:
//!   `"mail::welcome"` → `<mail path>/welcome.<ext>`
//!
//! # Search order
//!
//! For each directory, in registration order, each extension in
//! [`VIEW_EXTENSIONS`] is tried in priority order. The first existing file wins,
//! so directories form a fallback chain rather than a merge.
//!
//! | Priority | Extension | Engine |
//! |----------|-----------|--------|
//! | 1 (highest) | `.view.jinja` | compiled |
//! | 2 | `.jinja` | script |
//! | 3 | `.html` | file |
//! | 4 | `.css` | file |
//! | 5 (lowest) | `.txt` | file |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::config::ViewPaths;
use crate::error::ViewError;
use crate::filesystem::Filesystem;

/// Recognized view file extensions in priority order.
pub const VIEW_EXTENSIONS: &[&str] = &["view.jinja", "jinja", "html", "css", "txt"];

/// Separates a namespace from the view name (`mail::welcome`).
pub const HINT_DELIMITER: &str = "::";

/// Resolves view names against directories on disk.
///
/// Successful lookups are cached for the lifetime of the finder; call
/// [`flush`](Self::flush) after adding or removing files.
#[derive(Debug)]
pub struct FileViewFinder {
    files: Arc<Filesystem>,
    paths: Vec<PathBuf>,
    hints: HashMap<String, Vec<PathBuf>>,
    extensions: Vec<String>,
    views: Mutex<HashMap<String, PathBuf>>,
}

impl FileViewFinder {
    pub fn new(files: Arc<Filesystem>, paths: impl Into<ViewPaths>) -> Self {
        let paths: ViewPaths = paths.into();
        Self {
            files,
            paths: paths.into(),
            hints: HashMap::new(),
            extensions: VIEW_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the hint paths for `namespace::` lookups.
    pub fn with_namespace(mut self, namespace: impl Into<String>, paths: impl Into<ViewPaths>) -> Self {
        let paths: ViewPaths = paths.into();
        self.hints.insert(namespace.into(), paths.into());
        self
    }

    /// Resolves `name` to a file path.
    ///
    /// # Errors
    ///
    /// - [`ViewError::InvalidName`] for a malformed name or unknown namespace
    /// - [`ViewError::ViewNotFound`] when no directory contains the view
    pub fn find(&self, name: &str) -> Result<PathBuf, ViewError> {
        if let Some(path) = self.cache().get(name) {
            trace!(view = name, path = %path.display(), "view path cache hit");
            return Ok(path.clone());
        }

        let path = match name.split_once(HINT_DELIMITER) {
            Some((namespace, view)) => self.find_namespaced(name, namespace, view)?,
            None => self.find_in_paths(name, name, &self.paths)?,
        };

        self.cache().insert(name.to_string(), path.clone());
        Ok(path)
    }

    /// Whether `name` resolves to an existing file.
    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_ok()
    }

    /// Clears the lookup cache.
    pub fn flush(&self) {
        self.cache().clear();
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn hints(&self) -> &HashMap<String, Vec<PathBuf>> {
        &self.hints
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn find_namespaced(&self, name: &str, namespace: &str, view: &str) -> Result<PathBuf, ViewError> {
        if namespace.is_empty() || view.is_empty() || view.contains(HINT_DELIMITER) {
            return Err(ViewError::InvalidName {
                name: name.to_string(),
                reason: "expected namespace::view".to_string(),
            });
        }
        let paths = self.hints.get(namespace).ok_or_else(|| ViewError::InvalidName {
            name: name.to_string(),
            reason: format!("no hint path defined for [{namespace}]"),
        })?;
        self.find_in_paths(name, view, paths)
    }

    fn find_in_paths(&self, name: &str, view: &str, paths: &[PathBuf]) -> Result<PathBuf, ViewError> {
        if view.is_empty() || view.split('.').any(|segment| segment.is_empty() || segment == "..") {
            return Err(ViewError::InvalidName {
                name: name.to_string(),
                reason: "empty path segment".to_string(),
            });
        }

        for dir in paths {
            for file in self.possible_files(view) {
                let candidate = dir.join(&file);
                if self.files.is_file(&candidate) {
                    trace!(view = name, path = %candidate.display(), "view resolved");
                    return Ok(candidate);
                }
            }
        }

        Err(ViewError::ViewNotFound {
            name: name.to_string(),
            searched: paths.to_vec(),
        })
    }

    /// Relative file names to try for `view`, in extension priority order.
    fn possible_files(&self, view: &str) -> Vec<PathBuf> {
        let relative: PathBuf = view.split('.').collect();
        self.extensions
            .iter()
            .map(|ext| {
                let mut file = relative.clone().into_os_string();
                file.push(".");
                file.push(ext);
                PathBuf::from(file)
            })
            .collect()
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, PathBuf>> {
        self.views
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Whether `path`'s file name ends with `.{extension}`.
pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(extension))
        .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
}
