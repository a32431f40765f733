//! Native filesystem access for views and compiled artifacts.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::error::ViewError;

/// Thin wrapper over `std::fs` that attaches paths to I/O errors.
///
/// Writes go through [`Filesystem::replace`], which writes a temporary file
/// next to the target and renames it into place, so readers never observe a
/// partially written file.
#[derive(Debug, Default, Clone)]
pub struct Filesystem;

impl Filesystem {
    pub fn new() -> Self {
        Self
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Reads the whole file as UTF-8.
    pub fn get(&self, path: &Path) -> Result<String, ViewError> {
        fs::read_to_string(path).map_err(|e| ViewError::io(path, e))
    }

    /// Atomically replaces the contents of `path`.
    pub fn replace(&self, path: &Path, contents: &str) -> Result<(), ViewError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ViewError::io(dir, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| ViewError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| ViewError::io(path, e.error))?;
        Ok(())
    }

    pub fn last_modified(&self, path: &Path) -> Result<SystemTime, ViewError> {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| ViewError::io(path, e))
    }

    /// Creates `path` and any missing parents.
    pub fn ensure_directory_exists(&self, path: &Path) -> Result<(), ViewError> {
        if path.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(path).map_err(|e| ViewError::io(path, e))
    }

    /// Deletes every regular file in `dir` whose name ends with `suffix`.
    ///
    /// Returns the number of files removed. A missing directory removes nothing.
    pub fn delete_matching(&self, dir: &Path, suffix: &str) -> Result<usize, ViewError> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(dir).map_err(|e| ViewError::io(dir, e))? {
            let path = entry.map_err(|e| ViewError::io(dir, e))?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(suffix));
            if matches && path.is_file() {
                fs::remove_file(&path).map_err(|e| ViewError::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
