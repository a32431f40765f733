use std::path::Path;
use std::sync::Arc;

use super::Engine;
use crate::error::ViewError;
use crate::filesystem::Filesystem;
use crate::ViewData;

/// Returns the file contents as-is; the data is ignored.
#[derive(Debug, Clone)]
pub struct FileEngine {
    files: Arc<Filesystem>,
}

impl FileEngine {
    pub fn new(files: Arc<Filesystem>) -> Self {
        Self { files }
    }
}

impl Engine for FileEngine {
    fn get(&self, path: &Path, _data: &ViewData) -> Result<String, ViewError> {
        self.files.get(path)
    }
}
