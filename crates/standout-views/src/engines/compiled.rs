use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{script, Engine, ViewLoader};
use crate::compiler::TemplateCompiler;
use crate::error::ViewError;
use crate::ViewData;

/// Compiles dialect templates on demand and executes the cached artifact.
///
/// The artifact is rebuilt whenever the source is newer than it. Errors are
/// reported against the source path, not the artifact.
#[derive(Debug, Clone)]
pub struct CompiledEngine {
    compiler: Arc<TemplateCompiler>,
    loader: Arc<ViewLoader>,
}

impl CompiledEngine {
    pub fn new(compiler: Arc<TemplateCompiler>, loader: Arc<ViewLoader>) -> Self {
        Self { compiler, loader }
    }

    pub fn compiler(&self) -> &Arc<TemplateCompiler> {
        &self.compiler
    }
}

impl Engine for CompiledEngine {
    fn get(&self, path: &Path, data: &ViewData) -> Result<String, ViewError> {
        let artifact = self.compiler.ensure_compiled(path)?;
        let source = self.loader.files().get(&artifact)?;
        debug!(path = %path.display(), artifact = %artifact.display(), "rendering compiled view");
        script::render(&self.loader, path, &source, data)
    }
}
