//! The minijinja environment shared by the script and compiled engines.

use std::path::PathBuf;
use std::sync::Arc;

use minijinja::{AutoEscape, Environment, Error, ErrorKind};
use tracing::trace;

use crate::compiler::{TemplateCompiler, COMPONENT_VIEW_FN};
use crate::error::ViewError;
use crate::filesystem::Filesystem;
use crate::finder::FileViewFinder;

/// Loads templates referenced by `include`, `extends` and components.
///
/// Names are view names, resolved through the finder exactly like top-level
/// views. Dialect sources are compiled (when stale) and their artifact is
/// returned, so a plain `.jinja` template can include a `.view.jinja` one and
/// vice versa.
#[derive(Debug)]
pub struct ViewLoader {
    files: Arc<Filesystem>,
    finder: Arc<FileViewFinder>,
    compiler: Arc<TemplateCompiler>,
}

impl ViewLoader {
    pub fn new(
        files: Arc<Filesystem>,
        finder: Arc<FileViewFinder>,
        compiler: Arc<TemplateCompiler>,
    ) -> Self {
        Self {
            files,
            finder,
            compiler,
        }
    }

    pub fn files(&self) -> &Arc<Filesystem> {
        &self.files
    }

    pub fn finder(&self) -> &Arc<FileViewFinder> {
        &self.finder
    }

    /// File behind a template name minijinja reports, falling back to the
    /// name itself when no view matches.
    pub fn source_path(&self, name: &str) -> PathBuf {
        self.finder
            .find(&name.replace('/', "."))
            .unwrap_or_else(|_| PathBuf::from(name))
    }

    /// Source for the view `name`, or `None` if no such view exists.
    pub fn load(&self, name: &str) -> Result<Option<String>, ViewError> {
        let name = name.replace('/', ".");
        let path = match self.finder.find(&name) {
            Ok(path) => path,
            Err(ViewError::ViewNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        trace!(view = %name, path = %path.display(), "loading template");

        if self.compiler.handles(&path) {
            let artifact = self.compiler.ensure_compiled(&path)?;
            return self.files.get(&artifact).map(Some);
        }
        self.files.get(&path).map(Some)
    }

    /// Builds a fresh environment.
    ///
    /// Each render gets its own environment so templates changed on disk
    /// are picked up without explicit invalidation.
    pub fn environment(self: &Arc<Self>) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let loader = Arc::clone(self);
        env.set_loader(move |name| {
            loader.load(name).map_err(|err| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("failed to load view [{name}]"),
                )
                .with_source(err)
            })
        });

        let compiler = Arc::clone(&self.compiler);
        env.add_function(COMPONENT_VIEW_FN, move |name: String| {
            compiler.component_view(&name)
        });

        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn loader(views: &std::path::Path, cache: &std::path::Path) -> Arc<ViewLoader> {
        let files = Arc::new(Filesystem::new());
        Arc::new(ViewLoader::new(
            files.clone(),
            Arc::new(FileViewFinder::new(files.clone(), views)),
            Arc::new(TemplateCompiler::new(files, cache)),
        ))
    }

    #[test]
    fn test_missing_view_loads_as_none() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        assert_eq!(loader(views.path(), cache.path()).load("nope").unwrap(), None);
    }

    #[test]
    fn test_dialect_views_load_compiled() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::create_dir(views.path().join("partials")).unwrap();
        fs::write(views.path().join("partials/nav.view.jinja"), "@if(x)<nav/>@endif").unwrap();

        let source = loader(views.path(), cache.path())
            .load("partials/nav")
            .unwrap()
            .unwrap();
        assert_eq!(source, "{% if x %}<nav/>{% endif %}");
    }

    #[test]
    fn test_environment_includes_by_view_name() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::write(views.path().join("name.jinja"), "<{{ who }}>").unwrap();

        let env = loader(views.path(), cache.path()).environment();
        let out = env
            .render_str("{% include 'name' %}x", minijinja::context! { who => "me" })
            .unwrap();
        assert_eq!(out, "<me>x");
    }

    #[test]
    fn test_no_auto_escaping() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let env = loader(views.path(), cache.path()).environment();
        let out = env
            .render_named_str("page.html", "{{ v }}", minijinja::context! { v => "<b>" })
            .unwrap();
        assert_eq!(out, "<b>");
    }
}
