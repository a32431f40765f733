use std::path::Path;
use std::sync::Arc;

use minijinja::Value;
use tracing::debug;

use super::{Engine, ViewLoader};
use crate::error::ViewError;
use crate::ViewData;

/// Executes the file as a minijinja template with the view data as context.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    loader: Arc<ViewLoader>,
}

impl ScriptEngine {
    pub fn new(loader: Arc<ViewLoader>) -> Self {
        Self { loader }
    }
}

impl Engine for ScriptEngine {
    fn get(&self, path: &Path, data: &ViewData) -> Result<String, ViewError> {
        let source = self.loader.files().get(path)?;
        debug!(path = %path.display(), "rendering script view");
        render(&self.loader, path, &source, data)
    }
}

/// Renders `source` under the name of `path` so errors point at the view file.
///
/// Failures inside included or parent templates carry the view name minijinja
/// loaded them by; that name is mapped back to its file.
pub(super) fn render(
    loader: &Arc<ViewLoader>,
    path: &Path,
    source: &str,
    data: &ViewData,
) -> Result<String, ViewError> {
    let name = path.to_string_lossy();
    loader
        .environment()
        .render_named_str(&name, source, Value::from_serialize(data))
        .map_err(|err| {
            let origin = match err.name() {
                Some(failed) if failed != name => loader.source_path(failed),
                _ => path.to_path_buf(),
            };
            ViewError::render(origin, err)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::TemplateCompiler;
    use crate::filesystem::Filesystem;
    use crate::finder::FileViewFinder;
    use serde_json::json;
    use std::fs;

    fn engine(views: &Path, cache: &Path) -> ScriptEngine {
        let files = Arc::new(Filesystem::new());
        ScriptEngine::new(Arc::new(ViewLoader::new(
            files.clone(),
            Arc::new(FileViewFinder::new(files.clone(), views)),
            Arc::new(TemplateCompiler::new(files, cache)),
        )))
    }

    #[test]
    fn test_executes_template_with_data() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let path = views.path().join("list.jinja");
        fs::write(&path, "{% for i in items %}{{ i }};{% endfor %}").unwrap();

        let mut data = ViewData::new();
        data.insert("items".into(), json!([1, 2, 3]));
        let out = engine(views.path(), cache.path()).get(&path, &data).unwrap();
        assert_eq!(out, "1;2;3;");
    }

    #[test]
    fn test_failure_names_template_and_line() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let path = views.path().join("bad.jinja");
        fs::write(&path, "ok\n{{ nope.a.b }}").unwrap();

        match engine(views.path(), cache.path())
            .get(&path, &ViewData::new())
            .unwrap_err()
        {
            ViewError::Render { path: origin, line, .. } => {
                assert_eq!(origin, path);
                assert_eq!(line, Some(2));
            }
            other => panic!("expected render error, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_in_include_names_included_file() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::create_dir(views.path().join("partials")).unwrap();
        let partial = views.path().join("partials/item.jinja");
        fs::write(&partial, "fine\n{{ nope.a.b }}").unwrap();
        let page = views.path().join("page.jinja");
        fs::write(&page, "{% include 'partials.item' %}").unwrap();

        match engine(views.path(), cache.path())
            .get(&page, &ViewData::new())
            .unwrap_err()
        {
            ViewError::Render { path: origin, line, .. } => {
                assert_eq!(origin, partial);
                assert_eq!(line, Some(2));
            }
            other => panic!("expected render error, got {other:?}"),
        }
    }
}
