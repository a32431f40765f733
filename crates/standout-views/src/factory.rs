//! The view factory.
//!
//! [`ViewFactory`] turns a view name into a [`View`]: it finds the file,
//! picks the engine from the file's extension, merges data and fires the
//! `creating` event. Rendering is deferred to [`View::render`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::engines::{self, Engine, EngineResolver};
use crate::error::ViewError;
use crate::events::Dispatcher;
use crate::finder::{has_extension, FileViewFinder};
use crate::view::View;
use crate::ViewData;

/// Extension to engine mapping, in priority order.
///
/// Files whose extension is not listed render with the `file` engine.
pub const ENGINE_EXTENSIONS: &[(&str, &str)] = &[
    ("view.jinja", engines::COMPILED),
    ("jinja", engines::SCRIPT),
    ("html", engines::FILE),
    ("css", engines::FILE),
    ("txt", engines::FILE),
];

/// Creates views by name.
#[derive(Debug)]
pub struct ViewFactory {
    engines: Arc<EngineResolver>,
    finder: Arc<FileViewFinder>,
    events: Arc<Dispatcher>,
    shared: Arc<RwLock<ViewData>>,
}

impl ViewFactory {
    pub fn new(
        engines: Arc<EngineResolver>,
        finder: Arc<FileViewFinder>,
        events: Arc<Dispatcher>,
    ) -> Self {
        Self {
            engines,
            finder,
            events,
            shared: Arc::new(RwLock::new(ViewData::new())),
        }
    }

    /// Creates the view `name`.
    ///
    /// `name` uses dots (or slashes) as directory separators. Keys in `data`
    /// win over the same keys in `merge_data`.
    ///
    /// # Errors
    ///
    /// [`ViewError::ViewNotFound`] if no directory contains the view, or any
    /// error returned by a `creating` listener.
    pub fn make(
        &self,
        name: &str,
        data: ViewData,
        merge_data: ViewData,
    ) -> Result<View, ViewError> {
        let name = normalize_name(name);
        let path = self.finder.find(&name)?;
        self.view_instance(name, path, data, merge_data)
    }

    /// Creates a view from an explicit file path, bypassing the finder.
    pub fn file(
        &self,
        path: impl Into<PathBuf>,
        data: ViewData,
        merge_data: ViewData,
    ) -> Result<View, ViewError> {
        let path = path.into();
        let name = path.to_string_lossy().into_owned();
        self.view_instance(name, path, data, merge_data)
    }

    /// Creates the first of `names` that exists.
    pub fn first(
        &self,
        names: &[&str],
        data: ViewData,
        merge_data: ViewData,
    ) -> Result<View, ViewError> {
        let name = names
            .iter()
            .find(|name| self.exists(name))
            .ok_or_else(|| ViewError::ViewNotFound {
                name: names.join(", "),
                searched: self.finder.paths().to_vec(),
            })?;
        self.make(name, data, merge_data)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.finder.exists(&normalize_name(name))
    }

    /// Makes `value` available to every view under `key`.
    pub fn share(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.shared
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value.into());
    }

    /// Snapshot of the shared data.
    pub fn shared(&self) -> ViewData {
        self.shared
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs `composer` just before matching views render.
    ///
    /// `pattern` is a view name, optionally ending in `*`. The callback
    /// receives the view name and the data about to be rendered.
    pub fn composer<F>(&self, pattern: &str, composer: F)
    where
        F: Fn(&str, &mut ViewData) + Send + Sync + 'static,
    {
        self.add_view_event("composing", pattern, composer);
    }

    /// Runs `creator` as soon as matching views are created.
    pub fn creator<F>(&self, pattern: &str, creator: F)
    where
        F: Fn(&str, &mut ViewData) + Send + Sync + 'static,
    {
        self.add_view_event("creating", pattern, creator);
    }

    /// The engine that renders `path`.
    pub fn engine_for(&self, path: &Path) -> Result<Arc<dyn Engine>, ViewError> {
        self.engines.resolve(engine_name(path))
    }

    pub fn finder(&self) -> &Arc<FileViewFinder> {
        &self.finder
    }

    pub fn events(&self) -> &Arc<Dispatcher> {
        &self.events
    }

    pub fn engines(&self) -> &Arc<EngineResolver> {
        &self.engines
    }

    fn view_instance(
        &self,
        name: String,
        path: PathBuf,
        data: ViewData,
        merge_data: ViewData,
    ) -> Result<View, ViewError> {
        let engine = self.engine_for(&path)?;

        let mut data_set = merge_data;
        data_set.extend(data);
        self.events
            .dispatch(&format!("creating: {name}"), &mut data_set)?;

        debug!(view = %name, path = %path.display(), engine = engine_name(&path), "view created");
        Ok(View::new(
            name,
            path,
            engine,
            Arc::clone(&self.events),
            Arc::clone(&self.shared),
            data_set,
        ))
    }

    fn add_view_event<F>(&self, prefix: &'static str, pattern: &str, callback: F)
    where
        F: Fn(&str, &mut ViewData) + Send + Sync + 'static,
    {
        let event_prefix = format!("{prefix}: ");
        self.events
            .listen(format!("{event_prefix}{pattern}"), move |event, data| {
                callback(event.strip_prefix(&event_prefix).unwrap_or(event), data)
            });
    }
}

/// Name of the engine for `path`, by extension priority.
pub fn engine_name(path: &Path) -> &'static str {
    ENGINE_EXTENSIONS
        .iter()
        .find(|(extension, _)| has_extension(path, extension))
        .map_or(engines::FILE, |(_, engine)| *engine)
}

fn normalize_name(name: &str) -> String {
    name.replace('/', ".")
}
