use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::engines::Engine;
use crate::error::ViewError;
use crate::events::Dispatcher;
use crate::ViewData;

/// A resolved view waiting to be rendered.
///
/// Creating a `View` does not touch the template; rendering happens in
/// [`render`](Self::render), which can be called any number of times.
pub struct View {
    name: String,
    path: PathBuf,
    engine: Arc<dyn Engine>,
    events: Arc<Dispatcher>,
    shared: Arc<RwLock<ViewData>>,
    data: ViewData,
}

impl View {
    pub(crate) fn new(
        name: String,
        path: PathBuf,
        engine: Arc<dyn Engine>,
        events: Arc<Dispatcher>,
        shared: Arc<RwLock<ViewData>>,
        data: ViewData,
    ) -> Self {
        Self {
            name,
            path,
            engine,
            events,
            shared,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file this view renders.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data bound to this view, excluding shared data.
    pub fn data(&self) -> &ViewData {
        &self.data
    }

    /// Adds a piece of data to the view.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Renders the view.
    ///
    /// Fires `composing: {name}` with the full data set (shared data overlaid
    /// by view data) and passes the result to the engine.
    pub fn render(&self) -> Result<String, ViewError> {
        let mut data = self
            .shared
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        data.extend(self.data.clone());

        self.events
            .dispatch(&format!("composing: {}", self.name), &mut data)?;

        debug!(view = %self.name, path = %self.path.display(), "rendering view");
        self.engine.get(&self.path, &data)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}
