//! Rendering strategies.
//!
//! An [`Engine`] turns a view file plus its data into output. Three strategies
//! ship with the crate and are registered on every [`EngineResolver`] built by
//! [`Views`](crate::Views):
//!
//! | Name | Type | Behavior |
//! |------|------|----------|
//! | `file` | [`FileEngine`] | returns the file contents untouched |
//! | `script` | [`ScriptEngine`] | executes the file as a minijinja template |
//! | `compiled` | [`CompiledEngine`] | compiles the dialect, then executes the artifact |
//!
//! Engines are built lazily, once per name, on first use.

mod compiled;
mod file;
mod loader;
mod script;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::ViewError;
use crate::ViewData;

pub use compiled::CompiledEngine;
pub use file::FileEngine;
pub use loader::ViewLoader;
pub use script::ScriptEngine;

/// Strategy name of [`FileEngine`].
pub const FILE: &str = "file";
/// Strategy name of [`ScriptEngine`].
pub const SCRIPT: &str = "script";
/// Strategy name of [`CompiledEngine`].
pub const COMPILED: &str = "compiled";

/// Produces rendered output for a view file.
pub trait Engine: Send + Sync {
    /// Renders the file at `path` with `data`.
    fn get(&self, path: &Path, data: &ViewData) -> Result<String, ViewError>;
}

type EngineFactory = dyn Fn() -> Arc<dyn Engine> + Send + Sync;

struct Entry {
    factory: Box<EngineFactory>,
    engine: OnceCell<Arc<dyn Engine>>,
}

/// Maps strategy names to lazily built engines.
#[derive(Default)]
pub struct EngineResolver {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl EngineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `name`.
    ///
    /// Any engine previously built under `name` is discarded.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Engine> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(engine = %name, "engine registered");
        let entry = Arc::new(Entry {
            factory: Box::new(factory),
            engine: OnceCell::new(),
        });
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, entry);
    }

    /// Returns the engine for `name`, building it on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Engine>, ViewError> {
        let entry = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::UnknownEngine(name.to_string()))?;
        Ok(Arc::clone(entry.engine.get_or_init(|| (entry.factory)())))
    }

    /// Registered strategy names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EngineResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineResolver")
            .field("engines", &self.names())
            .finish()
    }
}
