//! The composition root.
//!
//! [`Views`] registers every view service on a [`Container`] and resolves
//! them up front, so the typed accessors never fail once construction has
//! succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use standout_container::Container;
use tracing::debug;

use crate::compiler::TemplateCompiler;
use crate::config::{ViewPaths, ViewsConfig};
use crate::engines::{self, CompiledEngine, EngineResolver, FileEngine, ScriptEngine, ViewLoader};
use crate::error::ViewError;
use crate::events::{Dispatcher, QueueDispatcher};
use crate::factory::ViewFactory;
use crate::filesystem::Filesystem;
use crate::finder::FileViewFinder;
use crate::view::View;
use crate::ViewData;

/// Container keys of the registered services.
pub mod keys {
    pub const FILES: &str = "files";
    pub const EVENTS: &str = "events";
    /// Transient: every resolution builds a new finder.
    pub const FINDER: &str = "view.finder";
    pub const COMPILER: &str = "view.compiler";
    pub const ENGINE_RESOLVER: &str = "view.engine.resolver";
    pub const FACTORY: &str = "view";
    /// Alias of [`FACTORY`].
    pub const FACTORY_ALIAS: &str = "view.factory";
}

/// A ready-to-use view setup.
///
/// ```rust,no_run
/// use standout_views::{Views, ViewData};
///
/// let views = Views::new(["resources/views", "vendor/views"], "storage/views")?;
/// let html = views.view("emails.welcome", ViewData::new(), ViewData::new())?.render()?;
/// # Ok::<(), standout_views::ViewError>(())
/// ```
#[derive(Debug)]
pub struct Views {
    container: Container,
    files: Arc<Filesystem>,
    events: Arc<Dispatcher>,
    compiler: Arc<TemplateCompiler>,
    engines: Arc<EngineResolver>,
    factory: Arc<ViewFactory>,
}

impl Views {
    /// Builds a setup searching `paths` and caching compiled views in `cache`.
    ///
    /// # Errors
    ///
    /// [`ViewError::Config`] if `paths` is empty.
    pub fn new(paths: impl Into<ViewPaths>, cache: impl Into<PathBuf>) -> Result<Self, ViewError> {
        Self::builder(paths, cache).build()
    }

    pub fn builder(paths: impl Into<ViewPaths>, cache: impl Into<PathBuf>) -> ViewsBuilder {
        ViewsBuilder {
            config: ViewsConfig::new(paths, cache),
            queue: None,
        }
    }

    pub fn from_config(config: ViewsConfig) -> Result<Self, ViewError> {
        ViewsBuilder {
            config,
            queue: None,
        }
        .build()
    }

    /// Creates the view `name`. See [`ViewFactory::make`].
    pub fn view(&self, name: &str, data: ViewData, merge_data: ViewData) -> Result<View, ViewError> {
        self.factory.make(name, data, merge_data)
    }

    pub fn factory(&self) -> &Arc<ViewFactory> {
        &self.factory
    }

    pub fn compiler(&self) -> &Arc<TemplateCompiler> {
        &self.compiler
    }

    /// The finder used by the factory.
    pub fn finder(&self) -> &Arc<FileViewFinder> {
        self.factory.finder()
    }

    pub fn events(&self) -> &Arc<Dispatcher> {
        &self.events
    }

    pub fn files(&self) -> &Arc<Filesystem> {
        &self.files
    }

    pub fn engines(&self) -> &Arc<EngineResolver> {
        &self.engines
    }

    /// The underlying service container.
    pub fn container(&self) -> &Container {
        &self.container
    }
}

/// Builder for [`Views`] with namespaces and a queue capability.
pub struct ViewsBuilder {
    config: ViewsConfig,
    queue: Option<Arc<dyn QueueDispatcher>>,
}

impl ViewsBuilder {
    /// Adds hint paths for `namespace::view` names.
    pub fn namespace(mut self, name: impl Into<String>, paths: impl Into<ViewPaths>) -> Self {
        self.config = self.config.namespace(name, paths);
        self
    }

    /// Injects the queue used by queued event listeners.
    pub fn queue(mut self, queue: Arc<dyn QueueDispatcher>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Registers the services and resolves them.
    pub fn build(self) -> Result<Views, ViewError> {
        self.config.validate()?;
        let container = register(self.config.clone(), self.queue)?;

        let files = container.resolve::<Filesystem>(keys::FILES)?;
        let events = container.resolve::<Dispatcher>(keys::EVENTS)?;
        let compiler = container.resolve::<TemplateCompiler>(keys::COMPILER)?;
        let engines = container.resolve::<EngineResolver>(keys::ENGINE_RESOLVER)?;
        let factory = container.resolve::<ViewFactory>(keys::FACTORY)?;

        debug!(
            paths = ?self.config.paths.as_slice(),
            cache = %self.config.cache.display(),
            namespaces = self.config.namespaces.len(),
            "views ready"
        );
        Ok(Views {
            container,
            files,
            events,
            compiler,
            engines,
            factory,
        })
    }
}

impl std::fmt::Debug for ViewsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewsBuilder")
            .field("config", &self.config)
            .field("queue", &self.queue.is_some())
            .finish()
    }
}

/// Registers the six view services, each depending only on earlier ones.
fn register(
    config: ViewsConfig,
    queue: Option<Arc<dyn QueueDispatcher>>,
) -> Result<Container, ViewError> {
    let mut container = Container::new();

    container.singleton(keys::FILES, |_| Ok(Filesystem::new()));

    container.singleton(keys::EVENTS, move |_| {
        Ok(match &queue {
            Some(queue) => Dispatcher::new().with_queue(Arc::clone(queue)),
            None => Dispatcher::new(),
        })
    });

    let ViewsConfig {
        paths,
        cache,
        namespaces,
    } = config;
    container.bind(keys::FINDER, move |c| {
        let files = c.resolve::<Filesystem>(keys::FILES)?;
        let finder = namespaces.iter().fold(
            FileViewFinder::new(files, paths.clone()),
            |finder, (namespace, hints)| finder.with_namespace(namespace.clone(), hints.clone()),
        );
        Ok(finder)
    });

    container.singleton(keys::COMPILER, move |c| {
        let files = c.resolve::<Filesystem>(keys::FILES)?;
        Ok(TemplateCompiler::new(files, cache.clone()))
    });

    // The factory and the template loader share one finder, so a flush also
    // reaches includes, layouts and components.
    let view_finder: Arc<OnceCell<Arc<FileViewFinder>>> = Arc::default();

    let loader_finder = Arc::clone(&view_finder);
    container.singleton(keys::ENGINE_RESOLVER, move |c| {
        let files = c.resolve::<Filesystem>(keys::FILES)?;
        let compiler = c.resolve::<TemplateCompiler>(keys::COMPILER)?;
        let finder = shared_finder(&loader_finder, c)?;
        let loader = Arc::new(ViewLoader::new(Arc::clone(&files), finder, Arc::clone(&compiler)));
        Ok(default_engines(files, compiler, loader))
    });

    container.singleton(keys::FACTORY, move |c| {
        Ok(ViewFactory::new(
            c.resolve::<EngineResolver>(keys::ENGINE_RESOLVER)?,
            shared_finder(&view_finder, c)?,
            c.resolve::<Dispatcher>(keys::EVENTS)?,
        ))
    });
    container.alias(keys::FACTORY, keys::FACTORY_ALIAS)?;

    Ok(container)
}

fn shared_finder(
    cell: &OnceCell<Arc<FileViewFinder>>,
    container: &Container,
) -> standout_container::Result<Arc<FileViewFinder>> {
    cell.get_or_try_init(|| container.resolve::<FileViewFinder>(keys::FINDER))
        .map(Arc::clone)
}

fn default_engines(
    files: Arc<Filesystem>,
    compiler: Arc<TemplateCompiler>,
    loader: Arc<ViewLoader>,
) -> EngineResolver {
    let resolver = EngineResolver::new();

    resolver.register(engines::FILE, move || Arc::new(FileEngine::new(Arc::clone(&files))));

    let script_loader = Arc::clone(&loader);
    resolver.register(engines::SCRIPT, move || {
        Arc::new(ScriptEngine::new(Arc::clone(&script_loader)))
    });

    resolver.register(engines::COMPILED, move || {
        Arc::new(CompiledEngine::new(Arc::clone(&compiler), Arc::clone(&loader)))
    });

    resolver
}
