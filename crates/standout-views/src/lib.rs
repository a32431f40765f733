//! # Standout Views - File-Based Views Outside a Framework
//!
//! `standout-views` wires a service container, a view factory and a template
//! compiler together so directory trees of templates can be rendered from any
//! application.
//!
//! ## Core Concepts
//!
//! - [`Views`]: the composition root. Registers every service on a
//!   [`Container`](standout_container::Container) and exposes typed accessors
//! - [`ViewFactory`]: finds a view by name, picks its engine and creates a [`View`]
//! - [`FileViewFinder`]: maps `emails.welcome` to `emails/welcome.<ext>` over
//!   an ordered list of directories (first match wins)
//! - [`TemplateCompiler`]: translates the `@directive` dialect of `.view.jinja`
//!   files to minijinja and caches the result
//! - [`EngineResolver`]: the `file`, `script` and `compiled` rendering strategies
//! - [`Dispatcher`]: `creating:` and `composing:` view events
//!
//! ## Quick Start
//!
//! ```rust
//! use standout_views::{Views, ViewData};
//!
//! let dir = tempfile::tempdir()?;
//! std::fs::write(
//!     dir.path().join("greeting.view.jinja"),
//!     "@if(formal)<b>Good day</b>@else<i>Hi</i>@endif, {{ name }}!",
//! )?;
//!
//! let views = Views::new(dir.path(), dir.path().join("cache"))?;
//! let html = views
//!     .view("greeting", ViewData::new(), ViewData::new())?
//!     .with("formal", true)
//!     .with("name", "<Ada>")
//!     .render()?;
//!
//! assert_eq!(html, "<b>Good day</b>, &lt;Ada&gt;!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extension Priority
//!
//! | Extension | Engine |
//! |-----------|--------|
//! | `.view.jinja` | compiled |
//! | `.jinja` | script |
//! | `.html`, `.css`, `.txt` | file |
//!
//! See [`compiler`] for the directive dialect.

pub mod compiler;
pub mod config;
pub mod engines;
mod error;
pub mod events;
pub mod facade;
mod factory;
mod filesystem;
mod finder;
mod view;
mod views;

pub use compiler::{Component, TemplateCompiler};
pub use config::{ViewPaths, ViewsConfig};
pub use engines::{Engine, EngineResolver};
pub use error::ViewError;
pub use events::{Dispatcher, QueueDispatcher};
pub use factory::{engine_name, ViewFactory, ENGINE_EXTENSIONS};
pub use filesystem::Filesystem;
pub use finder::{FileViewFinder, HINT_DELIMITER, VIEW_EXTENSIONS};
pub use view::View;
pub use views::{keys, Views, ViewsBuilder};

/// Data passed to a view: a JSON object.
pub type ViewData = serde_json::Map<String, serde_json::Value>;
