//! The view template compiler.
//!
//! [`TemplateCompiler`] translates the directive dialect used by `.view.jinja`
//! files into plain minijinja source and caches the result on disk, keyed by
//! a SHA-256 of the source path.
//!
//! ## Dialect
//!
//! | Source | Compiled |
//! |--------|----------|
//! | `{{ expr }}` | escaped output |
//! | `{!! expr !!}` | raw output |
//! | `@{{ expr }}` | the literal text `{{ expr }}` |
//! | `{{-- note --}}` | removed |
//! | `@if(c)` `@elseif(c)` `@else` `@endif` | `{% if %}` chains |
//! | `@unless(c)` `@isset(v)` `@empty(v)` | negated or defined checks |
//! | `@foreach(xs as x)` `@foreach(m as k => v)` | `{% for %}` |
//! | `@forelse(xs as x)` … `@empty` … `@endforelse` | `{% for %}…{% else %}` |
//! | `@include('v')` `@extends('v')` | include and inheritance by view name |
//! | `@section('n')` `@yield('n')` `@parent` | blocks |
//! | `@json(expr)` | `tojson` output |
//! | `@verbatim … @endverbatim` | emitted untouched |
//! | `<x-name a="v" :b="expr">…</x-name>` | component include |
//!
//! Plain minijinja tags (`{% … %}`) pass through, so the dialect is a superset.
//!
//! ## Extension points
//!
//! - [`TemplateCompiler::component`] aliases a tag to a view.
//! - [`TemplateCompiler::directive`] adds a custom `@name(args)` directive.
//! - [`TemplateCompiler::extend`] adds a precompiler run on raw source.

mod components;
mod syntax;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ViewError;
use crate::filesystem::Filesystem;
use crate::finder::has_extension;

pub(crate) use components::COMPONENT_VIEW_FN;

/// Source files with this extension are compiled before execution.
pub const COMPILED_EXTENSION: &str = "view.jinja";

/// Suffix of cached artifacts inside the cache directory.
pub const ARTIFACT_SUFFIX: &str = ".jinja";

/// Name under which the dynamic component is registered.
pub const DYNAMIC_COMPONENT: &str = "dynamic-component";

/// What a component tag renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Render the named view.
    View(String),
    /// Render the view named by the tag's `component` attribute.
    Dynamic,
}

type DirectiveFn = dyn Fn(Option<&str>) -> String + Send + Sync;
type PrecompilerFn = dyn Fn(&str) -> String + Send + Sync;

/// Compiles dialect templates into cached minijinja source.
pub struct TemplateCompiler {
    files: Arc<Filesystem>,
    cache_path: PathBuf,
    components: RwLock<HashMap<String, Component>>,
    directives: RwLock<HashMap<String, Arc<DirectiveFn>>>,
    precompilers: RwLock<Vec<Arc<PrecompilerFn>>>,
}

impl TemplateCompiler {
    /// Creates a compiler writing artifacts under `cache_path`.
    ///
    /// The dynamic component is registered immediately.
    pub fn new(files: Arc<Filesystem>, cache_path: impl Into<PathBuf>) -> Self {
        let compiler = Self {
            files,
            cache_path: cache_path.into(),
            components: RwLock::new(HashMap::new()),
            directives: RwLock::new(HashMap::new()),
            precompilers: RwLock::new(Vec::new()),
        };
        compiler.register_component(DYNAMIC_COMPONENT, Component::Dynamic);
        compiler
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Whether `path` is a source this compiler handles.
    pub fn handles(&self, path: &Path) -> bool {
        has_extension(path, COMPILED_EXTENSION)
    }

    /// Location of the cached artifact for `path`.
    pub fn compiled_path(&self, path: &Path) -> PathBuf {
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        self.cache_path
            .join(format!("{}{}", hex::encode(digest), ARTIFACT_SUFFIX))
    }

    /// Whether the artifact is missing or older than its source.
    pub fn is_expired(&self, path: &Path) -> Result<bool, ViewError> {
        let compiled = self.compiled_path(path);
        if !self.files.exists(&compiled) {
            return Ok(true);
        }
        Ok(self.files.last_modified(path)? >= self.files.last_modified(&compiled)?)
    }

    /// Compiles `path` and atomically writes the artifact.
    pub fn compile(&self, path: &Path) -> Result<PathBuf, ViewError> {
        let source = self.files.get(path)?;
        let compiled = self.compile_string(&source).map_err(|err| match err {
            ViewError::Syntax(message) => ViewError::Compile {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;

        self.files.ensure_directory_exists(&self.cache_path)?;
        let target = self.compiled_path(path);
        self.files.replace(&target, &compiled)?;
        debug!(source = %path.display(), artifact = %target.display(), "compiled view");
        Ok(target)
    }

    /// Compiles `path` if its artifact is stale and returns the artifact path.
    pub fn ensure_compiled(&self, path: &Path) -> Result<PathBuf, ViewError> {
        if self.is_expired(path)? {
            self.compile(path)
        } else {
            Ok(self.compiled_path(path))
        }
    }

    /// Translates dialect source into minijinja source.
    pub fn compile_string(&self, source: &str) -> Result<String, ViewError> {
        let mut raw_blocks = Vec::new();
        let mut text = syntax::extract_raw_blocks(source, &mut raw_blocks);

        for precompiler in self.precompilers() {
            text = precompiler(&text);
        }

        text = syntax::strip_comments(&text);
        text = components::compile_components(&text, &self.components())?;
        text = syntax::compile_echos(&text);

        let directives = self.directives();
        text = syntax::compile_statements(
            &text,
            |word| directives.contains_key(word) || syntax::BUILTIN_DIRECTIVES.contains(&word),
            |word, args| match directives.get(word) {
                Some(directive) => Ok(directive(args)),
                None => syntax::compile_builtin(word, args),
            },
        )?;

        Ok(syntax::restore_raw_blocks(&text, &raw_blocks))
    }

    /// Aliases the `<x-{alias}>` tag to `view`.
    pub fn component(&self, alias: impl Into<String>, view: impl Into<String>) {
        self.register_component(alias, Component::View(view.into()));
    }

    /// Snapshot of the registered components.
    pub fn components(&self) -> HashMap<String, Component> {
        self.components
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The view rendered for a component tag name.
    ///
    /// Unregistered names map to `components.{name}`, or
    /// `namespace::components.{name}` for `namespace::name`.
    pub fn component_view(&self, name: &str) -> String {
        if let Some(Component::View(view)) = self.components().get(name) {
            return view.clone();
        }
        match name.split_once(crate::finder::HINT_DELIMITER) {
            Some((namespace, rest)) => format!("{namespace}::components.{rest}"),
            None => format!("components.{name}"),
        }
    }

    /// Registers a custom `@name(args)` directive.
    ///
    /// Custom directives take precedence over built-in ones. The callback
    /// receives the raw text between the parentheses, if any, and returns the
    /// minijinja source to emit.
    pub fn directive<F>(&self, name: impl Into<String>, directive: F)
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(directive = %name, "directive registered");
        self.directives
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, Arc::new(directive));
    }

    /// Registers a precompiler that rewrites raw source before other passes.
    pub fn extend<F>(&self, precompiler: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.precompilers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(precompiler));
    }

    /// Deletes every cached artifact and returns how many were removed.
    pub fn flush_compiled(&self) -> Result<usize, ViewError> {
        let removed = self.files.delete_matching(&self.cache_path, ARTIFACT_SUFFIX)?;
        debug!(removed, cache = %self.cache_path.display(), "flushed compiled views");
        Ok(removed)
    }

    fn register_component(&self, alias: impl Into<String>, component: Component) {
        let alias = alias.into();
        debug!(component = %alias, "component registered");
        self.components
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(alias, component);
    }

    fn directives(&self) -> HashMap<String, Arc<DirectiveFn>> {
        self.directives
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn precompilers(&self) -> Vec<Arc<PrecompilerFn>> {
        self.precompilers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCompiler")
            .field("cache_path", &self.cache_path)
            .field("components", &self.components())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn compiler(cache: &Path) -> TemplateCompiler {
        TemplateCompiler::new(Arc::new(Filesystem::new()), cache)
    }

    #[test]
    fn test_dynamic_component_registered_on_construction() {
        let cache = tempfile::tempdir().unwrap();
        let compiler = compiler(cache.path());
        assert_eq!(
            compiler.components().get(DYNAMIC_COMPONENT),
            Some(&Component::Dynamic)
        );
    }

    #[test]
    fn test_compile_string_runs_all_passes() {
        let cache = tempfile::tempdir().unwrap();
        let compiler = compiler(cache.path());
        let out = compiler
            .compile_string("{{-- hidden --}}@if(show)<b>{{ name }}</b>@endif")
            .unwrap();
        assert_eq!(out, "{% if show %}<b>{{ (name)|e }}</b>{% endif %}");
    }

    #[test]
    fn test_verbatim_is_not_compiled() {
        let cache = tempfile::tempdir().unwrap();
        let compiler = compiler(cache.path());
        let out = compiler
            .compile_string("@verbatim{{ x }} @if(y)@endverbatim")
            .unwrap();
        assert_eq!(out, "{% raw %}{{ x }} @if(y){% endraw %}");
    }

    #[test]
    fn test_custom_directive_and_precompiler() {
        let cache = tempfile::tempdir().unwrap();
        let compiler = compiler(cache.path());
        compiler.directive("upper", |args| {
            format!("{{{{ ({})|upper }}}}", args.unwrap_or("''"))
        });
        compiler.extend(|source| source.replace("[[today]]", "2024-01-01"));

        let out = compiler
            .compile_string("@upper(name) on [[today]]")
            .unwrap();
        assert_eq!(out, "{{ (name)|upper }} on 2024-01-01");
    }

    #[test]
    fn test_component_view_resolution() {
        let cache = tempfile::tempdir().unwrap();
        let compiler = compiler(cache.path());
        compiler.component("button", "ui.button");

        assert_eq!(compiler.component_view("button"), "ui.button");
        assert_eq!(compiler.component_view("alert"), "components.alert");
        assert_eq!(compiler.component_view("mail::panel"), "mail::components.panel");
    }

    #[test]
    fn test_compile_writes_artifact() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let source = views.path().join("hello.view.jinja");
        fs::write(&source, "Hello {{ name }}").unwrap();

        let compiler = compiler(&cache.path().join("nested"));
        assert!(compiler.is_expired(&source).unwrap());

        let artifact = compiler.ensure_compiled(&source).unwrap();
        assert_eq!(artifact, compiler.compiled_path(&source));
        assert!(artifact.starts_with(cache.path().join("nested")));
        assert_eq!(fs::read_to_string(&artifact).unwrap(), "Hello {{ (name)|e }}");
    }

    #[test]
    fn test_compiled_path_is_stable_and_distinct() {
        let compiler = compiler(Path::new("cache"));
        let a = compiler.compiled_path(Path::new("views/a.view.jinja"));
        assert_eq!(a, compiler.compiled_path(Path::new("views/a.view.jinja")));
        assert_ne!(a, compiler.compiled_path(Path::new("views/b.view.jinja")));
        assert!(a.to_string_lossy().ends_with(ARTIFACT_SUFFIX));
    }

    #[test]
    fn test_syntax_error_names_source() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let source = views.path().join("broken.view.jinja");
        fs::write(&source, "@if(open").unwrap();

        match compiler(cache.path()).compile(&source).unwrap_err() {
            ViewError::Compile { path, message } => {
                assert_eq!(path, source);
                assert!(message.contains("@if"));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_flush_compiled() {
        let views = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let source = views.path().join("a.view.jinja");
        fs::write(&source, "a").unwrap();
        let compiler = compiler(cache.path());

        compiler.compile(&source).unwrap();
        assert_eq!(compiler.flush_compiled().unwrap(), 1);
        assert!(compiler.is_expired(&source).unwrap());
    }

    #[test]
    fn test_handles_only_compiled_extension() {
        let compiler = compiler(Path::new("cache"));
        assert!(compiler.handles(Path::new("a/page.view.jinja")));
        assert!(!compiler.handles(Path::new("a/page.jinja")));
        assert!(!compiler.handles(Path::new("a/page.html")));
    }
}
