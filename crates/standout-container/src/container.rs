//! The service container.
//!
//! Services are registered under string keys as factory closures and built on
//! demand. A factory receives the container itself so it can resolve the
//! services it depends on.
//!
//! # Lifetimes
//!
//! | Registration | Behavior on [`Container::resolve`] |
//! |--------------|------------------------------------|
//! | [`bind`](Container::bind) | factory runs every time |
//! | [`singleton`](Container::singleton) | factory runs once, result is cached |
//! | [`instance`](Container::instance) | pre-built value is returned |
//!
//! Re-registering a key replaces the previous binding, its cached value and
//! any alias of the same name.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::{ContainerError, Result};

/// A type-erased service as stored in the container.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Container) -> Result<Instance> + Send + Sync>;

struct Binding {
    factory: Factory,
    shared: bool,
    resolved: OnceCell<Instance>,
}

/// A registry of lazily constructed services.
///
/// `Container` is `Send + Sync`; shared bindings are initialized at most once
/// even when resolved from several threads.
///
/// # Example
///
/// ```rust
/// use standout_container::Container;
///
/// struct Config { name: String }
/// struct Greeter { greeting: String }
///
/// let mut container = Container::new();
/// container.singleton("config", |_| Ok(Config { name: "world".into() }));
/// container.bind("greeter", |c| {
///     let config = c.resolve::<Config>("config")?;
///     Ok(Greeter { greeting: format!("hello {}", config.name) })
/// });
///
/// let greeter = container.resolve::<Greeter>("greeter").unwrap();
/// assert_eq!(greeter.greeting, "hello world");
/// ```
#[derive(Default)]
pub struct Container {
    bindings: HashMap<String, Binding>,
    instances: HashMap<String, Instance>,
    aliases: HashMap<String, String>,
    /// Keys currently being built, per thread.
    resolving: Mutex<HashMap<ThreadId, Vec<String>>>,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transient factory: every resolution builds a new value.
    pub fn bind<T, F>(&mut self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.register(key.into(), erase(factory), false);
    }

    /// Registers a shared factory: the first resolution is cached.
    pub fn singleton<T, F>(&mut self, key: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
    {
        self.register(key.into(), erase(factory), true);
    }

    /// Registers an already constructed value as a shared service.
    pub fn instance<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        self.aliases.remove(&key);
        self.bindings.remove(&key);
        debug!(key = %key, "instance registered");
        self.instances.insert(key, Arc::new(value));
    }

    /// Makes `alias` resolve to whatever `key` resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::SelfAlias`] if the alias would point back at
    /// itself, directly or through other aliases.
    pub fn alias(&mut self, key: impl Into<String>, alias: impl Into<String>) -> Result<()> {
        let key = key.into();
        let alias = alias.into();
        if key == alias || self.canonical(&key) == alias {
            return Err(ContainerError::SelfAlias(alias));
        }
        debug!(key = %key, alias = %alias, "alias registered");
        self.aliases.insert(alias, key);
        Ok(())
    }

    /// Resolves the service registered under `key` (or an alias of it).
    ///
    /// # Errors
    ///
    /// - [`ContainerError::NotFound`] when nothing matches `key`
    /// - [`ContainerError::TypeMismatch`] when the service is not a `T`
    /// - [`ContainerError::CircularDependency`] when a factory needs its own key
    /// - whatever the factory itself returns
    pub fn resolve<T>(&self, key: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve_instance(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolves `key` without downcasting.
    pub fn resolve_instance(&self, key: &str) -> Result<Instance> {
        let canonical = self.canonical(key);
        trace!(key, canonical, "resolving service");

        if let Some(instance) = self.instances.get(canonical) {
            return Ok(Arc::clone(instance));
        }

        let binding = self
            .bindings
            .get(canonical)
            .ok_or_else(|| ContainerError::NotFound(key.to_string()))?;

        if let Some(instance) = binding.resolved.get() {
            return Ok(Arc::clone(instance));
        }

        let _guard = self.enter(canonical)?;
        if binding.shared {
            binding
                .resolved
                .get_or_try_init(|| (binding.factory)(self))
                .map(Arc::clone)
        } else {
            (binding.factory)(self)
        }
    }

    /// Whether `key` (or the key it aliases) has a binding or instance.
    pub fn bound(&self, key: &str) -> bool {
        let canonical = self.canonical(key);
        self.bindings.contains_key(canonical) || self.instances.contains_key(canonical)
    }

    /// Whether `key` resolves to a shared service.
    pub fn is_shared(&self, key: &str) -> bool {
        let canonical = self.canonical(key);
        self.instances.contains_key(canonical)
            || self.bindings.get(canonical).is_some_and(|b| b.shared)
    }

    /// Follows aliases to the concrete key.
    fn canonical<'a>(&'a self, key: &'a str) -> &'a str {
        let mut current = key;
        // alias() refuses cycles, so the chain is at most aliases.len() long
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    fn register(&mut self, key: String, factory: Factory, shared: bool) {
        self.aliases.remove(&key);
        self.instances.remove(&key);
        debug!(key = %key, shared, "binding registered");
        self.bindings.insert(
            key,
            Binding {
                factory,
                shared,
                resolved: OnceCell::new(),
            },
        );
    }

    fn enter(&self, key: &str) -> Result<ResolveGuard<'_>> {
        let thread = thread::current().id();
        let mut resolving = self
            .resolving
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stack = resolving.entry(thread).or_default();
        if stack.iter().any(|k| k == key) {
            let mut chain = stack.clone();
            chain.push(key.to_string());
            return Err(ContainerError::CircularDependency { chain });
        }
        stack.push(key.to_string());
        Ok(ResolveGuard {
            container: self,
            thread,
        })
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bindings: Vec<_> = self.bindings.keys().collect();
        bindings.sort();
        let mut instances: Vec<_> = self.instances.keys().collect();
        instances.sort();
        f.debug_struct("Container")
            .field("bindings", &bindings)
            .field("instances", &instances)
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Pops the resolution stack when a build finishes, successfully or not.
struct ResolveGuard<'a> {
    container: &'a Container,
    thread: ThreadId,
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        let mut resolving = self
            .container
            .resolving
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(stack) = resolving.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                resolving.remove(&self.thread);
            }
        }
    }
}

fn erase<T, F>(factory: F) -> Factory
where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| factory(container).map(|value| Arc::new(value) as Instance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    fn counting_factory(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(&Container) -> Result<Counter> + Send + Sync + 'static {
        move |_| Ok(Counter(calls.fetch_add(1, Ordering::SeqCst)))
    }

    #[test]
    fn test_singleton_returns_identical_instance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut container = Container::new();
        container.singleton("counter", counting_factory(calls.clone()));

        let a = container.resolve::<Counter>("counter").unwrap();
        let b = container.resolve::<Counter>("counter").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(container.is_shared("counter"));
    }

    #[test]
    fn test_bind_returns_fresh_instances() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut container = Container::new();
        container.bind("counter", counting_factory(calls.clone()));

        let a = container.resolve::<Counter>("counter").unwrap();
        let b = container.resolve::<Counter>("counter").unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!((a.0, b.0), (0, 1));
        assert!(!container.is_shared("counter"));
    }

    #[test]
    fn test_rebinding_overwrites_previous_factory() {
        let mut container = Container::new();
        container.singleton("answer", |_| Ok(Counter(1)));
        assert_eq!(container.resolve::<Counter>("answer").unwrap().0, 1);

        container.singleton("answer", |_| Ok(Counter(2)));
        assert_eq!(container.resolve::<Counter>("answer").unwrap().0, 2);

        container.bind("answer", |_| Ok(Counter(3)));
        assert_eq!(container.resolve::<Counter>("answer").unwrap().0, 3);
    }

    #[test]
    fn test_alias_resolves_to_target() {
        let mut container = Container::new();
        container.singleton("view", |_| Ok(Counter(7)));
        container.alias("view", "view.factory").unwrap();
        container.alias("view.factory", "factory").unwrap();

        let direct = container.resolve::<Counter>("view").unwrap();
        let aliased = container.resolve::<Counter>("factory").unwrap();
        assert!(Arc::ptr_eq(&direct, &aliased));
        assert!(container.bound("factory"));
    }

    #[test]
    fn test_alias_to_itself_is_rejected() {
        let mut container = Container::new();
        assert!(matches!(
            container.alias("a", "a"),
            Err(ContainerError::SelfAlias(_))
        ));

        container.alias("a", "b").unwrap();
        assert!(matches!(
            container.alias("b", "a"),
            Err(ContainerError::SelfAlias(_))
        ));
    }

    #[test]
    fn test_binding_an_alias_name_replaces_alias() {
        let mut container = Container::new();
        container.singleton("real", |_| Ok(Counter(1)));
        container.alias("real", "name").unwrap();
        container.singleton("name", |_| Ok(Counter(2)));

        assert_eq!(container.resolve::<Counter>("name").unwrap().0, 2);
        assert_eq!(container.resolve::<Counter>("real").unwrap().0, 1);
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let container = Container::new();
        let err = container.resolve::<Counter>("missing").unwrap_err();
        assert!(matches!(err, ContainerError::NotFound(ref k) if k == "missing"));
        assert!(!container.bound("missing"));
    }

    #[test]
    fn test_wrong_type_is_mismatch() {
        let mut container = Container::new();
        container.instance("name", String::from("standout"));

        let err = container.resolve::<Counter>("name").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
        assert_eq!(*container.resolve::<String>("name").unwrap(), "standout");
    }

    #[test]
    fn test_factories_resolve_dependencies() {
        let mut container = Container::new();
        container.singleton("base", |_| Ok(Counter(20)));
        container.bind("derived", |c| {
            let base = c.resolve::<Counter>("base")?;
            Ok(Counter(base.0 + 1))
        });

        assert_eq!(container.resolve::<Counter>("derived").unwrap().0, 21);
    }

    #[test]
    fn test_circular_dependency_is_detected() {
        let mut container = Container::new();
        container.singleton("a", |c| c.resolve::<Counter>("b").map(|b| Counter(b.0)));
        container.singleton("b", |c| c.resolve::<Counter>("a").map(|a| Counter(a.0)));

        let err = container.resolve::<Counter>("a").unwrap_err();
        match err {
            ContainerError::CircularDependency { chain } => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("expected circular dependency, got {other:?}"),
        }

        // The stack unwinds, so unrelated keys still resolve afterwards.
        container.singleton("c", |_| Ok(Counter(0)));
        assert!(container.resolve::<Counter>("c").is_ok());
    }

    #[test]
    fn test_failed_singleton_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut container = Container::new();
        container.singleton("flaky", move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ContainerError::build("flaky", "first attempt fails"))
            } else {
                Ok(Counter(1))
            }
        });

        assert!(container.resolve::<Counter>("flaky").is_err());
        assert!(container.resolve::<Counter>("flaky").is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_singleton_shared_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut container = Container::new();
        container.singleton("counter", counting_factory(calls.clone()));
        let container = Arc::new(container);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let container = Arc::clone(&container);
                thread::spawn(move || container.resolve::<Counter>("counter").unwrap())
            })
            .collect();
        let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(resolved.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
