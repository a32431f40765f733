//! # Standout Container
//!
//! A small service container: string keys map to factory closures that build
//! services lazily. Bindings are either transient (the factory runs on every
//! resolution) or shared (the first result is cached for the lifetime of the
//! container). Keys can be aliased.
//!
//! ```rust
//! use standout_container::Container;
//!
//! struct Clock(u64);
//!
//! let mut container = Container::new();
//! container.singleton("clock", |_| Ok(Clock(42)));
//! container.alias("clock", "time").unwrap();
//!
//! let a = container.resolve::<Clock>("clock").unwrap();
//! let b = container.resolve::<Clock>("time").unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! assert_eq!(a.0, 42);
//! ```

mod container;
mod error;

pub use container::{Container, Instance};
pub use error::{ContainerError, Result};
