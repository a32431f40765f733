//! Error types for the container crate.

use thiserror::Error;

/// Errors raised while registering or resolving services.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No binding, instance or alias matches the key.
    #[error("no service bound for key '{0}'")]
    NotFound(String),

    /// The stored service is not of the requested type.
    #[error("service '{key}' is not a {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },

    /// A key was aliased to itself.
    #[error("[{0}] is aliased to itself")]
    SelfAlias(String),

    /// A factory resolved (directly or indirectly) its own key.
    #[error("circular dependency while resolving: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// A factory failed to build its service.
    #[error("failed to build service '{key}': {source}")]
    Build {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ContainerError {
    /// Wraps a factory failure for `key`.
    pub fn build(
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ContainerError::Build {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_display_joins_chain() {
        let err = ContainerError::CircularDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "circular dependency while resolving: a -> b -> a"
        );
    }

    #[test]
    fn test_build_keeps_source() {
        let err = ContainerError::build("files", "disk on fire");
        assert!(err.to_string().contains("files"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
