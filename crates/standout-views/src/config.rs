//! Construction parameters for [`Views`](crate::Views).
//!
//! [`ViewsConfig`] can be built in code or deserialized, e.g. from YAML:
//!
//! ```yaml
//! paths:
//!   - ./resources/views
//!   - ./vendor/views
//! cache: ./storage/views
//! namespaces:
//!   mail: ./resources/mail
//! ```
//!
//! `paths` (and each namespace) accepts a single path or a list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ViewError;

/// An ordered, non-empty list of view directories.
///
/// A single path normalizes to a one-element list. Order matters: lookups
/// try each directory in turn and the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PathsRepr", into = "Vec<PathBuf>")]
pub struct ViewPaths(Vec<PathBuf>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PathsRepr {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl From<PathsRepr> for ViewPaths {
    fn from(repr: PathsRepr) -> Self {
        match repr {
            PathsRepr::One(path) => ViewPaths(vec![path]),
            PathsRepr::Many(paths) => ViewPaths(paths),
        }
    }
}

impl From<ViewPaths> for Vec<PathBuf> {
    fn from(paths: ViewPaths) -> Self {
        paths.0
    }
}

impl ViewPaths {
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.0.iter()
    }
}

impl From<PathBuf> for ViewPaths {
    fn from(path: PathBuf) -> Self {
        ViewPaths(vec![path])
    }
}

impl From<&Path> for ViewPaths {
    fn from(path: &Path) -> Self {
        ViewPaths(vec![path.to_path_buf()])
    }
}

impl From<&str> for ViewPaths {
    fn from(path: &str) -> Self {
        ViewPaths(vec![PathBuf::from(path)])
    }
}

impl From<String> for ViewPaths {
    fn from(path: String) -> Self {
        ViewPaths(vec![PathBuf::from(path)])
    }
}

impl<P: Into<PathBuf>> From<Vec<P>> for ViewPaths {
    fn from(paths: Vec<P>) -> Self {
        ViewPaths(paths.into_iter().map(Into::into).collect())
    }
}

impl<P: Into<PathBuf>, const N: usize> From<[P; N]> for ViewPaths {
    fn from(paths: [P; N]) -> Self {
        ViewPaths(paths.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a ViewPaths {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Everything needed to build a [`Views`](crate::Views) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewsConfig {
    /// Directories searched for views, in order.
    pub paths: ViewPaths,
    /// Directory where compiled templates are written.
    pub cache: PathBuf,
    /// Extra directories addressed as `namespace::view.name`.
    #[serde(default)]
    pub namespaces: BTreeMap<String, ViewPaths>,
}

impl ViewsConfig {
    pub fn new(paths: impl Into<ViewPaths>, cache: impl Into<PathBuf>) -> Self {
        Self {
            paths: paths.into(),
            cache: cache.into(),
            namespaces: BTreeMap::new(),
        }
    }

    /// Parses a YAML document and validates it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ViewError> {
        let config: ViewsConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ViewError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ViewError::io(path, e))?;
        Self::from_yaml(&yaml)
    }

    pub fn namespace(mut self, name: impl Into<String>, paths: impl Into<ViewPaths>) -> Self {
        self.namespaces.insert(name.into(), paths.into());
        self
    }

    /// Checks that the config can produce a working view setup.
    pub fn validate(&self) -> Result<(), ViewError> {
        if self.paths.is_empty() {
            return Err(ViewError::Config(
                "at least one view path is required".to_string(),
            ));
        }
        if self.cache.as_os_str().is_empty() {
            return Err(ViewError::Config("cache path must not be empty".to_string()));
        }
        for (name, paths) in &self.namespaces {
            if name.is_empty() || name.contains("::") {
                return Err(ViewError::Config(format!("invalid namespace name [{name}]")));
            }
            if paths.is_empty() {
                return Err(ViewError::Config(format!(
                    "namespace [{name}] has no paths"
                )));
            }
        }
        Ok(())
    }
}
