//! Dataset paths.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The path of a group or dataset in a hierarchical array store.
///
/// A path always starts with `/`, a non-root path does not end with `/`, and it contains no empty names (`//`).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(try_from = "String", into = "String")]
pub struct DatasetPath(String);

/// An invalid dataset path.
#[derive(Clone, Debug, Error)]
#[error("invalid dataset path {0}")]
pub struct DatasetPathError(String);

impl DatasetPath {
    /// Create a new dataset path from `path`.
    ///
    /// # Errors
    /// Returns [`DatasetPathError`] if `path` is not valid according to [`DatasetPath::validate`].
    pub fn new(path: &str) -> Result<Self, DatasetPathError> {
        if Self::validate(path) {
            Ok(Self(path.to_string()))
        } else {
            Err(DatasetPathError(path.to_string()))
        }
    }

    /// The root group.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true if this is the root group.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Extracts a string slice containing the path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a path:
    /// - a path always starts with `/`,
    /// - a non-root path cannot end with `/`, and
    /// - a path has no empty names (a `//` substring).
    #[must_use]
    pub fn validate(path: &str) -> bool {
        path.eq("/") || (path.starts_with('/') && !path.ends_with('/') && !path.contains("//"))
    }

    /// Returns the parent group of the path, or [`None`] for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
        }
    }

    /// Returns the last name of the path, empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Returns the path of the child `name` of this path.
    ///
    /// # Errors
    /// Returns [`DatasetPathError`] if `name` is empty or contains `/`.
    pub fn join(&self, name: &str) -> Result<Self, DatasetPathError> {
        if name.is_empty() || name.contains('/') {
            return Err(DatasetPathError(format!("{self} + {name}")));
        }
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// Returns the ancestors of the path from the root down to (but excluding) the path itself.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut ancestors = Vec::new();
        let mut parent = self.parent();
        while let Some(path) = parent {
            parent = path.parent();
            ancestors.push(path);
        }
        ancestors.reverse();
        ancestors
    }
}

impl TryFrom<&str> for DatasetPath {
    type Error = DatasetPathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl TryFrom<String> for DatasetPath {
    type Error = DatasetPathError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        if Self::validate(&path) {
            Ok(Self(path))
        } else {
            Err(DatasetPathError(path))
        }
    }
}

impl From<DatasetPath> for String {
    fn from(path: DatasetPath) -> Self {
        path.0
    }
}

/// Returns the group part of a slash separated dataset name, without the leading `/`.
///
/// `/test/one/two/three` has the group descriptor `test/one/two`, and a top-level name has an empty descriptor.
#[must_use]
pub fn group_descriptor(name: &str) -> &str {
    let name = name.strip_prefix('/').unwrap_or(name);
    name.rsplit_once('/').map_or("", |(group, _)| group)
}

/// Returns the last component of a slash separated dataset name.
///
/// `/test/one/two/three` has the dataset name `three`.
#[must_use]
pub fn dataset_name(name: &str) -> &str {
    name.rsplit_once('/').map_or(name, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_path() {
        assert!(DatasetPath::new("/").is_ok());
        assert!(DatasetPath::new("/a/b").is_ok());
        assert_eq!(DatasetPath::new("/a/b").unwrap().to_string(), "/a/b");
        assert!(DatasetPath::new("/a/b/").is_err());
        assert_eq!(
            DatasetPath::new("/a/b/").unwrap_err().to_string(),
            "invalid dataset path /a/b/"
        );
        assert!(DatasetPath::new("/a//b").is_err());
        assert!(DatasetPath::new("a/b").is_err());
    }

    #[test]
    fn dataset_path_hierarchy() {
        let path = DatasetPath::new("/a/b/c").unwrap();
        assert_eq!(path.name(), "c");
        assert_eq!(path.parent().unwrap().as_str(), "/a/b");
        assert_eq!(DatasetPath::new("/a").unwrap().parent(), Some(DatasetPath::root()));
        assert_eq!(DatasetPath::root().parent(), None);
        assert_eq!(DatasetPath::root().name(), "");
        assert_eq!(
            path.ancestors()
                .iter()
                .map(DatasetPath::as_str)
                .collect::<Vec<_>>(),
            vec!["/", "/a", "/a/b"]
        );
        assert_eq!(DatasetPath::root().join("x").unwrap().as_str(), "/x");
        assert_eq!(path.join("d").unwrap().as_str(), "/a/b/c/d");
        assert!(path.join("d/e").is_err());
        assert!(path.join("").is_err());
    }

    #[test]
    fn dataset_path_serde() {
        let path: DatasetPath = serde_json::from_str(r#""/t0/channel1""#).unwrap();
        assert_eq!(path.name(), "channel1");
        assert_eq!(serde_json::to_string(&path).unwrap(), r#""/t0/channel1""#);
        assert!(serde_json::from_str::<DatasetPath>(r#""t0/""#).is_err());
    }

    #[test]
    fn name_components() {
        assert_eq!(group_descriptor("/test/one/two/three"), "test/one/two");
        assert_eq!(dataset_name("/test/one/two/three"), "three");
        assert_eq!(group_descriptor("/three"), "");
        assert_eq!(dataset_name("three"), "three");
    }
}
