//! Hierarchical array stores.
//!
//! A store holds datasets (multidimensional arrays with an element type and attributes) organised in groups addressed by [`DatasetPath`]s.
//! Access goes through the traits:
//!  - [`ReadableArrayStore`]: open and close datasets, query their shape, element type and attributes, and read them in full or by [`Hyperslab`],
//!  - [`ListableArrayStore`]: enumerate every dataset reachable from the root group, and
//!  - [`WritableArrayStore`]: create groups and datasets, write hyperslabs, and set attributes.
//!
//! This crate includes the [`MemoryArrayStore`] and the [`UsageLogArrayStore`] decorator.
//! Other stores (e.g. a binding to an HDF5 library) can implement the traits.

mod memory;
mod usage_log;

pub use memory::MemoryArrayStore;
pub use usage_log::UsageLogArrayStore;

use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

use crate::{
    element::{ElementBuffer, ElementType},
    hyperslab::{Hyperslab, HyperslabError},
    path::{DatasetPath, DatasetPathError},
};

/// A handle to an open dataset.
///
/// A handle is released by passing it to [`ReadableArrayStore::close`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ArrayHandle {
    id: u64,
    path: DatasetPath,
}

impl ArrayHandle {
    /// Create a new handle with a store specific `id` for the dataset at `path`.
    #[must_use]
    pub const fn new(id: u64, path: DatasetPath) -> Self {
        Self { id, path }
    }

    /// Returns the store specific id of the handle.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the path of the dataset.
    #[must_use]
    pub const fn path(&self) -> &DatasetPath {
        &self.path
    }
}

/// A store error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// There is no node at the path.
    #[error("{0} does not exist")]
    NotFound(DatasetPath),
    /// The node at the path is not a dataset.
    #[error("{0} is not a dataset")]
    NotADataset(DatasetPath),
    /// The node at the path is not a group.
    #[error("{0} is not a group")]
    NotAGroup(DatasetPath),
    /// The handle is closed or was not opened by this store.
    #[error("invalid handle {id} for {path}")]
    InvalidHandle {
        /// The handle id.
        id: u64,
        /// The dataset path.
        path: DatasetPath,
    },
    /// The hyperslab is incompatible with the dataset.
    #[error("invalid hyperslab for {0}: {1}")]
    Hyperslab(DatasetPath, HyperslabError),
    /// The elements are incompatible with the dataset.
    #[error("cannot write {got} elements to {path} of {expected}")]
    IncompatibleElements {
        /// The dataset path.
        path: DatasetPath,
        /// The dataset element type.
        expected: ElementType,
        /// The element type of the written buffer.
        got: ElementType,
    },
    /// An invalid dataset path.
    #[error(transparent)]
    InvalidPath(#[from] DatasetPathError),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StoreError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StoreError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Readable array store traits.
pub trait ReadableArrayStore: Send + Sync {
    /// Open the dataset at `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] or [`StoreError::NotADataset`] if there is no dataset at `path`.
    fn open(&self, path: &DatasetPath) -> Result<ArrayHandle, StoreError>;

    /// Close a dataset, releasing `handle`.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidHandle`] if the handle is not open in this store.
    fn close(&self, handle: ArrayHandle) -> Result<(), StoreError>;

    /// Returns the extents of the dataset, outermost axis first.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid.
    fn shape(&self, handle: &ArrayHandle) -> Result<Vec<u64>, StoreError>;

    /// Returns the logical element type of the dataset.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid.
    fn element_type(&self, handle: &ArrayHandle) -> Result<ElementType, StoreError>;

    /// Read the whole dataset.
    ///
    /// The storage primitive of the returned buffer may differ in signedness from [`element_type`](ReadableArrayStore::element_type).
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid or there is an underlying store error.
    fn read_full(&self, handle: &ArrayHandle) -> Result<ElementBuffer, StoreError> {
        let shape = self.shape(handle)?;
        self.read_hyperslab(handle, &Hyperslab::new_with_shape(shape))
    }

    /// Read the elements of `hyperslab` of the dataset, in row-major order.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid, the hyperslab does not match the dataset, or there is an underlying store error.
    fn read_hyperslab(
        &self,
        handle: &ArrayHandle,
        hyperslab: &Hyperslab,
    ) -> Result<ElementBuffer, StoreError>;

    /// Returns the attribute `name` of the dataset, or [`None`] if it is absent.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid.
    fn attribute(
        &self,
        handle: &ArrayHandle,
        name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Listable array store traits.
pub trait ListableArrayStore: Send + Sync {
    /// Returns the path of every dataset reachable from the root group, in depth-first order.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying store error.
    fn list_names(&self) -> Result<Vec<DatasetPath>, StoreError>;
}

/// Writable array store traits.
pub trait WritableArrayStore: Send + Sync {
    /// Create the group at `path` and any missing ancestor groups.
    ///
    /// Existing groups are left unchanged.
    ///
    /// # Errors
    /// Returns [`StoreError::NotAGroup`] if `path` or one of its ancestors is a dataset.
    fn create_group(&self, path: &DatasetPath) -> Result<(), StoreError>;

    /// Create a dataset at `path` with `shape` and `element_type`, replacing any existing dataset, and open it.
    ///
    /// The parent group must exist.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the parent group does not exist or `path` is a group.
    fn create_dataset(
        &self,
        path: &DatasetPath,
        shape: &[u64],
        element_type: ElementType,
    ) -> Result<ArrayHandle, StoreError>;

    /// Write `elements` to `hyperslab` of the dataset.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid, the hyperslab does not match the dataset, or the elements are incompatible with the dataset.
    fn write_hyperslab(
        &self,
        handle: &ArrayHandle,
        hyperslab: &Hyperslab,
        elements: &ElementBuffer,
    ) -> Result<(), StoreError>;

    /// Set the attribute `name` of the dataset to `value`.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the handle is invalid.
    fn set_attribute(
        &self,
        handle: &ArrayHandle,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// A summary of a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
#[display("{}D: {path} {element_type} ({})", shape.len(), shape.iter().join("x"))]
pub struct DatasetInfo {
    path: DatasetPath,
    shape: Vec<u64>,
    element_type: ElementType,
}

impl DatasetInfo {
    /// Returns the dataset path.
    #[must_use]
    pub const fn path(&self) -> &DatasetPath {
        &self.path
    }

    /// Returns the dataset extents.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Returns the logical element type of the dataset.
    #[must_use]
    pub const fn element_type(&self) -> ElementType {
        self.element_type
    }
}

/// Return a [`DatasetInfo`] for the dataset at `path`.
///
/// # Errors
/// Returns a [`StoreError`] if the dataset cannot be opened.
pub fn dataset_info<TStore: ?Sized + ReadableArrayStore>(
    store: &TStore,
    path: &DatasetPath,
) -> Result<DatasetInfo, StoreError> {
    let handle = store.open(path)?;
    let info = store.shape(&handle).and_then(|shape| {
        Ok(DatasetInfo {
            path: path.clone(),
            shape,
            element_type: store.element_type(&handle)?,
        })
    });
    store.close(handle)?;
    info
}

/// Return a [`DatasetInfo`] for every dataset in the store.
///
/// # Errors
/// Returns a [`StoreError`] if the store cannot be listed or a dataset cannot be opened.
pub fn dataset_infos<TStore: ?Sized + ReadableArrayStore + ListableArrayStore>(
    store: &TStore,
) -> Result<Vec<DatasetInfo>, StoreError> {
    store
        .list_names()?
        .iter()
        .map(|path| dataset_info(store, path))
        .collect()
}
