//! Lazy plane sources.
//!
//! A [`VirtualPlaneSource`] reads one plane of a dataset per request, with one hyperslab read per call and no caching.
//! It holds the dataset open from construction until [`VirtualPlaneSource::close`] (or drop).

use thiserror::Error;

use crate::{
    convert::{narrow, NarrowPolicy},
    element::ElementType,
    hyperslab::{num_planes, Hyperslab},
    path::DatasetPath,
    plane::{Plane, PlaneError, PlaneShape},
    store::{ArrayHandle, ReadableArrayStore, StoreError},
    topology::{self, StackPlan, UnsupportedRankError},
};

/// A read was attempted after the source was closed.
#[derive(Clone, Debug, Error)]
#[error("plane source for {0} is closed")]
pub struct ClosedSourceError(DatasetPath);

/// A virtual plane source error.
#[derive(Debug, Error)]
pub enum VirtualSourceError {
    /// The source is closed.
    #[error(transparent)]
    Closed(#[from] ClosedSourceError),
    /// The plane index is not less than the plane count.
    #[error("plane index {index} is out of bounds for {count} planes")]
    PlaneIndexOutOfBounds {
        /// The requested plane index.
        index: u64,
        /// The number of planes.
        count: u64,
    },
    /// The dataset cannot be read one plane at a time.
    #[error("planes of {0} cannot be read one at a time")]
    Unsupported(StackPlan),
    /// The dataset rank is not supported.
    #[error(transparent)]
    UnsupportedRank(#[from] UnsupportedRankError),
    /// A store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The plane read does not match the plane shape.
    #[error(transparent)]
    Plane(#[from] PlaneError),
}

#[derive(Debug)]
enum State {
    Open(ArrayHandle),
    Closed,
}

/// A lazy plane sequence over an open dataset.
///
/// Planes are the 2D slices of a grayscale rank 3 or rank 4 dataset, indexed in row-major order over the leading axes.
pub struct VirtualPlaneSource<'a, TStore: ?Sized + ReadableArrayStore> {
    store: &'a TStore,
    state: State,
    path: DatasetPath,
    extents: Vec<u64>,
    element_type: ElementType,
    plan: StackPlan,
    policy: NarrowPolicy,
}

impl<'a, TStore: ?Sized + ReadableArrayStore> VirtualPlaneSource<'a, TStore> {
    /// Open the dataset at `path` of `store` as a virtual plane source.
    ///
    /// # Errors
    /// Returns a [`VirtualSourceError`] if the dataset cannot be opened or cannot be read one plane at a time.
    pub fn open(
        store: &'a TStore,
        path: &DatasetPath,
        policy: NarrowPolicy,
    ) -> Result<Self, VirtualSourceError> {
        let handle = store.open(path)?;
        Self::new(store, handle, policy)
    }

    /// Create a virtual plane source taking ownership of an open `handle`.
    ///
    /// The handle is closed if the source cannot be created.
    ///
    /// # Errors
    /// Returns a [`VirtualSourceError`] if the dataset cannot be read one plane at a time.
    pub fn new(
        store: &'a TStore,
        handle: ArrayHandle,
        policy: NarrowPolicy,
    ) -> Result<Self, VirtualSourceError> {
        let describe = || -> Result<_, VirtualSourceError> {
            let extents = store.shape(&handle)?;
            let element_type = store.element_type(&handle)?;
            let plan = topology::plan(&extents)?;
            if plan.supports_virtual() {
                Ok((extents, element_type, plan))
            } else {
                Err(VirtualSourceError::Unsupported(plan))
            }
        };
        match describe() {
            Ok((extents, element_type, plan)) => {
                log::info!(
                    "virtual plane source for {}: {} planes of {} {element_type}",
                    handle.path(),
                    num_planes(&extents),
                    plan.plane_shape()
                );
                Ok(Self {
                    store,
                    path: handle.path().clone(),
                    state: State::Open(handle),
                    extents,
                    element_type,
                    plan,
                    policy,
                })
            }
            Err(err) => {
                store.close(handle)?;
                Err(err)
            }
        }
    }

    /// Returns the dataset path.
    #[must_use]
    pub fn path(&self) -> &DatasetPath {
        &self.path
    }

    /// Returns the number of planes, the product of the leading extents.
    #[must_use]
    pub fn plane_count(&self) -> u64 {
        num_planes(&self.extents)
    }

    /// Returns the shape of each plane.
    #[must_use]
    pub fn plane_shape(&self) -> PlaneShape {
        self.plan.plane_shape()
    }

    /// Returns the stack plan of the dataset.
    #[must_use]
    pub fn plan(&self) -> &StackPlan {
        &self.plan
    }

    /// Returns the logical element type of the dataset.
    #[must_use]
    pub fn source_element_type(&self) -> ElementType {
        self.element_type
    }

    /// Returns true until the source is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Read plane `index`, narrowed with the source [`NarrowPolicy`].
    ///
    /// Every call performs exactly one hyperslab read.
    ///
    /// # Errors
    /// Returns [`VirtualSourceError::Closed`] after [`close`](VirtualPlaneSource::close), [`VirtualSourceError::PlaneIndexOutOfBounds`] if `index` is not less than [`plane_count`](VirtualPlaneSource::plane_count), or a store error.
    pub fn read_plane(&self, index: u64) -> Result<Plane, VirtualSourceError> {
        let State::Open(handle) = &self.state else {
            return Err(ClosedSourceError(self.path.clone()).into());
        };
        let count = self.plane_count();
        if index >= count {
            return Err(VirtualSourceError::PlaneIndexOutOfBounds { index, count });
        }
        let hyperslab = Hyperslab::for_plane(&self.extents, index)
            .map_err(|err| StoreError::Hyperslab(self.path.clone(), err))?;
        let buffer = self.store.read_hyperslab(handle, &hyperslab)?;
        let (buffer, _) = narrow(buffer, self.element_type, self.policy);
        Ok(Plane::new(self.plan.plane_shape(), buffer)?)
    }

    /// Close the source and release the dataset handle.
    ///
    /// Closing a closed source does nothing.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the store fails to close the handle.
    pub fn close(&mut self) -> Result<(), StoreError> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(handle) => {
                log::debug!("closing virtual plane source for {}", self.path);
                self.store.close(handle)
            }
            State::Closed => Ok(()),
        }
    }
}

impl<TStore: ?Sized + ReadableArrayStore> std::fmt::Debug for VirtualPlaneSource<'_, TStore> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPlaneSource")
            .field("path", &self.path)
            .field("extents", &self.extents)
            .field("element_type", &self.element_type)
            .field("policy", &self.policy)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<TStore: ?Sized + ReadableArrayStore> Drop for VirtualPlaneSource<'_, TStore> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("failed to close virtual plane source for {}: {err}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        element::ElementBuffer,
        store::{MemoryArrayStore, WritableArrayStore},
    };

    fn store_with(path: &str, shape: &[u64], elements: &ElementBuffer) -> MemoryArrayStore {
        let store = MemoryArrayStore::new();
        store
            .insert(&DatasetPath::new(path).unwrap(), shape, elements.element_type(), elements)
            .unwrap();
        store
    }

    #[test]
    fn virtual_read_planes() -> Result<(), Box<dyn std::error::Error>> {
        let store = store_with("/v", &[3, 2, 2], &ElementBuffer::Float64((0..12).map(f64::from).collect()));
        let path = DatasetPath::new("/v")?;
        let source = VirtualPlaneSource::open(&store, &path, NarrowPolicy::ToFloat32)?;
        assert_eq!(source.plane_count(), 3);
        assert_eq!(source.plane_shape(), PlaneShape::new(2, 2));
        assert_eq!(source.source_element_type(), ElementType::FLOAT64);
        assert_eq!(
            source.read_plane(2)?.into_data(),
            ElementBuffer::Float32(vec![8.0, 9.0, 10.0, 11.0])
        );
        assert_eq!(source.read_plane(0)?.data(), source.read_plane(0)?.data());
        assert!(matches!(
            source.read_plane(3),
            Err(VirtualSourceError::PlaneIndexOutOfBounds { index: 3, count: 3 })
        ));
        assert_eq!(store.open_handle_count(), 1);
        drop(source);
        assert_eq!(store.open_handle_count(), 0);
        Ok(())
    }

    #[test]
    fn virtual_rank4_planes() -> Result<(), Box<dyn std::error::Error>> {
        let store = store_with("/v", &[2, 3, 1, 2], &ElementBuffer::UInt8((0..12).collect()));
        let path = DatasetPath::new("/v")?;
        let source = VirtualPlaneSource::open(&store, &path, NarrowPolicy::ToFloat32)?;
        assert_eq!(source.plane_count(), 6);
        assert_eq!(source.read_plane(4)?.into_data(), ElementBuffer::UInt8(vec![8, 9]));

        // [frames, slices, rows, cols]: plane index is frame * slices + slice
        let handle = store.open(&path)?;
        for frame in 0..2u8 {
            for slice in 0..3u8 {
                let index = u64::from(frame * 3 + slice);
                let hyperslab = Hyperslab::for_plane(&[2, 3, 1, 2], index)?;
                assert_eq!(hyperslab.start(), [u64::from(frame), u64::from(slice), 0, 0]);
                assert_eq!(hyperslab.count(), [1, 1, 1, 2]);
                let first = (frame * 3 + slice) * 2;
                let expected = ElementBuffer::UInt8(vec![first, first + 1]);
                assert_eq!(source.read_plane(index)?.into_data(), expected);
                assert_eq!(store.read_hyperslab(&handle, &hyperslab)?, expected);
            }
        }
        store.close(handle)?;
        Ok(())
    }

    #[test]
    fn virtual_close() -> Result<(), Box<dyn std::error::Error>> {
        let store = store_with("/v", &[2, 2, 2], &ElementBuffer::UInt16(vec![0; 8]));
        let path = DatasetPath::new("/v")?;
        let mut source = VirtualPlaneSource::open(&store, &path, NarrowPolicy::ToFloat32)?;
        assert!(source.is_open());
        source.close()?;
        assert!(!source.is_open());
        assert_eq!(store.open_handle_count(), 0);
        assert!(matches!(source.read_plane(0), Err(VirtualSourceError::Closed(_))));
        source.close()?;
        assert_eq!(source.plane_count(), 2);
        Ok(())
    }

    #[test]
    fn virtual_unsupported() -> Result<(), Box<dyn std::error::Error>> {
        let store = store_with("/rgb", &[2, 2, 2, 3], &ElementBuffer::UInt8(vec![0; 24]));
        let handle = store.create_dataset(&DatasetPath::new("/flat")?, &[2, 2], ElementType::UINT8)?;
        store.close(handle)?;
        for path in ["/rgb", "/flat"] {
            let result = VirtualPlaneSource::open(&store, &DatasetPath::new(path)?, NarrowPolicy::ToFloat32);
            assert!(matches!(result, Err(VirtualSourceError::Unsupported(_))));
        }
        assert_eq!(store.open_handle_count(), 0);
        Ok(())
    }
}
