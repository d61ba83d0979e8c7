//! An in-memory array store.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::{Mutex, RwLock};

use crate::{
    element::{ElementBuffer, ElementClass, ElementType, Endianness, NATIVE_ENDIAN},
    hyperslab::Hyperslab,
    path::DatasetPath,
};

use super::{ArrayHandle, ListableArrayStore, ReadableArrayStore, StoreError, WritableArrayStore};

#[derive(Debug)]
struct Dataset {
    shape: Vec<u64>,
    element_type: ElementType,
    bytes: Vec<u8>,
    attributes: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug)]
enum Node {
    Group,
    Dataset(Dataset),
}

/// An in-memory array store.
///
/// Dataset elements are held as bytes with a fixed [`Endianness`].
#[derive(Debug)]
pub struct MemoryArrayStore {
    nodes: RwLock<BTreeMap<DatasetPath, Node>>,
    handles: Mutex<HashMap<u64, DatasetPath>>,
    next_handle: AtomicU64,
    endianness: Endianness,
    unsigned_as_signed: bool,
}

impl MemoryArrayStore {
    /// Create a new memory store holding only the root group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::from([(DatasetPath::root(), Node::Group)])),
            handles: Mutex::default(),
            next_handle: AtomicU64::new(0),
            endianness: NATIVE_ENDIAN,
            unsigned_as_signed: false,
        }
    }

    /// Hold dataset elements with `endianness`.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Read unsigned integer datasets into signed primitives of the same size.
    ///
    /// This mirrors array libraries without unsigned primitives, where a `uint16` dataset is read into an `i16` buffer.
    #[must_use]
    pub fn with_unsigned_as_signed(mut self, unsigned_as_signed: bool) -> Self {
        self.unsigned_as_signed = unsigned_as_signed;
        self
    }

    /// Returns the number of open handles.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Create the dataset at `path`, including its ancestor groups, and write `elements` to it.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the dataset cannot be created or `elements` does not fill it.
    pub fn insert(
        &self,
        path: &DatasetPath,
        shape: &[u64],
        element_type: ElementType,
        elements: &ElementBuffer,
    ) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            self.create_group(&parent)?;
        }
        let handle = self.create_dataset(path, shape, element_type)?;
        let result =
            self.write_hyperslab(&handle, &Hyperslab::new_with_shape(shape.to_vec()), elements);
        self.close(handle)?;
        result
    }

    fn check_handle(&self, handle: &ArrayHandle) -> Result<(), StoreError> {
        if self.handles.lock().get(&handle.id()) == Some(handle.path()) {
            Ok(())
        } else {
            Err(StoreError::InvalidHandle {
                id: handle.id(),
                path: handle.path().clone(),
            })
        }
    }

    fn with_dataset<T>(
        &self,
        handle: &ArrayHandle,
        f: impl FnOnce(&Dataset) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_handle(handle)?;
        let nodes = self.nodes.read();
        match nodes.get(handle.path()) {
            Some(Node::Dataset(dataset)) => f(dataset),
            Some(Node::Group) => Err(StoreError::NotADataset(handle.path().clone())),
            None => Err(StoreError::NotFound(handle.path().clone())),
        }
    }

    fn with_dataset_mut<T>(
        &self,
        handle: &ArrayHandle,
        f: impl FnOnce(&mut Dataset) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_handle(handle)?;
        let mut nodes = self.nodes.write();
        match nodes.get_mut(handle.path()) {
            Some(Node::Dataset(dataset)) => f(dataset),
            Some(Node::Group) => Err(StoreError::NotADataset(handle.path().clone())),
            None => Err(StoreError::NotFound(handle.path().clone())),
        }
    }

    fn open_handle(&self, path: &DatasetPath) -> ArrayHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(id, path.clone());
        ArrayHandle::new(id, path.clone())
    }

    fn read_primitive(&self, element_type: ElementType) -> ElementType {
        if self.unsigned_as_signed
            && element_type.class() == ElementClass::Integer
            && !element_type.is_signed()
        {
            ElementType::new(ElementClass::Integer, element_type.size(), true)
                .unwrap_or(element_type)
        } else {
            element_type
        }
    }
}

impl Default for MemoryArrayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadableArrayStore for MemoryArrayStore {
    fn open(&self, path: &DatasetPath) -> Result<ArrayHandle, StoreError> {
        match self.nodes.read().get(path) {
            Some(Node::Dataset(_)) => {}
            Some(Node::Group) => return Err(StoreError::NotADataset(path.clone())),
            None => return Err(StoreError::NotFound(path.clone())),
        }
        Ok(self.open_handle(path))
    }

    fn close(&self, handle: ArrayHandle) -> Result<(), StoreError> {
        self.check_handle(&handle)?;
        self.handles.lock().remove(&handle.id());
        Ok(())
    }

    fn shape(&self, handle: &ArrayHandle) -> Result<Vec<u64>, StoreError> {
        self.with_dataset(handle, |dataset| Ok(dataset.shape.clone()))
    }

    fn element_type(&self, handle: &ArrayHandle) -> Result<ElementType, StoreError> {
        self.with_dataset(handle, |dataset| Ok(dataset.element_type))
    }

    fn read_hyperslab(
        &self,
        handle: &ArrayHandle,
        hyperslab: &Hyperslab,
    ) -> Result<ElementBuffer, StoreError> {
        self.with_dataset(handle, |dataset| {
            let bytes = hyperslab
                .extract_bytes(
                    &dataset.bytes,
                    &dataset.shape,
                    dataset.element_type.size(),
                )
                .map_err(|err| StoreError::Hyperslab(handle.path().clone(), err))?;
            ElementBuffer::from_bytes(
                &bytes,
                self.read_primitive(dataset.element_type),
                self.endianness,
            )
            .map_err(|err| StoreError::Other(err.to_string()))
        })
    }

    fn attribute(
        &self,
        handle: &ArrayHandle,
        name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.with_dataset(handle, |dataset| Ok(dataset.attributes.get(name).cloned()))
    }
}

impl ListableArrayStore for MemoryArrayStore {
    fn list_names(&self) -> Result<Vec<DatasetPath>, StoreError> {
        let nodes = self.nodes.read();
        let mut names = Vec::new();
        let mut pending = vec![DatasetPath::root()];
        while let Some(path) = pending.pop() {
            match nodes.get(&path) {
                Some(Node::Group) => {
                    let children: Vec<DatasetPath> = nodes
                        .keys()
                        .filter(|child| child.parent().as_ref() == Some(&path))
                        .cloned()
                        .collect();
                    // reversed so the first child is visited first
                    pending.extend(children.into_iter().rev());
                }
                Some(Node::Dataset(_)) => names.push(path),
                None => {}
            }
        }
        Ok(names)
    }
}

impl WritableArrayStore for MemoryArrayStore {
    fn create_group(&self, path: &DatasetPath) -> Result<(), StoreError> {
        let mut nodes = self.nodes.write();
        let mut paths = path.ancestors();
        paths.push(path.clone());
        for path in paths {
            match nodes.get(&path) {
                Some(Node::Group) => {}
                Some(Node::Dataset(_)) => return Err(StoreError::NotAGroup(path)),
                None => {
                    nodes.insert(path, Node::Group);
                }
            }
        }
        Ok(())
    }

    fn create_dataset(
        &self,
        path: &DatasetPath,
        shape: &[u64],
        element_type: ElementType,
    ) -> Result<ArrayHandle, StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::NotADataset(path.clone()))?;
        let num_bytes = shape
            .iter()
            .try_fold(element_type.size() as u64, |num_bytes, extent| {
                num_bytes.checked_mul(*extent)
            })
            .and_then(|num_bytes| usize::try_from(num_bytes).ok())
            .ok_or_else(|| StoreError::Other(format!("{path} with shape {shape:?} is too large")))?;
        {
            let mut nodes = self.nodes.write();
            match nodes.get(&parent) {
                Some(Node::Group) => {}
                Some(Node::Dataset(_)) => return Err(StoreError::NotAGroup(parent)),
                None => return Err(StoreError::NotFound(parent)),
            }
            if let Some(Node::Group) = nodes.get(path) {
                return Err(StoreError::NotADataset(path.clone()));
            }
            nodes.insert(
                path.clone(),
                Node::Dataset(Dataset {
                    shape: shape.to_vec(),
                    element_type,
                    bytes: vec![0; num_bytes],
                    attributes: BTreeMap::new(),
                }),
            );
        }
        Ok(self.open_handle(path))
    }

    fn write_hyperslab(
        &self,
        handle: &ArrayHandle,
        hyperslab: &Hyperslab,
        elements: &ElementBuffer,
    ) -> Result<(), StoreError> {
        let endianness = self.endianness;
        self.with_dataset_mut(handle, |dataset| {
            let got = elements.element_type();
            if got.class() != dataset.element_type.class()
                || got.size() != dataset.element_type.size()
            {
                return Err(StoreError::IncompatibleElements {
                    path: handle.path().clone(),
                    expected: dataset.element_type,
                    got,
                });
            }
            hyperslab
                .store_bytes(
                    &elements.to_bytes(endianness),
                    &mut dataset.bytes,
                    &dataset.shape,
                    dataset.element_type.size(),
                )
                .map_err(|err| StoreError::Hyperslab(handle.path().clone(), err))
        })
    }

    fn set_attribute(
        &self,
        handle: &ArrayHandle,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.with_dataset_mut(handle, |dataset| {
            dataset.attributes.insert(name.to_string(), value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn path(path: &str) -> DatasetPath {
        DatasetPath::new(path).unwrap()
    }

    #[test]
    fn memory_read_write() -> Result<(), Box<dyn Error>> {
        let store = MemoryArrayStore::new();
        let elements = ElementBuffer::UInt16((0..24).collect());
        store.insert(&path("/a/b"), &[2, 3, 4], ElementType::UINT16, &elements)?;

        let handle = store.open(&path("/a/b"))?;
        assert_eq!(store.shape(&handle)?, vec![2, 3, 4]);
        assert_eq!(store.element_type(&handle)?, ElementType::UINT16);
        assert_eq!(store.read_full(&handle)?, elements);
        let plane = store.read_hyperslab(&handle, &Hyperslab::for_plane(&[2, 3, 4], 1)?)?;
        assert_eq!(plane, ElementBuffer::UInt16((12..24).collect()));

        store.write_hyperslab(
            &handle,
            &Hyperslab::new_with_start_count(vec![0, 0, 0], vec![1, 1, 2])?,
            &ElementBuffer::UInt16(vec![100, 101]),
        )?;
        let row = store.read_hyperslab(
            &handle,
            &Hyperslab::new_with_start_count(vec![0, 0, 0], vec![1, 1, 4])?,
        )?;
        assert_eq!(row, ElementBuffer::UInt16(vec![100, 101, 2, 3]));

        assert!(store
            .write_hyperslab(
                &handle,
                &Hyperslab::new_with_shape(vec![1, 1, 1]),
                &ElementBuffer::Float32(vec![1.0]),
            )
            .is_err());
        assert!(store
            .read_hyperslab(&handle, &Hyperslab::new_with_shape(vec![3, 3, 4]))
            .is_err());
        store.close(handle)?;
        assert_eq!(store.open_handle_count(), 0);
        Ok(())
    }

    #[test]
    fn memory_handles() -> Result<(), Box<dyn Error>> {
        let store = MemoryArrayStore::new();
        store.insert(&path("/x"), &[2, 2], ElementType::UINT8, &ElementBuffer::UInt8(vec![0; 4]))?;
        let handle = store.open(&path("/x"))?;
        let stale = ArrayHandle::new(handle.id(), handle.path().clone());
        assert_eq!(store.open_handle_count(), 1);
        store.close(handle)?;
        assert!(matches!(
            store.shape(&stale),
            Err(StoreError::InvalidHandle { .. })
        ));
        assert!(store.close(stale).is_err());
        assert!(matches!(store.open(&path("/y")), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.open(&DatasetPath::root()),
            Err(StoreError::NotADataset(_))
        ));
        Ok(())
    }

    #[test]
    fn memory_groups() -> Result<(), Box<dyn Error>> {
        let store = MemoryArrayStore::new();
        store.create_group(&path("/a/b/c"))?;
        store.create_group(&path("/a/b"))?;
        assert!(store
            .create_dataset(&path("/q/r"), &[1, 1], ElementType::UINT8)
            .is_err());
        store.insert(&path("/a/d"), &[1, 1], ElementType::UINT8, &ElementBuffer::UInt8(vec![1]))?;
        assert!(matches!(
            store.create_group(&path("/a/d/e")),
            Err(StoreError::NotAGroup(_))
        ));
        assert!(store
            .create_dataset(&path("/a/b"), &[1, 1], ElementType::UINT8)
            .is_err());
        Ok(())
    }

    #[test]
    fn memory_oversized_shape() {
        let store = MemoryArrayStore::new();
        for shape in [[u64::MAX, 2, 1], [1 << 32, 1 << 32, 1], [2, 2, u64::MAX / 2]] {
            assert!(matches!(
                store.create_dataset(&path("/big"), &shape, ElementType::UINT16),
                Err(StoreError::Other(_))
            ));
        }
        assert_eq!(store.open_handle_count(), 0);
    }

    #[test]
    fn memory_list_names() -> Result<(), Box<dyn Error>> {
        let store = MemoryArrayStore::new();
        let one = ElementBuffer::UInt8(vec![1]);
        for name in ["/t1/channel0", "/t0/channel1", "/t0/channel0", "/z", "/a/b/c/d"] {
            store.insert(&path(name), &[1, 1], ElementType::UINT8, &one)?;
        }
        store.create_group(&path("/empty"))?;
        let names: Vec<String> = store
            .list_names()?
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            names,
            ["/a/b/c/d", "/t0/channel0", "/t0/channel1", "/t1/channel0", "/z"]
        );
        Ok(())
    }

    #[test]
    fn memory_endianness_and_signedness() -> Result<(), Box<dyn Error>> {
        let store = MemoryArrayStore::new()
            .with_endianness(Endianness::Big)
            .with_unsigned_as_signed(true);
        store.insert(
            &path("/u"),
            &[1, 3],
            ElementType::UINT16,
            &ElementBuffer::UInt16(vec![1, 65535, 32768]),
        )?;
        let handle = store.open(&path("/u"))?;
        assert_eq!(store.element_type(&handle)?, ElementType::UINT16);
        assert_eq!(
            store.read_full(&handle)?,
            ElementBuffer::Int16(vec![1, -1, i16::MIN])
        );
        store.close(handle)?;
        Ok(())
    }

    #[test]
    fn memory_attributes() -> Result<(), Box<dyn Error>> {
        let store = MemoryArrayStore::new();
        let handle = store.create_dataset(&path("/a"), &[1, 1], ElementType::FLOAT32)?;
        assert_eq!(store.attribute(&handle, "element_size_um")?, None);
        store.set_attribute(&handle, "element_size_um", serde_json::json!([2.0, 0.5, 0.5]))?;
        assert_eq!(
            store.attribute(&handle, "element_size_um")?,
            Some(serde_json::json!([2.0, 0.5, 0.5]))
        );
        store.close(handle)?;
        Ok(())
    }
}
