//! An array store decorator which logs store calls.

use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use crate::{
    element::{ElementBuffer, ElementType},
    hyperslab::Hyperslab,
    path::DatasetPath,
};

use super::{ArrayHandle, ListableArrayStore, ReadableArrayStore, StoreError, WritableArrayStore};

/// The usage log array store. Logs array store method calls.
///
/// It is intended to aid in debugging by revealing store access patterns, such as one hyperslab read per plane of a virtual stack.
///
/// ### Example (log to stdout)
/// ```rust
/// # use std::sync::{Arc, Mutex};
/// # use hyperstack::store::{MemoryArrayStore, UsageLogArrayStore};
/// let store = Arc::new(MemoryArrayStore::new());
/// let log_writer = Arc::new(Mutex::new(std::io::stdout()));
/// let store = UsageLogArrayStore::new(store, log_writer, || {
///     chrono::Utc::now().format("[%T%.3f] ").to_string()
/// });
/// ```
///
/// Reading a virtual stack with the above [`UsageLogArrayStore`] prints outputs like:
/// ```text
/// [23:41:19.885] open(/t0/channel0) -> Ok(0)
/// [23:41:19.885] shape(/t0/channel0) -> Ok([6, 4, 5])
/// [23:41:19.885] element_type(/t0/channel0) -> Ok(uint16)
/// [23:41:19.886] read_hyperslab(/t0/channel0, start [2, 0, 0] count [1, 4, 5]) -> len=Ok(20)
/// [23:41:19.891] close(/t0/channel0) -> Ok(())
/// ```
pub struct UsageLogArrayStore<TStore: ?Sized> {
    store: Arc<TStore>,
    handle: Arc<Mutex<dyn Write + Send + Sync>>,
    prefix_func: fn() -> String,
}

impl<TStore: ?Sized> core::fmt::Debug for UsageLogArrayStore<TStore> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(f, "usage log")
    }
}

impl<TStore: ?Sized> UsageLogArrayStore<TStore> {
    /// Create a new usage log array store wrapping `store`.
    ///
    /// Each call is written as one line to `handle`, prefixed by the output of `prefix_func`.
    pub fn new(
        store: Arc<TStore>,
        handle: Arc<Mutex<dyn Write + Send + Sync>>,
        prefix_func: fn() -> String,
    ) -> Self {
        Self {
            store,
            handle,
            prefix_func,
        }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<TStore> {
        &self.store
    }

    fn log(&self, line: std::fmt::Arguments) -> Result<(), StoreError> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| StoreError::from("usage log writer is poisoned"))?;
        writeln!(handle, "{}{line}", (self.prefix_func)())?;
        Ok(())
    }
}

impl<TStore: ?Sized + ReadableArrayStore> ReadableArrayStore for UsageLogArrayStore<TStore> {
    fn open(&self, path: &DatasetPath) -> Result<ArrayHandle, StoreError> {
        let result = self.store.open(path);
        self.log(format_args!(
            "open({path}) -> {:?}",
            result.as_ref().map(ArrayHandle::id)
        ))?;
        result
    }

    fn close(&self, handle: ArrayHandle) -> Result<(), StoreError> {
        let path = handle.path().clone();
        let result = self.store.close(handle);
        self.log(format_args!("close({path}) -> {result:?}"))?;
        result
    }

    fn shape(&self, handle: &ArrayHandle) -> Result<Vec<u64>, StoreError> {
        let result = self.store.shape(handle);
        self.log(format_args!("shape({}) -> {result:?}", handle.path()))?;
        result
    }

    fn element_type(&self, handle: &ArrayHandle) -> Result<ElementType, StoreError> {
        let result = self.store.element_type(handle);
        self.log(format_args!(
            "element_type({}) -> {:?}",
            handle.path(),
            result.as_ref().map(ToString::to_string)
        ))?;
        result
    }

    fn read_full(&self, handle: &ArrayHandle) -> Result<ElementBuffer, StoreError> {
        let result = self.store.read_full(handle);
        self.log(format_args!(
            "read_full({}) -> len={:?}",
            handle.path(),
            result.as_ref().map(ElementBuffer::len)
        ))?;
        result
    }

    fn read_hyperslab(
        &self,
        handle: &ArrayHandle,
        hyperslab: &Hyperslab,
    ) -> Result<ElementBuffer, StoreError> {
        let result = self.store.read_hyperslab(handle, hyperslab);
        self.log(format_args!(
            "read_hyperslab({}, {hyperslab}) -> len={:?}",
            handle.path(),
            result.as_ref().map(ElementBuffer::len)
        ))?;
        result
    }

    fn attribute(
        &self,
        handle: &ArrayHandle,
        name: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let result = self.store.attribute(handle, name);
        self.log(format_args!(
            "attribute({}, {name}) -> {:?}",
            handle.path(),
            result.as_ref().map(|value| value.as_ref().map(ToString::to_string))
        ))?;
        result
    }
}

impl<TStore: ?Sized + ListableArrayStore> ListableArrayStore for UsageLogArrayStore<TStore> {
    fn list_names(&self) -> Result<Vec<DatasetPath>, StoreError> {
        let result = self.store.list_names();
        self.log(format_args!(
            "list_names() -> {:?}",
            result.as_ref().map(Vec::len)
        ))?;
        result
    }
}

impl<TStore: ?Sized + WritableArrayStore> WritableArrayStore for UsageLogArrayStore<TStore> {
    fn create_group(&self, path: &DatasetPath) -> Result<(), StoreError> {
        let result = self.store.create_group(path);
        self.log(format_args!("create_group({path}) -> {result:?}"))?;
        result
    }

    fn create_dataset(
        &self,
        path: &DatasetPath,
        shape: &[u64],
        element_type: ElementType,
    ) -> Result<ArrayHandle, StoreError> {
        let result = self.store.create_dataset(path, shape, element_type);
        self.log(format_args!(
            "create_dataset({path}, {shape:?}, {element_type}) -> {:?}",
            result.as_ref().map(ArrayHandle::id)
        ))?;
        result
    }

    fn write_hyperslab(
        &self,
        handle: &ArrayHandle,
        hyperslab: &Hyperslab,
        elements: &ElementBuffer,
    ) -> Result<(), StoreError> {
        let result = self.store.write_hyperslab(handle, hyperslab, elements);
        self.log(format_args!(
            "write_hyperslab({}, {hyperslab}, len={}) -> {result:?}",
            handle.path(),
            elements.len()
        ))?;
        result
    }

    fn set_attribute(
        &self,
        handle: &ArrayHandle,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let line = format!("set_attribute({}, {name}, {value})", handle.path());
        let result = self.store.set_attribute(handle, name, value);
        self.log(format_args!("{line} -> {result:?}"))?;
        result
    }
}
