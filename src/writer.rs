//! Writing image stacks to an array store.
//!
//! [`write_dataset`] writes a stack to a single dataset:
//!  - grayscale stacks as `[rows, cols]` for a single plane, otherwise `[planes, rows, cols]`,
//!  - RGB stacks as `[rows, cols, 3]` for a single plane, otherwise `[planes, rows, cols, 3]`.
//!
//! [`write_hyperstack`] writes one dataset per frame and channel, named by a template, each `[rows, cols]` for a single slice, otherwise `[slices, rows, cols]`.
//!
//! Each plane is written with its own one-plane hyperslab.
//! Planes are stored in their on-disk representation, see [`to_storage`].

use thiserror::Error;

use crate::{
    config::Config,
    convert::{to_storage, ConvertError},
    element::{ElementBuffer, ElementType},
    grammar::{self, GrammarError, TemplateTokens},
    hyperslab::{Hyperslab, HyperslabError},
    path::{DatasetPath, DatasetPathError},
    plane::{self, PlaneError},
    stack::{ImageStack, ELEMENT_SIZE_ATTRIBUTE},
    store::{ArrayHandle, ReadableArrayStore, StoreError, WritableArrayStore},
    topology::shape_for_stack,
    virtual_source::VirtualSourceError,
};

/// A write error.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The plane elements have no on-disk representation.
    #[error(transparent)]
    Convert(#[from] ConvertError),
    /// The RGB components of a plane cannot be interleaved.
    #[error(transparent)]
    Plane(#[from] PlaneError),
    /// A plane of a virtual stack cannot be read.
    #[error(transparent)]
    VirtualSource(#[from] VirtualSourceError),
    /// A hyperslab error.
    #[error(transparent)]
    Hyperslab(#[from] HyperslabError),
    /// A template grammar error.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// A dataset path built from a template is invalid.
    #[error(transparent)]
    InvalidPath(#[from] DatasetPathError),
    /// The stack has no planes.
    #[error("cannot write {0}, it has no planes")]
    EmptyStack(String),
    /// A plane has a different on-disk representation to the first plane of its dataset.
    #[error("plane {index} of {path} is stored as {got}, expected {expected}")]
    IncompatiblePlaneType {
        /// The dataset path.
        path: DatasetPath,
        /// The plane index in the dataset.
        index: usize,
        /// The on-disk element type of the first plane.
        expected: ElementType,
        /// The on-disk element type of the plane.
        got: ElementType,
    },
}

/// Returns the hyperslab of stored plane `index` of a dataset with `shape`.
fn plane_hyperslab(shape: &[u64], index: usize, is_rgb: bool) -> Result<Hyperslab, WriteError> {
    if !is_rgb {
        return Ok(Hyperslab::for_plane(shape, index as u64)?);
    }
    let components = shape.len() - 1;
    let plane = Hyperslab::for_plane(&shape[..components], index as u64)?;
    let start = plane.start().iter().copied().chain([0]).collect();
    let count = plane.count().iter().copied().chain([3]).collect();
    Ok(Hyperslab::new_with_start_count(start, count).map_err(HyperslabError::from)?)
}

/// Write stored planes `0..num_planes` to an open dataset, starting with the already produced `first` plane.
#[allow(clippy::too_many_arguments)]
fn write_planes(
    store: &(impl ?Sized + WritableArrayStore),
    handle: &ArrayHandle,
    shape: &[u64],
    num_planes: usize,
    is_rgb: bool,
    element_type: ElementType,
    first: ElementBuffer,
    plane_elements: impl Fn(usize) -> Result<(ElementBuffer, ElementType), WriteError>,
) -> Result<(), WriteError> {
    store.write_hyperslab(handle, &plane_hyperslab(shape, 0, is_rgb)?, &first)?;
    for index in 1..num_planes {
        let (elements, plane_type) = plane_elements(index)?;
        if plane_type != element_type {
            return Err(WriteError::IncompatiblePlaneType {
                path: handle.path().clone(),
                index,
                expected: element_type,
                got: plane_type,
            });
        }
        let hyperslab = plane_hyperslab(shape, index, is_rgb)?;
        store.write_hyperslab(handle, &hyperslab, &elements)?;
    }
    Ok(())
}

/// Create the dataset at `path` and write `num_planes` stored planes to it, closing it afterwards.
///
/// Each plane is produced once by `plane_elements`, the first also sets the on-disk element type.
fn write_new_dataset<TStore: ?Sized + ReadableArrayStore>(
    store: &(impl ?Sized + WritableArrayStore + ReadableArrayStore),
    path: &DatasetPath,
    stack: &ImageStack<'_, TStore>,
    shape: &[u64],
    num_planes: usize,
    is_rgb: bool,
    plane_elements: impl Fn(usize) -> Result<(ElementBuffer, ElementType), WriteError>,
) -> Result<(), WriteError> {
    if num_planes == 0 {
        return Err(WriteError::EmptyStack(path.to_string()));
    }
    let (first, element_type) = plane_elements(0)?;
    if let Some(parent) = path.parent() {
        store.create_group(&parent)?;
    }
    log::info!(
        "writing {path}: {num_planes} planes of {} as {element_type} {shape:?}",
        stack.plane_shape()
    );
    let handle = store.create_dataset(path, shape, element_type)?;
    let written = write_planes(
        store,
        &handle,
        shape,
        num_planes,
        is_rgb,
        element_type,
        first,
        plane_elements,
    )
    .and_then(|()| {
        store
            .set_attribute(&handle, ELEMENT_SIZE_ATTRIBUTE, stack.calibration().to_attribute())
            .map_err(WriteError::from)
    });
    store.close(handle)?;
    written
}

/// Write `stack` to a single dataset at `path`, creating its ancestor groups as needed.
///
/// The calibration of the stack is stored in the [`ELEMENT_SIZE_ATTRIBUTE`] of the dataset.
///
/// # Errors
/// Returns a [`WriteError`] if the stack has no planes, its planes have no on-disk representation, or there is a store error.
pub fn write_dataset<TStore: ?Sized + ReadableArrayStore>(
    store: &(impl ?Sized + WritableArrayStore + ReadableArrayStore),
    path: &DatasetPath,
    stack: &ImageStack<'_, TStore>,
) -> Result<(), WriteError> {
    let is_rgb = stack.is_rgb();
    let num_planes = if is_rgb {
        stack.slices() * stack.frames()
    } else {
        stack.num_planes()
    };
    let shape = shape_for_stack(num_planes, stack.plane_shape(), is_rgb);
    write_new_dataset(store, path, stack, &shape, num_planes, is_rgb, |index| {
        if is_rgb {
            let [r, g, b] = [0, 1, 2].map(|channel| stack.plane(index * 3 + channel));
            let (r, _) = to_storage(r?.data().clone())?;
            let (g, _) = to_storage(g?.data().clone())?;
            let (b, element_type) = to_storage(b?.data().clone())?;
            Ok((plane::interleave_rgb(&r, &g, &b)?, element_type))
        } else {
            Ok(to_storage(stack.plane(index)?.into_owned().into_data())?)
        }
    })
}

/// Write each frame and channel of `stack` to its own dataset named by `tokens`, creating groups as needed.
///
/// Frames and channels are numbered from zero.
/// Returns the paths of the datasets written, ordered by frame then channel.
///
/// # Errors
/// Returns a [`WriteError`] if a dataset name is not a valid path, or a dataset cannot be written.
pub fn write_hyperstack<TStore: ?Sized + ReadableArrayStore>(
    store: &(impl ?Sized + WritableArrayStore + ReadableArrayStore),
    tokens: &TemplateTokens,
    stack: &ImageStack<'_, TStore>,
) -> Result<Vec<DatasetPath>, WriteError> {
    let (channels, slices, frames) = stack.dimensions();
    let shape = shape_for_stack(slices, stack.plane_shape(), false);
    let mut paths = Vec::with_capacity(channels * frames);
    for frame in 0..frames {
        for channel in 0..channels {
            let path = DatasetPath::new(&tokens.name_for(frame as u64, channel as u64))?;
            write_new_dataset(store, &path, stack, &shape, slices, false, |slice| {
                let index = (frame * slices + slice) * channels + channel;
                Ok(to_storage(stack.plane(index)?.into_owned().into_data())?)
            })?;
            paths.push(path);
        }
    }
    Ok(paths)
}

/// Write `stack` as a hyperstack with the [template](Config#template) of `config` if it has several channels or frames and is not RGB, otherwise to the single dataset at `path`.
///
/// Returns the paths of the datasets written.
///
/// # Errors
/// Returns a [`WriteError`] if the template is invalid or a dataset cannot be written.
pub fn write_stack<TStore: ?Sized + ReadableArrayStore>(
    store: &(impl ?Sized + WritableArrayStore + ReadableArrayStore),
    path: &DatasetPath,
    stack: &ImageStack<'_, TStore>,
    config: &Config,
) -> Result<Vec<DatasetPath>, WriteError> {
    if !stack.is_rgb() && (stack.channels() > 1 || stack.frames() > 1) {
        let tokens = grammar::compile(config.template())?;
        write_hyperstack(store, &tokens, stack)
    } else {
        write_dataset(store, path, stack)?;
        Ok(vec![path.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        plane::{Plane, PlaneShape},
        stack::{Calibration, EagerImageStack},
        store::{MemoryArrayStore, UsageLogArrayStore},
        topology::LoadStrategy,
    };

    fn path(path: &str) -> DatasetPath {
        DatasetPath::new(path).unwrap()
    }

    fn read(store: &MemoryArrayStore, name: &str) -> (Vec<u64>, ElementBuffer) {
        let handle = store.open(&path(name)).unwrap();
        let shape = store.shape(&handle).unwrap();
        let elements = store.read_full(&handle).unwrap();
        store.close(handle).unwrap();
        (shape, elements)
    }

    fn stack_u8(planes: &[[u8; 2]], channels: usize, slices: usize, frames: usize) -> EagerImageStack {
        let planes = planes
            .iter()
            .map(|plane| Plane::new(PlaneShape::new(1, 2), ElementBuffer::UInt8(plane.to_vec())).unwrap())
            .collect();
        EagerImageStack::new("stack", PlaneShape::new(1, 2), planes, channels, slices, frames).unwrap()
    }

    #[test]
    fn write_grayscale() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryArrayStore::new();
        let stack = stack_u8(&[[1, 2], [3, 4], [5, 6]], 1, 3, 1)
            .with_calibration(Calibration::new(3.0, 1.0, 1.0));
        write_dataset(&store, &path("/a/b/data"), &stack)?;
        assert_eq!(read(&store, "/a/b/data"), (vec![3, 1, 2], ElementBuffer::UInt8(vec![1, 2, 3, 4, 5, 6])));
        let handle = store.open(&path("/a/b/data"))?;
        assert_eq!(
            store.attribute(&handle, ELEMENT_SIZE_ATTRIBUTE)?,
            Some(serde_json::json!([3.0, 1.0, 1.0]))
        );
        store.close(handle)?;

        let single = stack_u8(&[[7, 8]], 1, 1, 1);
        write_dataset(&store, &path("/single"), &single)?;
        assert_eq!(read(&store, "/single"), (vec![1, 2], ElementBuffer::UInt8(vec![7, 8])));
        assert_eq!(store.open_handle_count(), 0);
        Ok(())
    }

    #[test]
    fn write_int16_as_uint16() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryArrayStore::new();
        let plane = Plane::new(PlaneShape::new(1, 2), ElementBuffer::Int16(vec![-1, 2]))?;
        let stack = EagerImageStack::new("s", PlaneShape::new(1, 2), vec![plane], 1, 1, 1)?;
        write_dataset(&store, &path("/s"), &stack)?;
        assert_eq!(read(&store, "/s"), (vec![1, 2], ElementBuffer::UInt16(vec![65535, 2])));
        Ok(())
    }

    #[test]
    fn write_rgb() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryArrayStore::new();
        // 1 slice, 3 channels
        let stack = stack_u8(&[[1, 4], [2, 5], [3, 6]], 3, 1, 1).with_rgb(true)?;
        write_dataset(&store, &path("/rgb"), &stack)?;
        assert_eq!(read(&store, "/rgb"), (vec![1, 2, 3], ElementBuffer::UInt8(vec![1, 2, 3, 4, 5, 6])));

        let stack = stack_u8(&[[1, 4], [2, 5], [3, 6], [7, 10], [8, 11], [9, 12]], 3, 2, 1).with_rgb(true)?;
        write_dataset(&store, &path("/rgb2"), &stack)?;
        assert_eq!(
            read(&store, "/rgb2"),
            (vec![2, 1, 2, 3], ElementBuffer::UInt8((1..=12).collect()))
        );
        Ok(())
    }

    #[test]
    fn write_hyperstack_names() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryArrayStore::new();
        // 2 channels x 1 slice x 2 frames
        let stack = stack_u8(&[[0, 0], [10, 10], [100, 100], [110, 110]], 2, 1, 2);
        let paths = write_stack(&store, &path("/unused"), &stack, &Config::default())?;
        assert_eq!(
            paths.iter().map(DatasetPath::as_str).collect::<Vec<_>>(),
            ["/t0/channel0", "/t0/channel1", "/t1/channel0", "/t1/channel1"]
        );
        assert_eq!(read(&store, "/t1/channel0"), (vec![1, 2], ElementBuffer::UInt8(vec![100, 100])));
        assert!(store.open(&path("/unused")).is_err());
        Ok(())
    }

    #[test]
    fn write_virtual_reads_each_plane_once() -> Result<(), Box<dyn std::error::Error>> {
        use std::sync::{Arc, Mutex};

        let source = MemoryArrayStore::new();
        let elements = ElementBuffer::UInt16((0..12).collect());
        source.insert(&path("/src"), &[3, 2, 2], ElementType::UINT16, &elements)?;
        let log = Arc::new(Mutex::new(Vec::<u8>::new()));
        let source = UsageLogArrayStore::new(Arc::new(source), log.clone(), String::new);
        let stack = crate::reader::read_dataset(
            &source,
            &path("/src"),
            LoadStrategy::Virtual,
            &Config::default(),
        )?;
        assert!(stack.is_virtual());

        let store = MemoryArrayStore::new();
        write_dataset(&store, &path("/dst"), &stack)?;
        assert_eq!(read(&store, "/dst"), (vec![3, 2, 2], elements));
        let log = String::from_utf8(log.lock().unwrap().clone())?;
        let reads: Vec<&str> = log
            .lines()
            .filter(|line| line.starts_with("read_hyperslab("))
            .collect();
        assert_eq!(reads.len(), 3);
        Ok(())
    }

    #[test]
    fn write_unsupported() {
        let store = MemoryArrayStore::new();
        let plane = Plane::new(PlaneShape::new(1, 1), ElementBuffer::Float64(vec![0.0])).unwrap();
        let stack = EagerImageStack::new("s", PlaneShape::new(1, 1), vec![plane], 1, 1, 1).unwrap();
        assert!(matches!(
            write_dataset(&store, &path("/s"), &stack),
            Err(WriteError::Convert(ConvertError::UnsupportedPlaneType(ElementType::FLOAT64)))
        ));
        let empty = EagerImageStack::new("e", PlaneShape::new(1, 1), vec![], 1, 0, 1).unwrap();
        assert!(matches!(
            write_dataset(&store, &path("/e"), &empty),
            Err(WriteError::EmptyStack(_))
        ));
    }
}
