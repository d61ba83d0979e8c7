//! Reading image stacks from an array store.
//!
//! A single dataset is read into an [`ImageStack`] whose dimensions follow its [`StackPlan`]:
//!  - [`read_dataset`] reads eagerly or, for grayscale rank 3 and 4 datasets, virtually,
//!  - [`read_datasets`] reads a batch of datasets, reporting errors per dataset.
//!
//! Datasets named by a template, one per frame and channel, are read into a single hyperstack:
//!  - [`group_datasets`] groups the dataset names of a store,
//!  - [`read_hyperstack`] reads the datasets of a [`GroupingResult`],
//!  - [`read_grouped`] does both, after selecting frame and channel ranges.
//!
//! [`read_store`] reads a whole store, as a hyperstack if its dataset names match the template.
//!
//! Eager reads close each dataset as soon as it has been read, and produce planes ordered frame, slice, then channel.

use itertools::Itertools;
use thiserror::Error;

use crate::{
    config::Config,
    convert::narrow,
    element::ElementType,
    grammar::{self, GrammarError},
    grouping::{AxisGrouper, GroupingError, GroupingResult},
    path::{DatasetPath, DatasetPathError},
    plane::{self, Plane, PlaneError},
    range::{self, Range, RangeError},
    stack::{Calibration, ImageStack, StackError, ELEMENT_SIZE_ATTRIBUTE},
    store::{ArrayHandle, ListableArrayStore, ReadableArrayStore, StoreError},
    topology::{self, LoadStrategy, StackPlan, UnsupportedRankError},
    virtual_source::{VirtualPlaneSource, VirtualSourceError},
};

/// The name of the attribute holding a template override, see [`group_datasets`].
pub const TEMPLATE_ATTRIBUTE: &str = "template";

/// A read error.
#[derive(Debug, Error)]
pub enum ReadError {
    /// A store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The dataset rank is not supported.
    #[error(transparent)]
    UnsupportedRank(#[from] UnsupportedRankError),
    /// An eager read would exceed the available memory.
    #[error("reading {path} needs {bytes} bytes, which exceeds the available memory, try a virtual read")]
    OutOfMemory {
        /// The dataset path.
        path: DatasetPath,
        /// The number of bytes needed.
        bytes: u64,
    },
    /// A plane extraction error.
    #[error(transparent)]
    Plane(#[from] PlaneError),
    /// The planes read do not form a stack.
    #[error(transparent)]
    Stack(#[from] StackError),
    /// A virtual plane source error.
    #[error(transparent)]
    VirtualSource(#[from] VirtualSourceError),
    /// A template grammar error.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// A grouping error.
    #[error(transparent)]
    Grouping(#[from] GroupingError),
    /// A range error.
    #[error(transparent)]
    Range(#[from] RangeError),
    /// A dataset path built from a template is invalid.
    #[error(transparent)]
    InvalidPath(#[from] DatasetPathError),
    /// A dataset does not fit the hyperstack it is read into.
    #[error("dataset {path} does not fit the hyperstack: {reason}")]
    IncompatibleDataset {
        /// The dataset path.
        path: DatasetPath,
        /// The reason.
        reason: String,
    },
    /// The frames of a hyperstack have different numbers of channels.
    #[error("frame {frame} has {got} channels, expected {expected}")]
    InconsistentChannels {
        /// The frame index.
        frame: u64,
        /// The number of channels of the first frame.
        expected: usize,
        /// The number of channels of the frame.
        got: usize,
    },
    /// There are no datasets to read into a hyperstack.
    #[error("no datasets match the template {0}")]
    EmptyHyperstack(String),
}

/// The layout of an open dataset.
struct DatasetLayout {
    extents: Vec<u64>,
    element_type: ElementType,
    plan: StackPlan,
    calibration: Calibration,
}

impl DatasetLayout {
    /// Returns the size of the dataset in bytes, or [`None`] on overflow.
    fn size_in_bytes(&self) -> Option<u64> {
        self.extents
            .iter()
            .try_fold(self.element_type.size() as u64, |bytes, &extent| {
                bytes.checked_mul(extent)
            })
    }
}

fn describe<TStore: ?Sized + ReadableArrayStore>(
    store: &TStore,
    handle: &ArrayHandle,
) -> Result<DatasetLayout, ReadError> {
    let extents = store.shape(handle)?;
    let element_type = store.element_type(handle)?;
    let plan = topology::plan(&extents)?;
    let calibration = Calibration::from_attribute(store.attribute(handle, ELEMENT_SIZE_ATTRIBUTE)?.as_ref());
    log::info!(
        "reading {}: {}D {element_type} ({}) as {plan}",
        handle.path(),
        extents.len(),
        extents.iter().join("x")
    );
    Ok(DatasetLayout {
        extents,
        element_type,
        plan,
        calibration,
    })
}

/// Open the dataset at `path` and describe it, closing it again on failure.
fn open<TStore: ?Sized + ReadableArrayStore>(
    store: &TStore,
    path: &DatasetPath,
) -> Result<(ArrayHandle, DatasetLayout), ReadError> {
    let handle = store.open(path)?;
    match describe(store, &handle) {
        Ok(layout) => Ok((handle, layout)),
        Err(err) => {
            store.close(handle)?;
            Err(err)
        }
    }
}

/// Fail with [`ReadError::OutOfMemory`] if `bytes` cannot be held in memory or exceed the eager memory limit of `config`.
fn check_memory(path: &DatasetPath, bytes: Option<u64>, config: &Config) -> Result<(), ReadError> {
    let out_of_memory = || ReadError::OutOfMemory {
        path: path.clone(),
        bytes: bytes.unwrap_or(u64::MAX),
    };
    let bytes = bytes.ok_or_else(out_of_memory)?;
    let fits = usize::try_from(bytes).is_ok()
        && config.eager_memory_limit().map_or(true, |limit| bytes <= limit);
    if fits {
        Ok(())
    } else {
        Err(out_of_memory())
    }
}

/// Read all planes of an open dataset, closing it as soon as it has been read.
fn read_planes<TStore: ?Sized + ReadableArrayStore>(
    store: &TStore,
    handle: ArrayHandle,
    layout: &DatasetLayout,
    config: &Config,
) -> Result<Vec<Plane>, ReadError> {
    let path = handle.path().clone();
    let buffer = store.read_full(&handle);
    store.close(handle)?;
    let (buffer, element_type) = narrow(buffer?, layout.element_type, config.narrow_policy());
    log::debug!("read {} {element_type} elements of {path}", buffer.len());

    let plan = &layout.plan;
    let mut planes = Vec::new();
    planes
        .try_reserve_exact(plan.num_planes())
        .map_err(|_| ReadError::OutOfMemory {
            path,
            bytes: layout.size_in_bytes().unwrap_or(u64::MAX),
        })?;
    let plane_elements = plan.stored_plane_elements();
    for index in 0..plan.num_stored_planes() {
        let elements = plane::slice(&buffer, index * plane_elements, plane_elements)?;
        if plan.is_rgb() {
            for channel in plane::deinterleave_rgb(&elements, plan.plane_shape())? {
                planes.push(Plane::new(plan.plane_shape(), channel)?);
            }
        } else {
            planes.push(Plane::new(plan.plane_shape(), elements)?);
        }
    }
    Ok(planes)
}

/// Read the dataset at `path` into an [`ImageStack`].
///
/// A [`LoadStrategy::Virtual`] request is honoured for grayscale datasets of rank 3 and 4, other datasets are read eagerly.
/// A virtual stack holds the dataset open until it is closed or dropped.
///
/// The stack is calibrated with the [`ELEMENT_SIZE_ATTRIBUTE`] of the dataset.
///
/// # Errors
/// Returns a [`ReadError`] if the dataset cannot be read.
/// In particular, [`ReadError::OutOfMemory`] if an eager read exceeds the [eager memory limit](Config#eager-memory-limit) of `config`.
pub fn read_dataset<'a, TStore: ?Sized + ReadableArrayStore>(
    store: &'a TStore,
    path: &DatasetPath,
    strategy: LoadStrategy,
    config: &Config,
) -> Result<ImageStack<'a, TStore>, ReadError> {
    let (handle, layout) = open(store, path)?;
    match layout.plan.choose_strategy(strategy) {
        LoadStrategy::Virtual => {
            let source = VirtualPlaneSource::new(store, handle, config.narrow_policy())?;
            Ok(ImageStack::from_virtual(path.as_str(), source).with_calibration(layout.calibration))
        }
        LoadStrategy::Eager => {
            if let Err(err) = check_memory(path, layout.size_in_bytes(), config) {
                store.close(handle)?;
                return Err(err);
            }
            let planes = read_planes(store, handle, &layout, config)?;
            let plan = &layout.plan;
            Ok(ImageStack::new(
                path.as_str(),
                plan.plane_shape(),
                planes,
                plan.channels(),
                plan.slices(),
                plan.frames(),
            )?
            .with_rgb(plan.is_rgb())?
            .with_calibration(layout.calibration))
        }
    }
}

/// Read each dataset of `paths` with [`read_dataset`].
///
/// A dataset which fails to read is logged and does not stop the others.
pub fn read_datasets<'a, TStore: ?Sized + ReadableArrayStore>(
    store: &'a TStore,
    paths: &[DatasetPath],
    strategy: LoadStrategy,
    config: &Config,
) -> Vec<(DatasetPath, Result<ImageStack<'a, TStore>, ReadError>)> {
    paths
        .iter()
        .map(|path| {
            let stack = read_dataset(store, path, strategy, config);
            if let Err(err) = &stack {
                log::warn!("failed to read {path}: {err}");
            }
            (path.clone(), stack)
        })
        .collect()
}

/// Returns the template override held by the dataset at the [template group](Config#template-group) of `config`, if any.
///
/// # Errors
/// Returns a [`StoreError`] if there is an underlying store error.
pub fn template_override<TStore: ?Sized + ReadableArrayStore>(
    store: &TStore,
    config: &Config,
) -> Result<Option<String>, StoreError> {
    let Ok(path) = DatasetPath::new(config.template_group()) else {
        return Ok(None);
    };
    let handle = match store.open(&path) {
        Ok(handle) => handle,
        Err(StoreError::NotFound(_) | StoreError::NotADataset(_)) => return Ok(None),
        Err(err) => return Err(err),
    };
    let attribute = store.attribute(&handle, TEMPLATE_ATTRIBUTE);
    store.close(handle)?;
    Ok(attribute?.and_then(|value| value.as_str().map(str::to_string)))
}

/// Group the dataset names of `store` by the template of `config`.
///
/// The template is taken from [`template_override`] if present.
///
/// # Errors
/// Returns a [`ReadError`] if the datasets cannot be listed or the template is invalid.
pub fn group_datasets<TStore: ?Sized + ReadableArrayStore + ListableArrayStore>(
    store: &TStore,
    config: &Config,
) -> Result<GroupingResult, ReadError> {
    let names = store.list_names()?;
    let names = names.iter().map(DatasetPath::as_str).collect::<Vec<_>>();
    let template = match template_override(store, config)? {
        Some(template) => {
            log::info!("using template {template} from {}", config.template_group());
            template
        }
        None => config.template().to_string(),
    };
    let grouper = AxisGrouper::new(grammar::compile(&template)?, config.numeric_pattern())?;
    let result = grouper.group(&names);
    if config.show_unmatched_names() && !result.unmatched_names().is_empty() {
        log::info!(
            "datasets not matching {template}: {}",
            result.unmatched_names().iter().join(", ")
        );
    }
    Ok(result)
}

/// Read the datasets of `grouping`, one per frame and channel, into a hyperstack.
///
/// Every dataset must be a grayscale dataset of rank 2 or 3 with the same plane shape and number of slices.
/// The stack is calibrated with the [`ELEMENT_SIZE_ATTRIBUTE`] of the first dataset.
///
/// # Errors
/// Returns a [`ReadError`] if a dataset cannot be read or does not fit the hyperstack.
/// In particular, [`ReadError::OutOfMemory`] if the datasets together exceed the [eager memory limit](Config#eager-memory-limit) of `config`.
pub fn read_hyperstack<'a, TStore: ?Sized + ReadableArrayStore>(
    store: &'a TStore,
    grouping: &GroupingResult,
    config: &Config,
) -> Result<ImageStack<'a, TStore>, ReadError> {
    let template = grouping.template_tokens().template();
    let Some(channels) = grouping.frame(0).map(|frame| frame.num_channels()) else {
        return Err(ReadError::EmptyHyperstack(template.to_string()));
    };

    // (plan, calibration) of the first dataset
    let mut first: Option<(StackPlan, Calibration)> = None;
    let mut bytes: u64 = 0;
    let mut planes = Vec::new();
    for frame in grouping.frames() {
        if frame.num_channels() != channels {
            return Err(ReadError::InconsistentChannels {
                frame: frame.frame_index(),
                expected: channels,
                got: frame.num_channels(),
            });
        }
        let mut channel_planes = Vec::with_capacity(channels);
        for channel in frame.channel_indices() {
            let path = grouping.dataset_path(frame.frame_index(), channel)?;
            let (handle, layout) = open(store, &path)?;
            let plan = layout.plan;
            let incompatible = if plan.is_rgb() || plan.rank() > 3 {
                Some(format!("expected a grayscale dataset of rank 2 or 3, got {plan}"))
            } else {
                match first {
                    Some((first_plan, _))
                        if (first_plan.plane_shape(), first_plan.slices())
                            != (plan.plane_shape(), plan.slices()) =>
                    {
                        Some(format!("expected {first_plan}, got {plan}"))
                    }
                    _ => None,
                }
            };
            let dataset_bytes = layout.size_in_bytes().and_then(|size| size.checked_add(bytes));
            let checked = match incompatible {
                Some(reason) => Err(ReadError::IncompatibleDataset {
                    path: path.clone(),
                    reason,
                }),
                None => check_memory(&path, dataset_bytes, config),
            };
            if let Err(err) = checked {
                store.close(handle)?;
                return Err(err);
            }
            bytes = dataset_bytes.unwrap_or(u64::MAX);
            first.get_or_insert((plan, layout.calibration));
            channel_planes.push(read_planes(store, handle, &layout, config)?.into_iter());
        }
        // interleave the slices of each channel
        let slices = first.map_or(0, |(plan, _)| plan.slices());
        for _ in 0..slices {
            for channel in &mut channel_planes {
                planes.extend(channel.next());
            }
        }
    }

    let Some((plan, calibration)) = first else {
        return Err(ReadError::EmptyHyperstack(template.to_string()));
    };
    log::info!(
        "read hyperstack {template}: {channels} channels x {} slices x {} frames",
        plan.slices(),
        grouping.frame_count()
    );
    Ok(ImageStack::new(
        template,
        plan.plane_shape(),
        planes,
        channels,
        plan.slices(),
        grouping.frame_count(),
    )?
    .with_calibration(calibration))
}

/// Read the frames and channels of `grouping` selected by `frame_range` and `channel_range` into a hyperstack.
fn read_selected<'a, TStore: ?Sized + ReadableArrayStore>(
    store: &'a TStore,
    grouping: &GroupingResult,
    config: &Config,
    frame_range: Option<Range>,
    channel_range: Option<Range>,
) -> Result<(GroupingResult, ImageStack<'a, TStore>), ReadError> {
    let empty = || ReadError::EmptyHyperstack(grouping.template_tokens().template().to_string());
    let frame_range = frame_range
        .or_else(|| range::default_frame_range(grouping))
        .ok_or_else(empty)?;
    let channel_range = channel_range
        .or_else(|| range::default_channel_range(grouping))
        .ok_or_else(empty)?;
    let grouping = range::apply_range(grouping, &frame_range, &channel_range)?;
    let stack = read_hyperstack(store, &grouping, config)?;
    Ok((grouping, stack))
}

/// Group the datasets of `store` and read the selected frames and channels into a hyperstack.
///
/// Ranges default to [`range::default_frame_range`] and [`range::default_channel_range`].
/// Returns the grouping after [`range::apply_range`], reporting any skipped frames, and the hyperstack.
///
/// # Errors
/// Returns a [`ReadError`] if grouping, range selection, or reading fails.
pub fn read_grouped<'a, TStore: ?Sized + ReadableArrayStore + ListableArrayStore>(
    store: &'a TStore,
    config: &Config,
    frame_range: Option<Range>,
    channel_range: Option<Range>,
) -> Result<(GroupingResult, ImageStack<'a, TStore>), ReadError> {
    let grouping = group_datasets(store, config)?;
    read_selected(store, &grouping, config, frame_range, channel_range)
}

/// The image stacks of a store, see [`read_store`].
pub enum StoreContents<'a, TStore: ?Sized + ReadableArrayStore> {
    /// A hyperstack of the datasets matching the template, with their grouping.
    Hyperstack(GroupingResult, ImageStack<'a, TStore>),
    /// Every dataset read separately.
    Datasets(Vec<(DatasetPath, Result<ImageStack<'a, TStore>, ReadError>)>),
}

/// Read every dataset of `store`.
///
/// If [grouping by name](Config#group-by-name) is enabled and any dataset name matches the template, the matching datasets are read into a hyperstack with the default ranges.
/// Otherwise, every dataset is read with [`read_datasets`].
///
/// # Errors
/// Returns a [`ReadError`] if the datasets cannot be listed, or the hyperstack cannot be read.
pub fn read_store<'a, TStore: ?Sized + ReadableArrayStore + ListableArrayStore>(
    store: &'a TStore,
    config: &Config,
    strategy: LoadStrategy,
) -> Result<StoreContents<'a, TStore>, ReadError> {
    if config.group_by_name() {
        let grouping = group_datasets(store, config)?;
        if !grouping.is_empty() {
            let (grouping, stack) = read_selected(store, &grouping, config, None, None)?;
            return Ok(StoreContents::Hyperstack(grouping, stack));
        }
    }
    let paths = store.list_names()?;
    Ok(StoreContents::Datasets(read_datasets(store, &paths, strategy, config)))
}
