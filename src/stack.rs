//! Image stacks.
//!
//! An [`ImageStack`] is an index-addressable sequence of 2D planes with the dimensions `(channels, slices, frames)` that reshape it into named axes.
//! Planes are ordered frame, then slice, then channel (innermost), so the plane of `(channel, slice, frame)` is at [`ImageStack::stack_index`].
//!
//! The planes of a stack are either held in memory ([`PlaneSequence::Eager`]) or read on demand from an open dataset ([`PlaneSequence::Virtual`]).

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    element::ElementType,
    plane::{Plane, PlaneShape},
    store::{ReadableArrayStore, StoreError},
    virtual_source::{VirtualPlaneSource, VirtualSourceError},
};

/// The name of the dataset attribute holding the physical element size.
pub const ELEMENT_SIZE_ATTRIBUTE: &str = "element_size_um";

/// The physical size of a stack element in micrometres.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// The distance between slices.
    pub pixel_depth: f64,
    /// The height of a pixel.
    pub pixel_height: f64,
    /// The width of a pixel.
    pub pixel_width: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

impl Calibration {
    /// Create a new calibration.
    #[must_use]
    pub const fn new(pixel_depth: f64, pixel_height: f64, pixel_width: f64) -> Self {
        Self {
            pixel_depth,
            pixel_height,
            pixel_width,
        }
    }

    /// Create a calibration from an [`ELEMENT_SIZE_ATTRIBUTE`] value, `[depth, height, width]`.
    ///
    /// An absent attribute gives the default calibration.
    /// So does a malformed attribute, which is logged.
    #[must_use]
    pub fn from_attribute(value: Option<&serde_json::Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        match serde_json::from_value::<[f64; 3]>(value.clone()) {
            Ok([depth, height, width]) => Self::new(depth, height, width),
            Err(err) => {
                log::warn!("{ELEMENT_SIZE_ATTRIBUTE} {value} has the wrong format ({err}), using (1, 1, 1)");
                Self::default()
            }
        }
    }

    /// Returns the [`ELEMENT_SIZE_ATTRIBUTE`] value of the calibration, `[depth, height, width]`.
    #[must_use]
    pub fn to_attribute(&self) -> serde_json::Value {
        serde_json::json!([self.pixel_depth, self.pixel_height, self.pixel_width])
    }
}

/// An image stack construction error.
#[derive(Clone, Debug, Error)]
pub enum StackError {
    /// The number of planes does not match the stack dimensions.
    #[error("{planes} planes do not fill {channels} channels x {slices} slices x {frames} frames")]
    InvalidDimensions {
        /// The number of planes.
        planes: usize,
        /// The number of channels.
        channels: usize,
        /// The number of slices.
        slices: usize,
        /// The number of frames.
        frames: usize,
    },
    /// A plane has a different shape to the stack.
    #[error("plane {index} has shape {got}, expected {expected}")]
    IncompatiblePlaneShape {
        /// The plane index.
        index: usize,
        /// The stack plane shape.
        expected: PlaneShape,
        /// The plane shape.
        got: PlaneShape,
    },
    /// A plane has a different element type to the first plane.
    #[error("plane {index} holds {got} elements, expected {expected}")]
    IncompatiblePlaneType {
        /// The plane index.
        index: usize,
        /// The element type of the first plane.
        expected: ElementType,
        /// The element type of the plane.
        got: ElementType,
    },
    /// An RGB stack does not have three channels.
    #[error("an RGB stack must have 3 channels, got {0}")]
    InvalidRgbChannels(usize),
}

/// The planes of an [`ImageStack`].
pub enum PlaneSequence<'a, TStore: ?Sized + ReadableArrayStore> {
    /// Planes held in memory.
    Eager(Vec<Plane>),
    /// Planes read one at a time from an open dataset.
    Virtual(VirtualPlaneSource<'a, TStore>),
}

/// An image stack.
///
/// The store type parameter only matters for virtual stacks, see [`EagerImageStack`] for stacks held in memory.
pub struct ImageStack<'a, TStore: ?Sized + ReadableArrayStore> {
    title: String,
    planes: PlaneSequence<'a, TStore>,
    plane_shape: PlaneShape,
    channels: usize,
    slices: usize,
    frames: usize,
    calibration: Calibration,
    display_ranges: Vec<Option<(f64, f64)>>,
    is_rgb: bool,
}

/// An image stack held in memory.
pub type EagerImageStack = ImageStack<'static, dyn ReadableArrayStore>;

impl<'a, TStore: ?Sized + ReadableArrayStore> ImageStack<'a, TStore> {
    /// Create a new stack of `planes` of `plane_shape`, ordered frame, slice, then channel.
    ///
    /// The display range of each channel is set to the range of its elements.
    ///
    /// # Errors
    /// Returns a [`StackError`] if the planes do not fill the dimensions, or do not share `plane_shape` and an element type.
    pub fn new(
        title: impl Into<String>,
        plane_shape: PlaneShape,
        planes: Vec<Plane>,
        channels: usize,
        slices: usize,
        frames: usize,
    ) -> Result<Self, StackError> {
        if planes.len() != channels * slices * frames {
            return Err(StackError::InvalidDimensions {
                planes: planes.len(),
                channels,
                slices,
                frames,
            });
        }
        let element_type = planes.first().map(Plane::element_type);
        for (index, plane) in planes.iter().enumerate() {
            if plane.shape() != plane_shape {
                return Err(StackError::IncompatiblePlaneShape {
                    index,
                    expected: plane_shape,
                    got: plane.shape(),
                });
            }
            if let Some(expected) = element_type {
                if plane.element_type() != expected {
                    return Err(StackError::IncompatiblePlaneType {
                        index,
                        expected,
                        got: plane.element_type(),
                    });
                }
            }
        }

        let mut display_ranges: Vec<Option<(f64, f64)>> = vec![None; channels];
        for (index, plane) in planes.iter().enumerate() {
            let range = &mut display_ranges[index % channels];
            *range = match (*range, plane.data().min_max()) {
                (Some((min, max)), Some((plane_min, plane_max))) => {
                    Some((min.min(plane_min), max.max(plane_max)))
                }
                (range, plane_range) => range.or(plane_range),
            };
        }

        Ok(Self {
            title: title.into(),
            planes: PlaneSequence::Eager(planes),
            plane_shape,
            channels,
            slices,
            frames,
            calibration: Calibration::default(),
            display_ranges,
            is_rgb: false,
        })
    }

    /// Create a single channel stack reading its planes from `source`.
    ///
    /// The stack owns the source, closing it on [`close`](ImageStack::close) or drop.
    #[must_use]
    pub fn from_virtual(title: impl Into<String>, source: VirtualPlaneSource<'a, TStore>) -> Self {
        let plan = *source.plan();
        Self {
            title: title.into(),
            plane_shape: plan.plane_shape(),
            channels: 1,
            slices: plan.slices(),
            frames: plan.frames(),
            planes: PlaneSequence::Virtual(source),
            calibration: Calibration::default(),
            display_ranges: vec![None],
            is_rgb: false,
        }
    }

    /// Set the calibration.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Mark the channels of the stack as the red, green, and blue components of RGB planes.
    ///
    /// # Errors
    /// Returns [`StackError::InvalidRgbChannels`] if `is_rgb` is true and the stack does not have three channels.
    pub fn with_rgb(mut self, is_rgb: bool) -> Result<Self, StackError> {
        if is_rgb && self.channels != 3 {
            return Err(StackError::InvalidRgbChannels(self.channels));
        }
        self.is_rgb = is_rgb;
        Ok(self)
    }

    /// Returns true if the channels are the components of RGB planes.
    #[must_use]
    pub const fn is_rgb(&self) -> bool {
        self.is_rgb
    }

    /// Returns the title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the plane shape.
    #[must_use]
    pub const fn plane_shape(&self) -> PlaneShape {
        self.plane_shape
    }

    /// Returns the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the number of slices.
    #[must_use]
    pub const fn slices(&self) -> usize {
        self.slices
    }

    /// Returns the number of frames.
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Returns `(channels, slices, frames)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize, usize) {
        (self.channels, self.slices, self.frames)
    }

    /// Returns the number of planes.
    #[must_use]
    pub const fn num_planes(&self) -> usize {
        self.channels * self.slices * self.frames
    }

    /// Returns the calibration.
    #[must_use]
    pub const fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Returns the plane sequence.
    #[must_use]
    pub const fn planes(&self) -> &PlaneSequence<'a, TStore> {
        &self.planes
    }

    /// Returns true if planes are read on demand.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self.planes, PlaneSequence::Virtual(_))
    }

    /// Returns the element type of the planes of an in-memory stack, or [`None`] if the stack is virtual or empty.
    #[must_use]
    pub fn element_type(&self) -> Option<ElementType> {
        match &self.planes {
            PlaneSequence::Eager(planes) => planes.first().map(Plane::element_type),
            PlaneSequence::Virtual(_) => None,
        }
    }

    /// Returns the display range `(min, max)` of `channel`.
    ///
    /// This is [`None`] for virtual stacks and channels without finite elements.
    #[must_use]
    pub fn display_range(&self, channel: usize) -> Option<(f64, f64)> {
        self.display_ranges.get(channel).copied().flatten()
    }

    /// Returns the plane index of `(channel, slice, frame)`, or [`None`] if it is out of bounds.
    #[must_use]
    pub const fn stack_index(&self, channel: usize, slice: usize, frame: usize) -> Option<usize> {
        if channel < self.channels && slice < self.slices && frame < self.frames {
            Some((frame * self.slices + slice) * self.channels + channel)
        } else {
            None
        }
    }

    /// Returns plane `index`, reading it if the stack is virtual.
    ///
    /// # Errors
    /// Returns [`VirtualSourceError::PlaneIndexOutOfBounds`] if `index` is out of bounds, or a [`VirtualSourceError`] if a virtual read fails.
    pub fn plane(&self, index: usize) -> Result<Cow<'_, Plane>, VirtualSourceError> {
        match &self.planes {
            PlaneSequence::Eager(planes) => {
                planes
                    .get(index)
                    .map(Cow::Borrowed)
                    .ok_or(VirtualSourceError::PlaneIndexOutOfBounds {
                        index: index as u64,
                        count: planes.len() as u64,
                    })
            }
            PlaneSequence::Virtual(source) => Ok(Cow::Owned(source.read_plane(index as u64)?)),
        }
    }

    /// Consume the stack and return its planes, reading every plane if the stack is virtual.
    ///
    /// # Errors
    /// Returns a [`VirtualSourceError`] if a virtual read fails.
    pub fn into_planes(self) -> Result<Vec<Plane>, VirtualSourceError> {
        match self.planes {
            PlaneSequence::Eager(planes) => Ok(planes),
            PlaneSequence::Virtual(source) => (0..source.plane_count())
                .map(|index| source.read_plane(index))
                .collect(),
        }
    }

    /// Close the dataset of a virtual stack.
    ///
    /// This does nothing for an in-memory stack.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if the store fails to close the dataset.
    pub fn close(&mut self) -> Result<(), StoreError> {
        match &mut self.planes {
            PlaneSequence::Eager(_) => Ok(()),
            PlaneSequence::Virtual(source) => source.close(),
        }
    }

    /// Return the stack as a 3D [`ndarray::Array3`] of `f32` with shape `[planes, rows, cols]`.
    ///
    /// # Errors
    /// Returns a [`VirtualSourceError`] if a virtual read fails.
    #[cfg(feature = "ndarray")]
    pub fn to_ndarray_f32(&self) -> Result<ndarray::Array3<f32>, VirtualSourceError> {
        let mut array = ndarray::Array3::<f32>::zeros((
            self.num_planes(),
            self.plane_shape.rows(),
            self.plane_shape.cols(),
        ));
        for (index, mut view) in array.outer_iter_mut().enumerate() {
            view.assign(&self.plane(index)?.to_ndarray_f32());
        }
        Ok(array)
    }
}

impl<TStore: ?Sized + ReadableArrayStore> std::fmt::Debug for PlaneSequence<'_, TStore> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eager(planes) => f.debug_tuple("Eager").field(planes).finish(),
            Self::Virtual(source) => f.debug_tuple("Virtual").field(source).finish(),
        }
    }
}

impl<TStore: ?Sized + ReadableArrayStore> std::fmt::Debug for ImageStack<'_, TStore> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStack")
            .field("title", &self.title)
            .field("planes", &self.planes)
            .field("plane_shape", &self.plane_shape)
            .field("channels", &self.channels)
            .field("slices", &self.slices)
            .field("frames", &self.frames)
            .field("calibration", &self.calibration)
            .field("display_ranges", &self.display_ranges)
            .field("is_rgb", &self.is_rgb)
            .finish()
    }
}

impl<TStore: ?Sized + ReadableArrayStore> std::fmt::Display for ImageStack<'_, TStore> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} channels x {} slices x {} frames of {}",
            self.title, self.channels, self.slices, self.frames, self.plane_shape
        )?;
        if self.is_rgb {
            write!(f, " (rgb)")?;
        }
        if self.is_virtual() {
            write!(f, " (virtual)")?;
        }
        Ok(())
    }
}
