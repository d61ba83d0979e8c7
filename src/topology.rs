//! Stack topology of multidimensional arrays.
//!
//! [`plan`] classifies the rank and extents of an array into a [`StackPlan`]: how many channels, slices, and frames of 2D planes the array holds, and whether its last axis holds interleaved RGB components.
//!
//! Axis order is outermost first and the last axis varies fastest:
//!
//! | rank | last extent is 3 | channels | slices | frames | RGB |
//! |---|---|---|---|---|---|
//! | 2 | - | 1 | 1 | 1 | no |
//! | 3 | yes | 3 | 1 | 1 | yes |
//! | 3 | no | 1 | `extents[0]` | 1 | no |
//! | 4 | yes | 3 | `extents[0]` | 1 | yes |
//! | 4 | no | 1 | `extents[1]` | `extents[0]` | no |
//! | 5 | yes | 3 | `extents[1]` | `extents[0]` | yes |

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plane::PlaneShape;

/// An unsupported rank error.
///
/// Raised for ranks outside 2 to 5, a rank 5 array without an RGB last axis, or extents which cannot be addressed in memory.
#[derive(Clone, Debug, Error)]
#[error("unsupported rank {rank} with extents {extents:?}")]
pub struct UnsupportedRankError {
    rank: usize,
    extents: Vec<u64>,
}

impl UnsupportedRankError {
    /// Create a new unsupported rank error.
    #[must_use]
    pub fn new(extents: &[u64]) -> Self {
        Self {
            rank: extents.len(),
            extents: extents.to_vec(),
        }
    }

    /// Returns the rejected rank.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }
}

/// How a dataset is loaded.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Serialize, Deserialize)]
pub enum LoadStrategy {
    /// Read the whole array into memory at once.
    #[default]
    Eager,
    /// Read one plane per request through a [`VirtualPlaneSource`](crate::virtual_source::VirtualPlaneSource).
    Virtual,
}

/// The stack shape of an array.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display("{channels} channels x {slices} slices x {frames} frames of {plane_shape} (rgb: {is_rgb})")]
pub struct StackPlan {
    rank: usize,
    channels: usize,
    slices: usize,
    frames: usize,
    is_rgb: bool,
    plane_shape: PlaneShape,
}

fn to_usize(value: u64, extents: &[u64]) -> Result<usize, UnsupportedRankError> {
    usize::try_from(value).map_err(|_| UnsupportedRankError::new(extents))
}

/// Classify an array with `extents` into a [`StackPlan`].
///
/// # Errors
/// Returns [`UnsupportedRankError`] if the rank is not supported, see the [module documentation](self).
pub fn plan(extents: &[u64]) -> Result<StackPlan, UnsupportedRankError> {
    let rank = extents.len();
    let rgb = extents.last() == Some(&3);
    // (channels, slices, frames, plane rows axis)
    let (channels, slices, frames, rows_axis) = match (rank, rgb) {
        (2, _) => (1, 1, 1, 0),
        (3, true) => (3, 1, 1, 0),
        (3, false) => (1, extents[0], 1, 1),
        (4, true) => (3, extents[0], 1, 1),
        (4, false) => (1, extents[1], extents[0], 2),
        (5, true) => (3, extents[1], extents[0], 2),
        _ => return Err(UnsupportedRankError::new(extents)),
    };
    let plane_shape = PlaneShape::new(
        to_usize(extents[rows_axis], extents)?,
        to_usize(extents[rows_axis + 1], extents)?,
    );
    Ok(StackPlan {
        rank,
        channels,
        slices: to_usize(slices, extents)?,
        frames: to_usize(frames, extents)?,
        is_rgb: rank > 2 && rgb,
        plane_shape,
    })
}

impl StackPlan {
    /// Returns the rank of the planned array.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
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

    /// Returns true if the last axis holds interleaved RGB components.
    #[must_use]
    pub const fn is_rgb(&self) -> bool {
        self.is_rgb
    }

    /// Returns the shape of each plane.
    #[must_use]
    pub const fn plane_shape(&self) -> PlaneShape {
        self.plane_shape
    }

    /// Returns the total number of planes in the stack, `channels * slices * frames`.
    #[must_use]
    pub const fn num_planes(&self) -> usize {
        self.channels * self.slices * self.frames
    }

    /// Returns the number of planes stored in the array, ignoring RGB components.
    #[must_use]
    pub const fn num_stored_planes(&self) -> usize {
        self.slices * self.frames
    }

    /// Returns the number of elements in one stored plane, including RGB components.
    #[must_use]
    pub const fn stored_plane_elements(&self) -> usize {
        let elements = self.plane_shape.num_elements();
        if self.is_rgb {
            elements * 3
        } else {
            elements
        }
    }

    /// Returns true if the array can be read one plane at a time.
    ///
    /// Only grayscale arrays of rank 3 or 4 can.
    #[must_use]
    pub const fn supports_virtual(&self) -> bool {
        !self.is_rgb && matches!(self.rank, 3 | 4)
    }

    /// Choose the load strategy for a `requested` strategy.
    ///
    /// Falls back to [`LoadStrategy::Eager`] if the array does not support virtual reads.
    #[must_use]
    pub fn choose_strategy(&self, requested: LoadStrategy) -> LoadStrategy {
        match requested {
            LoadStrategy::Virtual if !self.supports_virtual() => {
                log::info!("virtual loading is not supported for {self}, loading eagerly");
                LoadStrategy::Eager
            }
            requested => requested,
        }
    }
}

/// Returns the array extents for writing `num_planes` planes of `plane_shape` to a single dataset.
///
/// Grayscale stacks are `[rows, cols]` for a single plane, otherwise `[planes, rows, cols]`.
/// RGB stacks gain a trailing axis of extent 3.
/// This is the inverse of [`plan`] for ranks 2 to 4.
#[must_use]
pub fn shape_for_stack(num_planes: usize, plane_shape: PlaneShape, is_rgb: bool) -> Vec<u64> {
    let mut shape = Vec::with_capacity(4);
    if num_planes != 1 {
        shape.push(num_planes as u64);
    }
    shape.push(plane_shape.rows() as u64);
    shape.push(plane_shape.cols() as u64);
    if is_rgb {
        shape.push(3);
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(extents: &[u64]) -> (usize, usize, usize, bool) {
        let plan = plan(extents).unwrap();
        (plan.channels(), plan.slices(), plan.frames(), plan.is_rgb())
    }

    #[test]
    fn topology_table() {
        assert_eq!(counts(&[4, 5]), (1, 1, 1, false));
        assert_eq!(counts(&[4, 3]), (1, 1, 1, false));
        assert_eq!(counts(&[4, 5, 3]), (3, 1, 1, true));
        assert_eq!(counts(&[6, 4, 5]), (1, 6, 1, false));
        assert_eq!(counts(&[6, 4, 5, 3]), (3, 6, 1, true));
        assert_eq!(counts(&[7, 6, 4, 5]), (1, 6, 7, false));
        assert_eq!(counts(&[7, 6, 4, 5, 3]), (3, 6, 7, true));
    }

    #[test]
    fn topology_plane_shape() {
        assert_eq!(plan(&[4, 5]).unwrap().plane_shape(), PlaneShape::new(4, 5));
        assert_eq!(plan(&[4, 5, 3]).unwrap().plane_shape(), PlaneShape::new(4, 5));
        assert_eq!(plan(&[6, 4, 5]).unwrap().plane_shape(), PlaneShape::new(4, 5));
        assert_eq!(plan(&[6, 4, 5, 3]).unwrap().plane_shape(), PlaneShape::new(4, 5));
        assert_eq!(plan(&[7, 6, 4, 5]).unwrap().plane_shape(), PlaneShape::new(4, 5));
        assert_eq!(plan(&[7, 6, 4, 5, 3]).unwrap().plane_shape(), PlaneShape::new(4, 5));
        let plan = plan(&[7, 6, 4, 5, 3]).unwrap();
        assert_eq!(plan.num_planes(), 126);
        assert_eq!(plan.num_stored_planes(), 42);
        assert_eq!(plan.stored_plane_elements(), 60);
    }

    #[test]
    fn topology_unsupported() {
        assert_eq!(plan(&[7, 6, 4, 5, 2]).unwrap_err().rank(), 5);
        assert!(plan(&[1, 2, 3, 4, 5, 3]).is_err());
        assert!(plan(&[5]).is_err());
        assert!(plan(&[]).is_err());
    }

    #[test]
    fn topology_strategy() {
        let grayscale = plan(&[6, 4, 5]).unwrap();
        assert!(grayscale.supports_virtual());
        assert_eq!(
            grayscale.choose_strategy(LoadStrategy::Virtual),
            LoadStrategy::Virtual
        );
        let rgb = plan(&[6, 4, 5, 3]).unwrap();
        assert!(!rgb.supports_virtual());
        assert_eq!(rgb.choose_strategy(LoadStrategy::Virtual), LoadStrategy::Eager);
        assert!(!plan(&[4, 5]).unwrap().supports_virtual());
        assert!(plan(&[7, 6, 4, 5]).unwrap().supports_virtual());
    }

    #[test]
    fn topology_shape_for_stack() {
        let shape = PlaneShape::new(4, 5);
        assert_eq!(shape_for_stack(1, shape, false), vec![4, 5]);
        assert_eq!(shape_for_stack(6, shape, false), vec![6, 4, 5]);
        assert_eq!(shape_for_stack(1, shape, true), vec![4, 5, 3]);
        assert_eq!(shape_for_stack(6, shape, true), vec![6, 4, 5, 3]);
        for planes in [1, 6] {
            for rgb in [false, true] {
                let plan = plan(&shape_for_stack(planes, shape, rgb)).unwrap();
                assert_eq!(plan.slices(), planes);
                assert_eq!(plan.is_rgb(), rgb);
                assert_eq!(plan.plane_shape(), shape);
            }
        }
    }
}
