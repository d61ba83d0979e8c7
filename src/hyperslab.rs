//! Hyperslabs.
//!
//! A [`Hyperslab`] selects a rectangular region of an array by a start offset and a count per axis.
//! It is a plain value passed explicitly to each read or write, so a selection is never shared between calls.

use derive_more::Display;
use itertools::izip;
use thiserror::Error;

/// A hyperslab.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, Default)]
#[display("start {start:?} count {count:?}")]
pub struct Hyperslab {
    start: Vec<u64>,
    count: Vec<u64>,
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// A hyperslab error.
#[derive(Clone, Debug, Error)]
pub enum HyperslabError {
    /// The hyperslab dimensionality does not match the array.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// The hyperslab is outside the bounds of the array.
    #[error("hyperslab {0} is out of bounds of array with shape {1:?}")]
    OutOfBounds(Hyperslab, Vec<u64>),
    /// A plane index is outside the planes of the array.
    #[error("plane index {0} is out of bounds for array with shape {1:?}")]
    PlaneOutOfBounds(u64, Vec<u64>),
    /// The array or hyperslab bytes have an unexpected length.
    #[error("expected {expected} bytes, got {got}")]
    InvalidBytesLength {
        /// The expected length.
        expected: u64,
        /// The actual length.
        got: usize,
    },
}

impl Hyperslab {
    /// Create a new hyperslab selecting the whole of an array with `shape`.
    #[must_use]
    pub fn new_with_shape(shape: Vec<u64>) -> Self {
        Self {
            start: vec![0; shape.len()],
            count: shape,
        }
    }

    /// Create a new hyperslab.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `count` do not match.
    pub fn new_with_start_count(
        start: Vec<u64>,
        count: Vec<u64>,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == count.len() {
            Ok(Self { start, count })
        } else {
            Err(IncompatibleDimensionalityError::new(count.len(), start.len()))
        }
    }

    /// Create a hyperslab selecting plane `plane_index` of an array with `extents`.
    ///
    /// The last two axes are the plane axes, and `plane_index` is linearised over the leading axes in row-major order.
    /// For a rank 3 array, plane `i` is `start [i, 0, 0]` `count [1, rows, cols]`.
    ///
    /// # Errors
    /// Returns [`HyperslabError::PlaneOutOfBounds`] if the array has fewer than two axes or `plane_index` is not less than [`num_planes`].
    pub fn for_plane(extents: &[u64], plane_index: u64) -> Result<Self, HyperslabError> {
        if extents.len() < 2 || plane_index >= num_planes(extents) {
            return Err(HyperslabError::PlaneOutOfBounds(
                plane_index,
                extents.to_vec(),
            ));
        }
        let leading = extents.len() - 2;
        let mut start = vec![0; extents.len()];
        let mut remainder = plane_index;
        for axis in (0..leading).rev() {
            start[axis] = remainder % extents[axis];
            remainder /= extents[axis];
        }
        let mut count = vec![1; leading];
        count.extend_from_slice(&extents[leading..]);
        Ok(Self { start, count })
    }

    /// Return the start of the hyperslab.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the count of the hyperslab.
    #[must_use]
    pub fn count(&self) -> &[u64] {
        &self.count
    }

    /// Return the dimensionality of the hyperslab.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the hyperslab.
    #[must_use]
    pub fn end_exc(&self) -> Vec<u64> {
        std::iter::zip(&self.start, &self.count)
            .map(|(start, count)| start + count)
            .collect()
    }

    /// Return the number of elements of the hyperslab.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.count.iter().product()
    }

    /// Returns true if the hyperslab is within the bounds of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(&self.start, &self.count, array_shape)
                .all(|(start, count, shape)| start.checked_add(*count).is_some_and(|end| end <= *shape))
    }

    fn validate(&self, array_shape: &[u64]) -> Result<(), HyperslabError> {
        if self.dimensionality() != array_shape.len() {
            Err(IncompatibleDimensionalityError::new(self.dimensionality(), array_shape.len()).into())
        } else if !self.inbounds(array_shape) {
            Err(HyperslabError::OutOfBounds(self.clone(), array_shape.to_vec()))
        } else {
            Ok(())
        }
    }

    /// Returns the contiguous runs of the hyperslab within an array of `array_shape` as `(linearised start, length)` element pairs.
    ///
    /// Trailing axes that are selected in full are merged into a single run.
    ///
    /// # Errors
    /// Returns [`HyperslabError`] if the hyperslab is incompatible with or out of bounds of `array_shape`.
    pub fn contiguous_runs(&self, array_shape: &[u64]) -> Result<Vec<(u64, u64)>, HyperslabError> {
        self.validate(array_shape)?;
        let rank = self.dimensionality();
        if rank == 0 {
            return Ok(vec![(0, 1)]);
        }
        if self.count.contains(&0) {
            return Ok(vec![]);
        }

        let mut strides = vec![1u64; rank];
        for axis in (0..rank - 1).rev() {
            strides[axis] = strides[axis + 1] * array_shape[axis + 1];
        }

        let mut axis = rank - 1;
        let mut run_length = self.count[axis];
        while axis > 0 && self.count[axis] == array_shape[axis] {
            axis -= 1;
            run_length *= self.count[axis];
        }
        let inner_offset: u64 = (axis..rank).map(|i| self.start[i] * strides[i]).sum();

        // odometer over the axes outside of the run
        let mut index = self.start[..axis].to_vec();
        let mut runs = Vec::new();
        loop {
            let offset: u64 = std::iter::zip(&index, &strides)
                .map(|(index, stride)| index * stride)
                .sum();
            runs.push((inner_offset + offset, run_length));
            let mut i = axis;
            loop {
                if i == 0 {
                    return Ok(runs);
                }
                i -= 1;
                index[i] += 1;
                if index[i] < self.start[i] + self.count[i] {
                    break;
                }
                index[i] = self.start[i];
            }
        }
    }

    fn check_array_bytes(
        array_bytes: usize,
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<(), HyperslabError> {
        let expected = array_shape
            .iter()
            .fold(element_size as u64, |expected, extent| expected.saturating_mul(*extent));
        if array_bytes as u64 == expected {
            Ok(())
        } else {
            Err(HyperslabError::InvalidBytesLength {
                expected,
                got: array_bytes,
            })
        }
    }

    /// Return the bytes of the hyperslab from the bytes of an array with `array_shape` and `element_size`.
    ///
    /// # Errors
    /// Returns [`HyperslabError`] if the hyperslab is incompatible with or out of bounds of `array_shape`, or `array_bytes` has the wrong length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn extract_bytes(
        &self,
        array_bytes: &[u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<Vec<u8>, HyperslabError> {
        Self::check_array_bytes(array_bytes.len(), array_shape, element_size)?;
        let runs = self.contiguous_runs(array_shape)?;
        // offsets are bounded by the length of array_bytes
        let mut bytes = Vec::with_capacity(self.num_elements() as usize * element_size);
        for (offset, length) in runs {
            let offset = offset as usize * element_size;
            let length = length as usize * element_size;
            bytes.extend_from_slice(&array_bytes[offset..offset + length]);
        }
        Ok(bytes)
    }

    /// Store the bytes of the hyperslab (`hyperslab_bytes`) into the bytes of an array with `array_shape` and `element_size`.
    ///
    /// # Errors
    /// Returns [`HyperslabError`] if the hyperslab is incompatible with or out of bounds of `array_shape`, or either byte buffer has the wrong length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn store_bytes(
        &self,
        hyperslab_bytes: &[u8],
        array_bytes: &mut [u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<(), HyperslabError> {
        Self::check_array_bytes(array_bytes.len(), array_shape, element_size)?;
        let expected = self.num_elements() * element_size as u64;
        if hyperslab_bytes.len() as u64 != expected {
            return Err(HyperslabError::InvalidBytesLength {
                expected,
                got: hyperslab_bytes.len(),
            });
        }
        let mut subset_offset = 0;
        for (offset, length) in self.contiguous_runs(array_shape)? {
            let offset = offset as usize * element_size;
            let length = length as usize * element_size;
            array_bytes[offset..offset + length]
                .copy_from_slice(&hyperslab_bytes[subset_offset..subset_offset + length]);
            subset_offset += length;
        }
        Ok(())
    }
}

/// Returns the number of planes of an array with `extents`, the product of all but the last two extents.
///
/// Arrays with fewer than two axes have no planes.
#[must_use]
pub fn num_planes(extents: &[u64]) -> u64 {
    if extents.len() < 2 {
        0
    } else {
        extents[..extents.len() - 2].iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperslab_new() {
        assert!(Hyperslab::new_with_start_count(vec![0, 0], vec![1, 2]).is_ok());
        assert!(Hyperslab::new_with_start_count(vec![0], vec![1, 2]).is_err());
        let hyperslab = Hyperslab::new_with_shape(vec![3, 4]);
        assert_eq!(hyperslab.start(), &[0, 0]);
        assert_eq!(hyperslab.num_elements(), 12);
        assert_eq!(hyperslab.end_exc(), vec![3, 4]);
        assert_eq!(hyperslab.to_string(), "start [0, 0] count [3, 4]");
    }

    #[test]
    fn hyperslab_inbounds() {
        let hyperslab = Hyperslab::new_with_start_count(vec![1, 1], vec![2, 3]).unwrap();
        assert!(hyperslab.inbounds(&[3, 4]));
        assert!(!hyperslab.inbounds(&[3, 3]));
        assert!(!hyperslab.inbounds(&[3, 4, 1]));
        let overflow = Hyperslab::new_with_start_count(vec![u64::MAX], vec![2]).unwrap();
        assert!(!overflow.inbounds(&[u64::MAX]));
    }

    #[test]
    fn hyperslab_for_plane() {
        let hyperslab = Hyperslab::for_plane(&[6, 4, 5], 2).unwrap();
        assert_eq!(hyperslab.start(), &[2, 0, 0]);
        assert_eq!(hyperslab.count(), &[1, 4, 5]);

        let hyperslab = Hyperslab::for_plane(&[3, 6, 4, 5], 13).unwrap();
        assert_eq!(hyperslab.start(), &[2, 1, 0, 0]);
        assert_eq!(hyperslab.count(), &[1, 1, 4, 5]);

        let hyperslab = Hyperslab::for_plane(&[4, 5], 0).unwrap();
        assert_eq!(hyperslab, Hyperslab::new_with_shape(vec![4, 5]));

        assert!(Hyperslab::for_plane(&[6, 4, 5], 6).is_err());
        assert!(Hyperslab::for_plane(&[6], 0).is_err());
        assert_eq!(num_planes(&[3, 6, 4, 5]), 18);
    }

    #[test]
    fn hyperslab_contiguous_runs() {
        let shape = [3, 4, 5];
        let hyperslab = Hyperslab::for_plane(&shape, 1).unwrap();
        assert_eq!(hyperslab.contiguous_runs(&shape).unwrap(), vec![(20, 20)]);

        let hyperslab = Hyperslab::new_with_start_count(vec![1, 1, 1], vec![2, 2, 3]).unwrap();
        assert_eq!(
            hyperslab.contiguous_runs(&shape).unwrap(),
            vec![(26, 3), (31, 3), (46, 3), (51, 3)]
        );

        let hyperslab = Hyperslab::new_with_start_count(vec![0, 1, 0], vec![3, 2, 5]).unwrap();
        assert_eq!(
            hyperslab.contiguous_runs(&shape).unwrap(),
            vec![(5, 10), (25, 10), (45, 10)]
        );

        let empty = Hyperslab::new_with_start_count(vec![0, 0, 0], vec![0, 4, 5]).unwrap();
        assert!(empty.contiguous_runs(&shape).unwrap().is_empty());

        let out_of_bounds = Hyperslab::new_with_start_count(vec![3, 0, 0], vec![1, 4, 5]).unwrap();
        assert!(out_of_bounds.contiguous_runs(&shape).is_err());
    }

    #[test]
    fn hyperslab_extract_store_bytes() {
        let shape = [2, 3];
        let array: Vec<u8> = (0..12).collect();
        let hyperslab = Hyperslab::new_with_start_count(vec![0, 1], vec![2, 2]).unwrap();
        // 2 byte elements: [[0 1, 2 3, 4 5], [6 7, 8 9, 10 11]]
        let bytes = hyperslab.extract_bytes(&array, &shape, 2).unwrap();
        assert_eq!(bytes, vec![2, 3, 4, 5, 8, 9, 10, 11]);

        let mut target = vec![0u8; 12];
        hyperslab.store_bytes(&bytes, &mut target, &shape, 2).unwrap();
        assert_eq!(target, vec![0, 0, 2, 3, 4, 5, 0, 0, 8, 9, 10, 11]);

        assert!(hyperslab.extract_bytes(&array[..10], &shape, 2).is_err());
        assert!(hyperslab
            .store_bytes(&bytes[..6], &mut target, &shape, 2)
            .is_err());
        assert!(matches!(
            hyperslab.extract_bytes(&array, &[u64::MAX, 3], 2),
            Err(HyperslabError::InvalidBytesLength { expected: u64::MAX, .. })
        ));
    }
}
