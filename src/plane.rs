//! Image planes and plane extraction from flat element buffers.
//!
//! Arrays are row-major with the last axis varying fastest.
//! RGB arrays store each pixel as three consecutive elements, so a plane with `rows` x `cols` pixels occupies `3 * rows * cols` interleaved elements.

use derive_more::Display;
use thiserror::Error;

use crate::element::{map_elements, ElementBuffer, ElementType};

/// The shape of a plane: `rows` (height) by `cols` (width).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display("{rows}x{cols}")]
pub struct PlaneShape {
    rows: usize,
    cols: usize,
}

impl PlaneShape {
    /// Create a new plane shape.
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// The number of rows (the plane height).
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// The number of columns (the plane width).
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// The number of pixels in the plane.
    #[must_use]
    pub const fn num_elements(&self) -> usize {
        self.rows * self.cols
    }
}

/// A plane extraction error.
#[derive(Debug, Error)]
pub enum PlaneError {
    /// The requested element range exceeds the buffer.
    #[error("element range {start}..{end} exceeds buffer of length {len}")]
    OutOfRange {
        /// Start of the range.
        start: usize,
        /// End of the range (exclusive).
        end: usize,
        /// Buffer length.
        len: usize,
    },
    /// The buffer does not hold exactly one interleaved RGB plane.
    #[error("expected {expected} interleaved RGB elements for a {shape} plane, got {got}")]
    InvalidRgbLength {
        /// The plane shape.
        shape: PlaneShape,
        /// The expected number of elements.
        expected: usize,
        /// The actual number of elements.
        got: usize,
    },
    /// The channel buffers differ in length or element type.
    #[error("channel buffers are incompatible: {0}")]
    IncompatibleChannels(String),
    /// The plane data does not match the plane shape.
    #[error("plane of shape {0} cannot hold {1} elements")]
    InvalidPlaneLength(PlaneShape, usize),
}

/// A single 2D plane of pixel data.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    shape: PlaneShape,
    data: ElementBuffer,
}

impl Plane {
    /// Create a new plane.
    ///
    /// # Errors
    /// Returns [`PlaneError::InvalidPlaneLength`] if `data` does not hold exactly `shape.num_elements()` elements.
    pub fn new(shape: PlaneShape, data: ElementBuffer) -> Result<Self, PlaneError> {
        if data.len() == shape.num_elements() {
            Ok(Self { shape, data })
        } else {
            Err(PlaneError::InvalidPlaneLength(shape, data.len()))
        }
    }

    /// Returns the plane shape.
    #[must_use]
    pub const fn shape(&self) -> PlaneShape {
        self.shape
    }

    /// Returns the plane data.
    #[must_use]
    pub const fn data(&self) -> &ElementBuffer {
        &self.data
    }

    /// Returns the element type of the plane data.
    #[must_use]
    pub const fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Consume the plane and return its data.
    #[must_use]
    pub fn into_data(self) -> ElementBuffer {
        self.data
    }

    /// Return the plane as a 2D [`ndarray::Array2`] of `f32`.
    ///
    /// # Panics
    /// Panics if the plane shape is inconsistent with its data, which [`Plane::new`] rules out.
    #[cfg(feature = "ndarray")]
    #[must_use]
    pub fn to_ndarray_f32(&self) -> ndarray::Array2<f32> {
        use num::traits::AsPrimitive;
        fn convert<T: AsPrimitive<f32>>(elements: &[T]) -> Vec<f32> {
            elements.iter().map(|&element| element.as_()).collect()
        }
        let elements =
            crate::element::with_elements!(&self.data, |elements| convert(elements));
        ndarray::Array2::from_shape_vec((self.shape.rows, self.shape.cols), elements)
            .expect("plane length is validated on construction")
    }
}

/// Copy `element_count` elements starting at `start_element` out of `buffer`.
///
/// # Errors
/// Returns [`PlaneError::OutOfRange`] if `start_element + element_count` exceeds the buffer length.
pub fn slice(
    buffer: &ElementBuffer,
    start_element: usize,
    element_count: usize,
) -> Result<ElementBuffer, PlaneError> {
    let end = start_element
        .checked_add(element_count)
        .filter(|&end| end <= buffer.len())
        .ok_or(PlaneError::OutOfRange {
            start: start_element,
            end: start_element.saturating_add(element_count),
            len: buffer.len(),
        })?;
    Ok(map_elements!(buffer, |elements| elements[start_element..end].to_vec()))
}

fn deinterleave<T: Copy>(elements: &[T], shape: PlaneShape) -> [Vec<T>; 3] {
    let mut channels = [
        Vec::with_capacity(shape.num_elements()),
        Vec::with_capacity(shape.num_elements()),
        Vec::with_capacity(shape.num_elements()),
    ];
    for row in 0..shape.rows {
        for col in 0..shape.cols {
            let offset = (row * shape.cols + col) * 3;
            channels[0].push(elements[offset]);
            channels[1].push(elements[offset + 1]);
            channels[2].push(elements[offset + 2]);
        }
    }
    channels
}

fn interleave<T: Copy>(r: &[T], g: &[T], b: &[T]) -> Vec<T> {
    let mut elements = Vec::with_capacity(r.len() * 3);
    for ((&r, &g), &b) in r.iter().zip(g).zip(b) {
        elements.extend_from_slice(&[r, g, b]);
    }
    elements
}

/// Split one interleaved RGB plane into its red, green, and blue channel planes.
///
/// The plane extents must be exact: `buffer` must hold exactly `3 * shape.num_elements()` elements.
///
/// # Errors
/// Returns [`PlaneError::InvalidRgbLength`] if the buffer length does not match `shape`.
pub fn deinterleave_rgb(
    buffer: &ElementBuffer,
    shape: PlaneShape,
) -> Result<[ElementBuffer; 3], PlaneError> {
    let expected = shape.num_elements() * 3;
    if buffer.len() != expected {
        return Err(PlaneError::InvalidRgbLength {
            shape,
            expected,
            got: buffer.len(),
        });
    }
    macro_rules! split {
        ($($variant:ident),*) => {
            match buffer {
                $(
                    ElementBuffer::$variant(elements) => {
                        let [r, g, b] = deinterleave(elements, shape);
                        [ElementBuffer::$variant(r), ElementBuffer::$variant(g), ElementBuffer::$variant(b)]
                    }
                )*
            }
        };
    }
    Ok(split!(Int8, UInt8, Int16, UInt16, Int32, UInt32, Int64, UInt64, Float32, Float64))
}

/// Interleave red, green, and blue channel planes into RGB triplets.
///
/// This is the exact inverse of [`deinterleave_rgb`].
///
/// # Errors
/// Returns [`PlaneError::IncompatibleChannels`] if the channels differ in length or element type.
pub fn interleave_rgb(
    r: &ElementBuffer,
    g: &ElementBuffer,
    b: &ElementBuffer,
) -> Result<ElementBuffer, PlaneError> {
    if r.len() != g.len() || r.len() != b.len() {
        return Err(PlaneError::IncompatibleChannels(format!(
            "lengths {}, {}, {}",
            r.len(),
            g.len(),
            b.len()
        )));
    }
    macro_rules! join {
        ($($variant:ident),*) => {
            match (r, g, b) {
                $(
                    (ElementBuffer::$variant(r), ElementBuffer::$variant(g), ElementBuffer::$variant(b)) => {
                        Ok(ElementBuffer::$variant(interleave(r, g, b)))
                    }
                )*
                _ => Err(PlaneError::IncompatibleChannels(format!(
                    "element types {}, {}, {}",
                    r.element_type(),
                    g.element_type(),
                    b.element_type()
                ))),
            }
        };
    }
    join!(Int8, UInt8, Int16, UInt16, Int32, UInt32, Int64, UInt64, Float32, Float64)
}

/// Split packed `0x00RRGGBB` pixels into red, green, and blue byte planes.
#[must_use]
pub fn unpack_rgb(pixels: &[u32]) -> [Vec<u8>; 3] {
    let mut channels = [
        Vec::with_capacity(pixels.len()),
        Vec::with_capacity(pixels.len()),
        Vec::with_capacity(pixels.len()),
    ];
    for &pixel in pixels {
        let [_, r, g, b] = pixel.to_be_bytes();
        channels[0].push(r);
        channels[1].push(g);
        channels[2].push(b);
    }
    channels
}

/// Join red, green, and blue byte planes into packed `0x00RRGGBB` pixels.
///
/// Stops at the end of the shortest channel.
#[must_use]
pub fn pack_rgb(r: &[u8], g: &[u8], b: &[u8]) -> Vec<u32> {
    r.iter()
        .zip(g)
        .zip(b)
        .map(|((&r, &g), &b)| u32::from_be_bytes([0, r, g, b]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_slice() {
        let buffer = ElementBuffer::UInt16((0..10).collect());
        assert_eq!(
            slice(&buffer, 2, 3).unwrap(),
            ElementBuffer::UInt16(vec![2, 3, 4])
        );
        assert_eq!(slice(&buffer, 10, 0).unwrap(), ElementBuffer::UInt16(vec![]));
        assert!(slice(&buffer, 8, 3).is_err());
        assert!(slice(&buffer, usize::MAX, 2).is_err());
    }

    #[test]
    fn rgb_deinterleave() {
        // 2x3 plane, pixel value encodes (row, col, channel)
        let shape = PlaneShape::new(2, 3);
        let buffer = ElementBuffer::UInt8(
            (0..2u8)
                .flat_map(|row| (0..3u8).flat_map(move |col| (0..3u8).map(move |c| row * 100 + col * 10 + c)))
                .collect(),
        );
        let [r, g, b] = deinterleave_rgb(&buffer, shape).unwrap();
        assert_eq!(r, ElementBuffer::UInt8(vec![0, 10, 20, 100, 110, 120]));
        assert_eq!(g, ElementBuffer::UInt8(vec![1, 11, 21, 101, 111, 121]));
        assert_eq!(b, ElementBuffer::UInt8(vec![2, 12, 22, 102, 112, 122]));
        assert_eq!(interleave_rgb(&r, &g, &b).unwrap(), buffer);
    }

    #[test]
    fn rgb_round_trip_all_types() {
        let shape = PlaneShape::new(3, 5);
        let n = shape.num_elements() * 3;
        let pseudo_random = |i: usize| (i * 7919 + 13) % 251;
        let buffers = [
            ElementBuffer::Int8((0..n).map(|i| pseudo_random(i) as i8).collect()),
            ElementBuffer::UInt8((0..n).map(|i| pseudo_random(i) as u8).collect()),
            ElementBuffer::Int16((0..n).map(|i| pseudo_random(i) as i16 - 100).collect()),
            ElementBuffer::UInt16((0..n).map(|i| pseudo_random(i) as u16 * 200).collect()),
            ElementBuffer::Int32((0..n).map(|i| pseudo_random(i) as i32 * -3).collect()),
            ElementBuffer::UInt32((0..n).map(|i| pseudo_random(i) as u32 * 70000).collect()),
            ElementBuffer::Int64((0..n).map(|i| (pseudo_random(i) as i64) << 33).collect()),
            ElementBuffer::UInt64((0..n).map(|i| pseudo_random(i) as u64).collect()),
            ElementBuffer::Float32((0..n).map(|i| pseudo_random(i) as f32 / 3.0).collect()),
            ElementBuffer::Float64((0..n).map(|i| pseudo_random(i) as f64 * 1.5).collect()),
        ];
        for buffer in buffers {
            let [r, g, b] = deinterleave_rgb(&buffer, shape).unwrap();
            assert_eq!(r.len(), shape.num_elements());
            assert_eq!(interleave_rgb(&r, &g, &b).unwrap(), buffer);
        }
    }

    #[test]
    fn rgb_invalid() {
        let buffer = ElementBuffer::UInt8(vec![0; 17]);
        assert!(deinterleave_rgb(&buffer, PlaneShape::new(2, 3)).is_err());
        let r = ElementBuffer::UInt8(vec![0; 2]);
        let g = ElementBuffer::UInt16(vec![0; 2]);
        assert!(interleave_rgb(&r, &g, &r).is_err());
        assert!(interleave_rgb(&r, &r, &ElementBuffer::UInt8(vec![0; 3])).is_err());
    }

    #[test]
    fn rgb_packed() {
        let pixels = [0x00FF_8001, 0x0001_0203];
        let [r, g, b] = unpack_rgb(&pixels);
        assert_eq!(r, [0xFF, 0x01]);
        assert_eq!(g, [0x80, 0x02]);
        assert_eq!(b, [0x01, 0x03]);
        assert_eq!(pack_rgb(&r, &g, &b), pixels);
    }

    #[test]
    fn plane_new() {
        let shape = PlaneShape::new(2, 2);
        assert!(Plane::new(shape, ElementBuffer::UInt8(vec![0; 4])).is_ok());
        assert!(Plane::new(shape, ElementBuffer::UInt8(vec![0; 5])).is_err());
        assert_eq!(shape.to_string(), "2x2");
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn plane_ndarray() {
        let plane = Plane::new(PlaneShape::new(2, 3), ElementBuffer::UInt8((0..6).collect())).unwrap();
        assert_eq!(
            plane.to_ndarray_f32(),
            ndarray::array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]
        );
    }
}
