//! Element types and typed element buffers.
//!
//! An [`ElementType`] describes how elements of an array are stored: their class (integer or floating point), their size in bytes, and whether they are logically signed.
//! An [`ElementBuffer`] holds a flat, row-major sequence of elements in one of the storage primitives supported by this crate.
//!
//! The element type and the buffer primitive are independent: a store may hand out an [`ElementBuffer::Int16`] for an array that is logically [`ElementType::UINT16`].
//! See [`narrow`](crate::convert::narrow) for how that mismatch is reconciled.

mod endianness;

pub use endianness::{Endianness, NATIVE_ENDIAN};

use derive_more::{Display, From};
use num::traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The class of an element.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Serialize, Deserialize)]
pub enum ElementClass {
    /// An integer.
    Integer,
    /// An IEEE 754 floating point number.
    Float,
}

/// An element type.
///
/// The `signed` flag is independent of the size, so an on-disk array can be logically unsigned while the buffer it is decoded into uses a signed primitive.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementType {
    class: ElementClass,
    size: usize,
    signed: bool,
}

/// An unsupported element type error.
#[derive(Debug, Error)]
#[error("unsupported element type {0}")]
pub struct UnsupportedElementTypeError(String);

/// An element bytes error.
#[derive(Debug, Error)]
#[error("{len} bytes is not a whole number of {element_type} elements")]
pub struct ElementBytesError {
    len: usize,
    element_type: ElementType,
}

impl ElementType {
    /// `int8` Integer in `[-2^7, 2^7-1]`.
    pub const INT8: Self = Self::integer(1, true);
    /// `uint8` Integer in `[0, 2^8-1]`.
    pub const UINT8: Self = Self::integer(1, false);
    /// `int16` Integer in `[-2^15, 2^15-1]`.
    pub const INT16: Self = Self::integer(2, true);
    /// `uint16` Integer in `[0, 2^16-1]`.
    pub const UINT16: Self = Self::integer(2, false);
    /// `int32` Integer in `[-2^31, 2^31-1]`.
    pub const INT32: Self = Self::integer(4, true);
    /// `uint32` Integer in `[0, 2^32-1]`.
    pub const UINT32: Self = Self::integer(4, false);
    /// `int64` Integer in `[-2^63, 2^63-1]`.
    pub const INT64: Self = Self::integer(8, true);
    /// `uint64` Integer in `[0, 2^64-1]`.
    pub const UINT64: Self = Self::integer(8, false);
    /// `float32` IEEE 754 single-precision floating point.
    pub const FLOAT32: Self = Self::float(4);
    /// `float64` IEEE 754 double-precision floating point.
    pub const FLOAT64: Self = Self::float(8);

    const fn integer(size: usize, signed: bool) -> Self {
        Self {
            class: ElementClass::Integer,
            size,
            signed,
        }
    }

    const fn float(size: usize) -> Self {
        Self {
            class: ElementClass::Float,
            size,
            signed: true,
        }
    }

    /// Create a new element type.
    ///
    /// # Errors
    /// Returns [`UnsupportedElementTypeError`] if there is no element type with this class, size, and signedness.
    pub fn new(
        class: ElementClass,
        size: usize,
        signed: bool,
    ) -> Result<Self, UnsupportedElementTypeError> {
        let element_type = Self {
            class,
            size,
            signed,
        };
        match (class, size, signed) {
            (ElementClass::Integer, 1 | 2 | 4 | 8, _) | (ElementClass::Float, 4 | 8, true) => {
                Ok(element_type)
            }
            _ => Err(UnsupportedElementTypeError(format!(
                "{class} of {size} bytes (signed: {signed})"
            ))),
        }
    }

    /// Returns the element class.
    #[must_use]
    pub const fn class(&self) -> ElementClass {
        self.class
    }

    /// Returns the size of an element in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns true if the element type is logically signed.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed
    }

    /// Returns true if this is a floating point type.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        matches!(self.class, ElementClass::Float)
    }

    /// Returns the name of the element type, e.g. `uint16`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match (self.class, self.size, self.signed) {
            (ElementClass::Integer, 1, true) => "int8",
            (ElementClass::Integer, 1, false) => "uint8",
            (ElementClass::Integer, 2, true) => "int16",
            (ElementClass::Integer, 2, false) => "uint16",
            (ElementClass::Integer, 4, true) => "int32",
            (ElementClass::Integer, 4, false) => "uint32",
            (ElementClass::Integer, _, true) => "int64",
            (ElementClass::Integer, _, false) => "uint64",
            (ElementClass::Float, 4, _) => "float32",
            (ElementClass::Float, _, _) => "float64",
        }
    }

    /// Create an element type from its name.
    ///
    /// # Errors
    /// Returns [`UnsupportedElementTypeError`] if `name` is not a known element type.
    pub fn from_name(name: &str) -> Result<Self, UnsupportedElementTypeError> {
        match name {
            "int8" => Ok(Self::INT8),
            "uint8" => Ok(Self::UINT8),
            "int16" => Ok(Self::INT16),
            "uint16" => Ok(Self::UINT16),
            "int32" => Ok(Self::INT32),
            "uint32" => Ok(Self::UINT32),
            "int64" => Ok(Self::INT64),
            "uint64" => Ok(Self::UINT64),
            "float32" => Ok(Self::FLOAT32),
            "float64" => Ok(Self::FLOAT64),
            _ => Err(UnsupportedElementTypeError(name.to_string())),
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for ElementType {
    type Error = UnsupportedElementTypeError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::from_name(&name)
    }
}

impl From<ElementType> for String {
    fn from(element_type: ElementType) -> Self {
        element_type.name().to_string()
    }
}

/// A flat buffer of elements in one of the supported storage primitives.
#[derive(Clone, Debug, PartialEq, From)]
pub enum ElementBuffer {
    /// `i8` elements.
    Int8(Vec<i8>),
    /// `u8` elements.
    UInt8(Vec<u8>),
    /// `i16` elements.
    Int16(Vec<i16>),
    /// `u16` elements.
    UInt16(Vec<u16>),
    /// `i32` elements.
    Int32(Vec<i32>),
    /// `u32` elements.
    UInt32(Vec<u32>),
    /// `i64` elements.
    Int64(Vec<i64>),
    /// `u64` elements.
    UInt64(Vec<u64>),
    /// `f32` elements.
    Float32(Vec<f32>),
    /// `f64` elements.
    Float64(Vec<f64>),
}

/// Apply `$body` to the elements of an [`ElementBuffer`] and rewrap the result in the same variant.
macro_rules! map_elements {
    ($buffer:expr, |$elements:ident| $body:expr) => {
        match $buffer {
            $crate::element::ElementBuffer::Int8($elements) => $crate::element::ElementBuffer::Int8($body),
            $crate::element::ElementBuffer::UInt8($elements) => $crate::element::ElementBuffer::UInt8($body),
            $crate::element::ElementBuffer::Int16($elements) => $crate::element::ElementBuffer::Int16($body),
            $crate::element::ElementBuffer::UInt16($elements) => $crate::element::ElementBuffer::UInt16($body),
            $crate::element::ElementBuffer::Int32($elements) => $crate::element::ElementBuffer::Int32($body),
            $crate::element::ElementBuffer::UInt32($elements) => $crate::element::ElementBuffer::UInt32($body),
            $crate::element::ElementBuffer::Int64($elements) => $crate::element::ElementBuffer::Int64($body),
            $crate::element::ElementBuffer::UInt64($elements) => $crate::element::ElementBuffer::UInt64($body),
            $crate::element::ElementBuffer::Float32($elements) => $crate::element::ElementBuffer::Float32($body),
            $crate::element::ElementBuffer::Float64($elements) => $crate::element::ElementBuffer::Float64($body),
        }
    };
}

/// Evaluate `$body` with the elements of an [`ElementBuffer`], whatever their primitive.
macro_rules! with_elements {
    ($buffer:expr, |$elements:ident| $body:expr) => {
        match $buffer {
            $crate::element::ElementBuffer::Int8($elements) => $body,
            $crate::element::ElementBuffer::UInt8($elements) => $body,
            $crate::element::ElementBuffer::Int16($elements) => $body,
            $crate::element::ElementBuffer::UInt16($elements) => $body,
            $crate::element::ElementBuffer::Int32($elements) => $body,
            $crate::element::ElementBuffer::UInt32($elements) => $body,
            $crate::element::ElementBuffer::Int64($elements) => $body,
            $crate::element::ElementBuffer::UInt64($elements) => $body,
            $crate::element::ElementBuffer::Float32($elements) => $body,
            $crate::element::ElementBuffer::Float64($elements) => $body,
        }
    };
}

pub(crate) use map_elements;
pub(crate) use with_elements;

trait ByteSwap: bytemuck::Pod {
    fn byte_swap(self) -> Self;
}

macro_rules! impl_byte_swap_integer {
    ($($t:ty),*) => {
        $(
            impl ByteSwap for $t {
                fn byte_swap(self) -> Self {
                    self.swap_bytes()
                }
            }
        )*
    };
}

impl_byte_swap_integer!(i8, u8, i16, u16, i32, u32, i64, u64);

impl ByteSwap for f32 {
    fn byte_swap(self) -> Self {
        f32::from_bits(self.to_bits().swap_bytes())
    }
}

impl ByteSwap for f64 {
    fn byte_swap(self) -> Self {
        f64::from_bits(self.to_bits().swap_bytes())
    }
}

fn decode<T: ByteSwap>(bytes: &[u8], endianness: Endianness) -> Vec<T> {
    let mut elements: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
    if !endianness.is_native() {
        elements.iter_mut().for_each(|element| *element = element.byte_swap());
    }
    elements
}

fn encode<T: ByteSwap>(elements: &[T], endianness: Endianness) -> Vec<u8> {
    if endianness.is_native() {
        bytemuck::cast_slice(elements).to_vec()
    } else {
        let swapped: Vec<T> = elements.iter().map(|element| element.byte_swap()).collect();
        bytemuck::cast_slice(&swapped).to_vec()
    }
}

impl ElementBuffer {
    /// Decode `bytes` holding elements of `element_type` stored with `endianness`.
    ///
    /// Each element type decodes into its natural primitive, e.g. `uint16` into [`ElementBuffer::UInt16`].
    ///
    /// # Errors
    /// Returns [`ElementBytesError`] if the length of `bytes` is not a multiple of the element size.
    pub fn from_bytes(
        bytes: &[u8],
        element_type: ElementType,
        endianness: Endianness,
    ) -> Result<Self, ElementBytesError> {
        if bytes.len() % element_type.size() != 0 {
            return Err(ElementBytesError {
                len: bytes.len(),
                element_type,
            });
        }
        Ok(match element_type {
            ElementType::INT8 => Self::Int8(decode(bytes, endianness)),
            ElementType::UINT8 => Self::UInt8(decode(bytes, endianness)),
            ElementType::INT16 => Self::Int16(decode(bytes, endianness)),
            ElementType::UINT16 => Self::UInt16(decode(bytes, endianness)),
            ElementType::INT32 => Self::Int32(decode(bytes, endianness)),
            ElementType::UINT32 => Self::UInt32(decode(bytes, endianness)),
            ElementType::INT64 => Self::Int64(decode(bytes, endianness)),
            ElementType::UINT64 => Self::UInt64(decode(bytes, endianness)),
            ElementType::FLOAT32 => Self::Float32(decode(bytes, endianness)),
            _ => Self::Float64(decode(bytes, endianness)),
        })
    }

    /// Encode the elements as bytes with `endianness`.
    #[must_use]
    pub fn to_bytes(&self, endianness: Endianness) -> Vec<u8> {
        with_elements!(self, |elements| encode(elements, endianness))
    }

    /// Create a buffer of `len` zeroed elements of `element_type`.
    #[must_use]
    pub fn zeros(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::INT8 => Self::Int8(vec![0; len]),
            ElementType::UINT8 => Self::UInt8(vec![0; len]),
            ElementType::INT16 => Self::Int16(vec![0; len]),
            ElementType::UINT16 => Self::UInt16(vec![0; len]),
            ElementType::INT32 => Self::Int32(vec![0; len]),
            ElementType::UINT32 => Self::UInt32(vec![0; len]),
            ElementType::INT64 => Self::Int64(vec![0; len]),
            ElementType::UINT64 => Self::UInt64(vec![0; len]),
            ElementType::FLOAT32 => Self::Float32(vec![0.0; len]),
            _ => Self::Float64(vec![0.0; len]),
        }
    }

    /// Returns the element type matching the storage primitive of the buffer.
    #[must_use]
    pub const fn element_type(&self) -> ElementType {
        match self {
            Self::Int8(_) => ElementType::INT8,
            Self::UInt8(_) => ElementType::UINT8,
            Self::Int16(_) => ElementType::INT16,
            Self::UInt16(_) => ElementType::UINT16,
            Self::Int32(_) => ElementType::INT32,
            Self::UInt32(_) => ElementType::UINT32,
            Self::Int64(_) => ElementType::INT64,
            Self::UInt64(_) => ElementType::UINT64,
            Self::Float32(_) => ElementType::FLOAT32,
            Self::Float64(_) => ElementType::FLOAT64,
        }
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        with_elements!(self, |elements| elements.len())
    }

    /// Returns true if the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the size of the buffer in bytes.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.len() * self.element_type().size()
    }

    /// Returns the minimum and maximum element as `f64`, ignoring `NaN`.
    ///
    /// Returns [`None`] if the buffer is empty or holds only `NaN`.
    #[must_use]
    pub fn min_max(&self) -> Option<(f64, f64)> {
        fn min_max<T: AsPrimitive<f64>>(elements: &[T]) -> Option<(f64, f64)> {
            elements
                .iter()
                .map(|&element| AsPrimitive::<f64>::as_(element))
                .filter(|value| !value.is_nan())
                .fold(None, |acc, value| match acc {
                    None => Some((value, value)),
                    Some((min, max)) => Some((f64::min(min, value), f64::max(max, value))),
                })
        }
        with_elements!(self, |elements| min_max(elements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_names() {
        for element_type in [
            ElementType::INT8,
            ElementType::UINT8,
            ElementType::INT16,
            ElementType::UINT16,
            ElementType::INT32,
            ElementType::UINT32,
            ElementType::INT64,
            ElementType::UINT64,
            ElementType::FLOAT32,
            ElementType::FLOAT64,
        ] {
            assert_eq!(
                ElementType::from_name(&element_type.to_string()).unwrap(),
                element_type
            );
        }
        assert!(ElementType::from_name("complex64").is_err());
        assert!(!ElementType::UINT16.is_signed());
        assert_eq!(ElementType::UINT16.size(), 2);
        assert!(ElementType::FLOAT64.is_float());
    }

    #[test]
    fn element_type_new() {
        assert_eq!(
            ElementType::new(ElementClass::Integer, 2, false).unwrap(),
            ElementType::UINT16
        );
        assert!(ElementType::new(ElementClass::Integer, 3, true).is_err());
        assert!(ElementType::new(ElementClass::Float, 2, true).is_err());
        assert!(ElementType::new(ElementClass::Float, 4, false).is_err());
    }

    #[test]
    fn element_type_serde() {
        let json = serde_json::to_string(&ElementType::UINT16).unwrap();
        assert_eq!(json, r#""uint16""#);
        let element_type: ElementType = serde_json::from_str(r#""float64""#).unwrap();
        assert_eq!(element_type, ElementType::FLOAT64);
        assert!(serde_json::from_str::<ElementType>(r#""bool""#).is_err());
    }

    #[test]
    fn element_buffer_bytes() {
        let buffer = ElementBuffer::UInt16(vec![1, 256, 65535]);
        let big = buffer.to_bytes(Endianness::Big);
        assert_eq!(big, [0, 1, 1, 0, 255, 255]);
        assert_eq!(
            ElementBuffer::from_bytes(&big, ElementType::UINT16, Endianness::Big).unwrap(),
            buffer
        );
        let little = buffer.to_bytes(Endianness::Little);
        assert_eq!(little, [1, 0, 0, 1, 255, 255]);
        assert!(ElementBuffer::from_bytes(&little[..5], ElementType::UINT16, Endianness::Little)
            .is_err());

        let floats = ElementBuffer::Float64(vec![1.5, -2.25]);
        let bytes = floats.to_bytes(Endianness::Big);
        assert_eq!(
            ElementBuffer::from_bytes(&bytes, ElementType::FLOAT64, Endianness::Big).unwrap(),
            floats
        );
    }

    #[test]
    fn element_buffer_properties() {
        let buffer: ElementBuffer = vec![3i32, -7, 12].into();
        assert_eq!(buffer.element_type(), ElementType::INT32);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.size_in_bytes(), 12);
        assert_eq!(buffer.min_max(), Some((-7.0, 12.0)));
        assert_eq!(ElementBuffer::Float32(vec![f32::NAN, 2.0]).min_max(), Some((2.0, 2.0)));
        assert_eq!(ElementBuffer::UInt8(vec![]).min_max(), None);
        assert_eq!(
            ElementBuffer::zeros(ElementType::UINT8, 4),
            ElementBuffer::UInt8(vec![0; 4])
        );
    }
}
