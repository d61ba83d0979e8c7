//! Element conversion between stored arrays and image planes.
//!
//! Image planes only support 8-bit and 16-bit integers and 32-bit floats.
//! [`narrow`] converts anything wider to one of those, as selected by an explicit [`NarrowPolicy`], and reconciles logically unsigned 16-bit data held in a signed primitive.
//! [`to_storage`] picks the on-disk representation of a plane when writing.

use num::traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::{with_elements, ElementBuffer, ElementType};

/// How elements without an image plane representation are narrowed.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum NarrowPolicy {
    /// Convert to 32-bit floats.
    ///
    /// Logically unsigned 16-bit data stored as signed is reinterpreted as its unsigned magnitude.
    #[default]
    ToFloat32,
    /// Truncate to 16-bit signed integers.
    ///
    /// Logically unsigned 16-bit data stored as signed has negative values clamped to zero.
    ToInt16Truncate,
}

/// The conversion applied to a buffer of a given storage primitive.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Conversion {
    /// The elements already have an image plane representation.
    PassThrough,
    /// Cast every element to `f32`.
    ToFloat32,
    /// Cast every element to `i16`, discarding high bits.
    ToInt16Truncate,
}

/// A conversion error.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The plane elements have no on-disk representation.
    #[error("planes of {0} elements cannot be written")]
    UnsupportedPlaneType(ElementType),
}

impl Conversion {
    /// Select the conversion for a buffer with storage primitive `primitive` under `policy`.
    ///
    /// 32-bit and 64-bit integers follow `policy`, 64-bit floats always become `f32`.
    #[must_use]
    pub fn select(primitive: ElementType, policy: NarrowPolicy) -> Self {
        match primitive {
            ElementType::FLOAT64 => Self::ToFloat32,
            ElementType::INT32 | ElementType::UINT32 | ElementType::INT64 | ElementType::UINT64 => {
                match policy {
                    NarrowPolicy::ToFloat32 => Self::ToFloat32,
                    NarrowPolicy::ToInt16Truncate => Self::ToInt16Truncate,
                }
            }
            _ => Self::PassThrough,
        }
    }

    /// Apply the conversion to `buffer`.
    #[must_use]
    pub fn apply(self, buffer: ElementBuffer) -> ElementBuffer {
        fn cast<T: AsPrimitive<U>, U: Copy + 'static>(elements: &[T]) -> Vec<U> {
            elements.iter().map(|&element| element.as_()).collect()
        }
        match self {
            Self::PassThrough => buffer,
            Self::ToFloat32 => {
                ElementBuffer::Float32(with_elements!(&buffer, |elements| cast::<_, f32>(elements)))
            }
            Self::ToInt16Truncate => {
                ElementBuffer::Int16(with_elements!(&buffer, |elements| cast::<_, i16>(elements)))
            }
        }
    }
}

/// Reinterpret logically unsigned 16-bit elements held in a signed 16-bit primitive.
///
/// Under [`NarrowPolicy::ToInt16Truncate`] negative raw values are clamped to zero.
/// Under [`NarrowPolicy::ToFloat32`] every raw value becomes its unsigned magnitude (`value mod 2^16`) as an `f32`.
/// Buffers with any other primitive, or a signed `source_type`, are returned unchanged.
#[must_use]
pub fn correct_unsigned(
    buffer: ElementBuffer,
    source_type: ElementType,
    policy: NarrowPolicy,
) -> ElementBuffer {
    match buffer {
        ElementBuffer::Int16(elements) if !source_type.is_signed() => match policy {
            NarrowPolicy::ToInt16Truncate => {
                ElementBuffer::Int16(elements.into_iter().map(|v| v.max(0)).collect())
            }
            NarrowPolicy::ToFloat32 => ElementBuffer::Float32(
                elements
                    .into_iter()
                    .map(|v| f32::from(bytemuck::cast::<i16, u16>(v)))
                    .collect(),
            ),
        },
        buffer => buffer,
    }
}

/// Narrow `buffer`, holding elements of the logical `source_type`, to an image plane representation.
///
/// The unsigned correction of [`correct_unsigned`] is applied first, then the [`Conversion`] selected for the resulting primitive.
/// Returns the converted buffer and its element type.
#[must_use]
pub fn narrow(
    buffer: ElementBuffer,
    source_type: ElementType,
    policy: NarrowPolicy,
) -> (ElementBuffer, ElementType) {
    let buffer = correct_unsigned(buffer, source_type, policy);
    let conversion = Conversion::select(buffer.element_type(), policy);
    if conversion != Conversion::PassThrough {
        log::debug!(
            "narrowing {} elements of {source_type} with {conversion:?}",
            buffer.len()
        );
    }
    let buffer = conversion.apply(buffer);
    let element_type = buffer.element_type();
    (buffer, element_type)
}

/// Returns the plane elements in their on-disk representation and its element type.
///
/// 16-bit planes are stored as `uint16`, reinterpreting signed elements bit for bit.
///
/// # Errors
/// Returns [`ConvertError::UnsupportedPlaneType`] if the buffer is not an image plane representation.
pub fn to_storage(buffer: ElementBuffer) -> Result<(ElementBuffer, ElementType), ConvertError> {
    match buffer {
        ElementBuffer::Int16(elements) => Ok((
            ElementBuffer::UInt16(bytemuck::cast_vec(elements)),
            ElementType::UINT16,
        )),
        buffer @ (ElementBuffer::Int8(_)
        | ElementBuffer::UInt8(_)
        | ElementBuffer::UInt16(_)
        | ElementBuffer::Float32(_)) => {
            let element_type = buffer.element_type();
            Ok((buffer, element_type))
        }
        buffer => Err(ConvertError::UnsupportedPlaneType(buffer.element_type())),
    }
}
