//! Fixed-width scalar types and their little-endian encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scalar types a field or vector element can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// One byte, zero is false.
    Bool,
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
}

impl ScalarType {
    /// Byte width of the type on the wire.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
        }
    }

    /// Required alignment; scalars are aligned to their own width.
    #[must_use]
    pub const fn align(self) -> usize {
        self.size()
    }

    /// Returns true for the two floating point types.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarType::Float32 | ScalarType::Float64)
    }

    /// Returns true for the integer types (bool excluded).
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !self.is_float() && !matches!(self, ScalarType::Bool)
    }

    /// Returns true for the unsigned integer types.
    #[must_use]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            ScalarType::UInt8 | ScalarType::UInt16 | ScalarType::UInt32 | ScalarType::UInt64
        )
    }

    /// The zero value of this type.
    #[must_use]
    pub const fn zero(self) -> ScalarValue {
        match self {
            ScalarType::Bool => ScalarValue::Bool(false),
            ScalarType::Int8 => ScalarValue::Int8(0),
            ScalarType::UInt8 => ScalarValue::UInt8(0),
            ScalarType::Int16 => ScalarValue::Int16(0),
            ScalarType::UInt16 => ScalarValue::UInt16(0),
            ScalarType::Int32 => ScalarValue::Int32(0),
            ScalarType::UInt32 => ScalarValue::UInt32(0),
            ScalarType::Int64 => ScalarValue::Int64(0),
            ScalarType::UInt64 => ScalarValue::UInt64(0),
            ScalarType::Float32 => ScalarValue::Float32(0.0),
            ScalarType::Float64 => ScalarValue::Float64(0.0),
        }
    }

    /// Lowercase name used in descriptions and JSON schemas.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::UInt8 => "uint8",
            ScalarType::Int16 => "int16",
            ScalarType::UInt16 => "uint16",
            ScalarType::Int32 => "int32",
            ScalarType::UInt32 => "uint32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar value tagged with its type.
///
/// Used for schema defaults, dynamic records and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarValue {
    /// Boolean value.
    Bool(bool),
    /// Signed 8-bit value.
    Int8(i8),
    /// Unsigned 8-bit value.
    UInt8(u8),
    /// Signed 16-bit value.
    Int16(i16),
    /// Unsigned 16-bit value.
    UInt16(u16),
    /// Signed 32-bit value.
    Int32(i32),
    /// Unsigned 32-bit value.
    UInt32(u32),
    /// Signed 64-bit value.
    Int64(i64),
    /// Unsigned 64-bit value.
    UInt64(u64),
    /// Single precision value.
    Float32(f32),
    /// Double precision value.
    Float64(f64),
}

impl ScalarValue {
    /// Returns the type of this value.
    #[must_use]
    pub const fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::Bool(_) => ScalarType::Bool,
            ScalarValue::Int8(_) => ScalarType::Int8,
            ScalarValue::UInt8(_) => ScalarType::UInt8,
            ScalarValue::Int16(_) => ScalarType::Int16,
            ScalarValue::UInt16(_) => ScalarType::UInt16,
            ScalarValue::Int32(_) => ScalarType::Int32,
            ScalarValue::UInt32(_) => ScalarType::UInt32,
            ScalarValue::Int64(_) => ScalarType::Int64,
            ScalarValue::UInt64(_) => ScalarType::UInt64,
            ScalarValue::Float32(_) => ScalarType::Float32,
            ScalarValue::Float64(_) => ScalarType::Float64,
        }
    }

    /// Compares two values by type and bit pattern.
    ///
    /// Unlike `==`, `-0.0` differs from `0.0` and a NaN equals the same NaN,
    /// so a value that compares equal here reads back identically.
    #[must_use]
    pub fn same_bits(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Float32(a), ScalarValue::Float32(b)) => a.to_bits() == b.to_bits(),
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Writes the little-endian encoding into `out[..size]`.
    pub fn write_le(&self, out: &mut [u8]) {
        match *self {
            ScalarValue::Bool(v) => v.write_le(out),
            ScalarValue::Int8(v) => v.write_le(out),
            ScalarValue::UInt8(v) => v.write_le(out),
            ScalarValue::Int16(v) => v.write_le(out),
            ScalarValue::UInt16(v) => v.write_le(out),
            ScalarValue::Int32(v) => v.write_le(out),
            ScalarValue::UInt32(v) => v.write_le(out),
            ScalarValue::Int64(v) => v.write_le(out),
            ScalarValue::UInt64(v) => v.write_le(out),
            ScalarValue::Float32(v) => v.write_le(out),
            ScalarValue::Float64(v) => v.write_le(out),
        }
    }

    /// Reads a value of type `ty` from `bytes`, which must hold at least
    /// `ty.size()` bytes.
    #[must_use]
    pub fn read_le(ty: ScalarType, bytes: &[u8]) -> Self {
        match ty {
            ScalarType::Bool => bool::read_le(bytes).into_value(),
            ScalarType::Int8 => i8::read_le(bytes).into_value(),
            ScalarType::UInt8 => u8::read_le(bytes).into_value(),
            ScalarType::Int16 => i16::read_le(bytes).into_value(),
            ScalarType::UInt16 => u16::read_le(bytes).into_value(),
            ScalarType::Int32 => i32::read_le(bytes).into_value(),
            ScalarType::UInt32 => u32::read_le(bytes).into_value(),
            ScalarType::Int64 => i64::read_le(bytes).into_value(),
            ScalarType::UInt64 => u64::read_le(bytes).into_value(),
            ScalarType::Float32 => f32::read_le(bytes).into_value(),
            ScalarType::Float64 => f64::read_le(bytes).into_value(),
        }
    }

    /// Integer view of the value. Unsigned 64-bit values wrap, bools map to 0/1.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ScalarValue::Bool(v) => Some(i64::from(v)),
            ScalarValue::Int8(v) => Some(i64::from(v)),
            ScalarValue::UInt8(v) => Some(i64::from(v)),
            ScalarValue::Int16(v) => Some(i64::from(v)),
            ScalarValue::UInt16(v) => Some(i64::from(v)),
            ScalarValue::Int32(v) => Some(i64::from(v)),
            ScalarValue::UInt32(v) => Some(i64::from(v)),
            ScalarValue::Int64(v) => Some(v),
            ScalarValue::UInt64(v) => Some(v as i64),
            ScalarValue::Float32(_) | ScalarValue::Float64(_) => None,
        }
    }

    /// Floating point view of the value; integers are converted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::Float32(v) => f64::from(v),
            ScalarValue::Float64(v) => v,
            ScalarValue::UInt64(v) => v as f64,
            other => other.as_i64().unwrap_or_default() as f64,
        }
    }

    /// Converts an integer into a value of the integer type `ty`.
    ///
    /// Returns `None` when `ty` is not an integer type or `n` does not fit.
    #[must_use]
    pub fn from_i64(ty: ScalarType, n: i64) -> Option<Self> {
        Some(match ty {
            ScalarType::Bool => match n {
                0 => ScalarValue::Bool(false),
                1 => ScalarValue::Bool(true),
                _ => return None,
            },
            ScalarType::Int8 => ScalarValue::Int8(i8::try_from(n).ok()?),
            ScalarType::UInt8 => ScalarValue::UInt8(u8::try_from(n).ok()?),
            ScalarType::Int16 => ScalarValue::Int16(i16::try_from(n).ok()?),
            ScalarType::UInt16 => ScalarValue::UInt16(u16::try_from(n).ok()?),
            ScalarType::Int32 => ScalarValue::Int32(i32::try_from(n).ok()?),
            ScalarType::UInt32 => ScalarValue::UInt32(u32::try_from(n).ok()?),
            ScalarType::Int64 => ScalarValue::Int64(n),
            ScalarType::UInt64 => ScalarValue::UInt64(u64::try_from(n).ok()?),
            ScalarType::Float32 | ScalarType::Float64 => return None,
        })
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int8(v) => write!(f, "{v}"),
            ScalarValue::UInt8(v) => write!(f, "{v}"),
            ScalarValue::Int16(v) => write!(f, "{v}"),
            ScalarValue::UInt16(v) => write!(f, "{v}"),
            ScalarValue::Int32(v) => write!(f, "{v}"),
            ScalarValue::UInt32(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::UInt64(v) => write!(f, "{v}"),
            ScalarValue::Float32(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// A Rust type that maps onto one [`ScalarType`].
///
/// Implemented for `bool`, the fixed-width integers and the two float types.
pub trait Scalar: Copy + PartialEq + fmt::Debug + private::Sealed + 'static {
    /// The wire type of this Rust type.
    const TYPE: ScalarType;

    /// Reads the value from the first `TYPE.size()` bytes of `bytes`.
    fn read_le(bytes: &[u8]) -> Self;

    /// Writes the value into the first `TYPE.size()` bytes of `out`.
    fn write_le(self, out: &mut [u8]);

    /// Wraps the value into a tagged [`ScalarValue`].
    fn into_value(self) -> ScalarValue;

    /// Extracts the value if `value` has exactly this type.
    fn from_value(value: ScalarValue) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl Scalar for $ty {
                const TYPE: ScalarType = ScalarType::$variant;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..std::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn into_value(self) -> ScalarValue {
                    ScalarValue::$variant(self)
                }

                #[inline]
                fn from_value(value: ScalarValue) -> Option<Self> {
                    match value {
                        ScalarValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

impl private::Sealed for bool {}

impl Scalar for bool {
    const TYPE: ScalarType = ScalarType::Bool;

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    #[inline]
    fn into_value(self) -> ScalarValue {
        ScalarValue::Bool(self)
    }

    #[inline]
    fn from_value(value: ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}
