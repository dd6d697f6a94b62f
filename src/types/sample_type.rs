//! Sample type definitions

use serde::{Deserialize, Serialize};

/// Binary encodings a signal's samples can use.
///
/// `Undefined` is legal as a read type and means "follow the descriptor". `Invalid`
/// only appears when a producer publishes a broken descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleType {
    #[default]
    Undefined,
    Invalid,
    Float32,
    Float64,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    /// Start/end pair of two little-endian `i64`s
    RangeInt64,
    ComplexFloat32,
    ComplexFloat64,
    Binary,
    String,
    Struct,
}

impl SampleType {
    /// Every sample type, in declaration order.
    pub const ALL: [SampleType; 18] = [
        SampleType::Undefined,
        SampleType::Invalid,
        SampleType::Float32,
        SampleType::Float64,
        SampleType::Int8,
        SampleType::UInt8,
        SampleType::Int16,
        SampleType::UInt16,
        SampleType::Int32,
        SampleType::UInt32,
        SampleType::Int64,
        SampleType::UInt64,
        SampleType::RangeInt64,
        SampleType::ComplexFloat32,
        SampleType::ComplexFloat64,
        SampleType::Binary,
        SampleType::String,
        SampleType::Struct,
    ];

    /// Size in bytes of one element of this type.
    ///
    /// Variable-size encodings (struct, binary, string) and the placeholder types
    /// report 0; a struct's size comes from its descriptor's fields.
    pub const fn size(&self) -> usize {
        match self {
            SampleType::Int8 | SampleType::UInt8 => 1,
            SampleType::Int16 | SampleType::UInt16 => 2,
            SampleType::Int32 | SampleType::UInt32 | SampleType::Float32 => 4,
            SampleType::Int64
            | SampleType::UInt64
            | SampleType::Float64
            | SampleType::ComplexFloat32 => 8,
            SampleType::RangeInt64 | SampleType::ComplexFloat64 => 16,
            SampleType::Binary | SampleType::String => 1,
            SampleType::Struct | SampleType::Undefined | SampleType::Invalid => 0,
        }
    }

    /// Plain integer and float types.
    pub const fn is_numeric(&self) -> bool {
        match self {
            SampleType::Float32
            | SampleType::Float64
            | SampleType::Int8
            | SampleType::UInt8
            | SampleType::Int16
            | SampleType::UInt16
            | SampleType::Int32
            | SampleType::UInt32
            | SampleType::Int64
            | SampleType::UInt64 => true,
            SampleType::Undefined
            | SampleType::Invalid
            | SampleType::RangeInt64
            | SampleType::ComplexFloat32
            | SampleType::ComplexFloat64
            | SampleType::Binary
            | SampleType::String
            | SampleType::Struct => false,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }

    /// Types a reader can convert into each other element by element.
    pub const fn is_convertible(&self) -> bool {
        self.is_numeric() || matches!(self, SampleType::RangeInt64)
    }
}
