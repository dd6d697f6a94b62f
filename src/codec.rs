//! Sample codec: decoding packet payloads into typed output buffers.
//!
//! All dispatch over [`SampleType`] happens here, in exhaustive matches. Adding a
//! sample type to the enum fails to compile until every table below handles it.
//!
//! Readers never touch bytes directly. They describe *which* samples to move as a
//! [`SourceSegment`] and hand it to a [`SampleSink`], which owns the destination
//! buffer and knows its element type.

use crate::types::{DataPacket, PostScaling, RangeInt64, ReadMode, Sample, SampleType, Scalar};
use crate::{ReaderError, Result};

/// Element kinds the typed front-end can materialise.
///
/// The resolved form of a runtime [`SampleType`]: every variant maps to exactly one
/// concrete buffer element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
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
    RangeInt64,
    Struct,
}

impl SampleKind {
    /// Resolve a value read type to an element kind.
    ///
    /// Complex, binary, string and range values are rejected; `Undefined` must be
    /// resolved against a descriptor first.
    pub fn for_value(sample_type: SampleType) -> Result<Self> {
        match sample_type {
            SampleType::Float32 => Ok(SampleKind::Float32),
            SampleType::Float64 => Ok(SampleKind::Float64),
            SampleType::Int8 => Ok(SampleKind::Int8),
            SampleType::UInt8 => Ok(SampleKind::UInt8),
            SampleType::Int16 => Ok(SampleKind::Int16),
            SampleType::UInt16 => Ok(SampleKind::UInt16),
            SampleType::Int32 => Ok(SampleKind::Int32),
            SampleType::UInt32 => Ok(SampleKind::UInt32),
            SampleType::Int64 => Ok(SampleKind::Int64),
            SampleType::UInt64 => Ok(SampleKind::UInt64),
            SampleType::Struct => Ok(SampleKind::Struct),
            SampleType::Undefined => Err(ReaderError::UndefinedTypeNoDescriptor),
            SampleType::RangeInt64
            | SampleType::ComplexFloat32
            | SampleType::ComplexFloat64
            | SampleType::Binary
            | SampleType::String
            | SampleType::Invalid => {
                Err(ReaderError::unsupported_sample_type(sample_type, "as a value read type"))
            }
        }
    }

    /// Resolve a domain read type to an element kind.
    pub fn for_domain(sample_type: SampleType) -> Result<Self> {
        check_domain_read_type(sample_type)?;
        match sample_type {
            SampleType::RangeInt64 => Ok(SampleKind::RangeInt64),
            other => Self::for_value(other),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleKind::Float32 => SampleType::Float32,
            SampleKind::Float64 => SampleType::Float64,
            SampleKind::Int8 => SampleType::Int8,
            SampleKind::UInt8 => SampleType::UInt8,
            SampleKind::Int16 => SampleType::Int16,
            SampleKind::UInt16 => SampleType::UInt16,
            SampleKind::Int32 => SampleType::Int32,
            SampleKind::UInt32 => SampleType::UInt32,
            SampleKind::Int64 => SampleType::Int64,
            SampleKind::UInt64 => SampleType::UInt64,
            SampleKind::RangeInt64 => SampleType::RangeInt64,
            SampleKind::Struct => SampleType::Struct,
        }
    }
}

/// Validate a configured value read type.
pub fn check_value_read_type(sample_type: SampleType) -> Result<()> {
    match sample_type {
        SampleType::Undefined => Ok(()),
        other => SampleKind::for_value(other).map(|_| ()),
    }
}

/// Validate a configured domain read type.
pub fn check_domain_read_type(sample_type: SampleType) -> Result<()> {
    match sample_type {
        SampleType::Undefined
        | SampleType::Float32
        | SampleType::Float64
        | SampleType::Int8
        | SampleType::UInt8
        | SampleType::Int16
        | SampleType::UInt16
        | SampleType::Int32
        | SampleType::UInt32
        | SampleType::Int64
        | SampleType::UInt64
        | SampleType::RangeInt64 => Ok(()),
        SampleType::ComplexFloat32
        | SampleType::ComplexFloat64
        | SampleType::Binary
        | SampleType::String
        | SampleType::Struct
        | SampleType::Invalid => {
            Err(ReaderError::UnsupportedDomainSampleType { sample_type })
        }
    }
}

/// A run of consecutive samples inside one data packet.
#[derive(Debug, Clone, Copy)]
pub struct SourceSegment<'a> {
    pub packet: &'a DataPacket,
    pub start: usize,
    pub count: usize,
    pub mode: ReadMode,
}

impl<'a> SourceSegment<'a> {
    pub fn new(packet: &'a DataPacket, start: usize, count: usize, mode: ReadMode) -> Self {
        SourceSegment { packet, start, count, mode }
    }

    /// Payload bytes covering this segment.
    pub fn raw_bytes(&self) -> Result<&'a [u8]> {
        let size = self.packet.descriptor.raw_sample_size();
        let begin = self.start * size;
        let end = (self.start + self.count) * size;
        self.packet.data.get(begin..end).ok_or_else(|| {
            ReaderError::invalid_descriptor(format!(
                "payload of {} bytes is too short for samples {}..{}",
                self.packet.data.len(),
                self.start,
                self.start + self.count
            ))
        })
    }

    fn scaling(&self) -> Option<&'a PostScaling> {
        match self.mode {
            ReadMode::Scaled => self.packet.descriptor.post_scaling.as_ref(),
            ReadMode::Unscaled | ReadMode::RawValue => None,
        }
    }

    /// Decode the segment into typed elements.
    pub fn decode_into<T: Sample>(&self, out: &mut [T]) -> Result<()> {
        let provided = out.len();
        let out = out
            .get_mut(..self.count)
            .ok_or_else(|| ReaderError::buffer_too_small("decode", self.count, provided))?;
        let descriptor = &self.packet.descriptor;
        let scaling = self.scaling();

        if !descriptor.rule.is_explicit() {
            for (i, slot) in out.iter_mut().enumerate() {
                let value = self
                    .packet
                    .implicit_value(self.start + i)
                    .ok_or_else(|| ReaderError::invalid_descriptor("implicit rule without value"))?;
                *slot = T::from_scalar(scaling.map_or(value, |s| s.apply(value)));
            }
            return Ok(());
        }

        if !descriptor.is_scalar() {
            return Err(ReaderError::unsupported_sample_type(
                descriptor.sample_type,
                "for element-wise reads of multi-dimensional or struct samples",
            ));
        }

        let raw_type = descriptor.raw_sample_type();
        let bytes = self.raw_bytes()?;
        if self.mode == ReadMode::RawValue && raw_type != T::SAMPLE_TYPE {
            return Err(ReaderError::TypeMismatch { expected: raw_type, actual: T::SAMPLE_TYPE });
        }
        convert_slice(raw_type, bytes, out, scaling)
    }

    /// Decode the segment into numeric carriers.
    pub fn scalars(&self) -> Result<Vec<Scalar>> {
        let descriptor = &self.packet.descriptor;
        if !descriptor.rule.is_explicit() {
            return (0..self.count)
                .map(|i| {
                    self.packet.implicit_value(self.start + i).ok_or_else(|| {
                        ReaderError::invalid_descriptor("implicit rule without value")
                    })
                })
                .collect();
        }
        let raw_type = descriptor.raw_sample_type();
        let size = raw_type.size();
        if size == 0 || !descriptor.is_scalar() {
            return Err(ReaderError::unsupported_sample_type(raw_type, "as a numeric value"));
        }
        self.raw_bytes()?.chunks_exact(size).map(|chunk| decode_scalar(raw_type, chunk)).collect()
    }
}

/// Decode one element of `sample_type` from `bytes` into a [`Scalar`].
pub fn decode_scalar(sample_type: SampleType, bytes: &[u8]) -> Result<Scalar> {
    if bytes.len() < sample_type.size() {
        return Err(ReaderError::buffer_too_small("scalar decode", sample_type.size(), bytes.len()));
    }
    match sample_type {
        SampleType::Float32 => Ok(f32::from_le_slice(bytes).to_scalar()),
        SampleType::Float64 => Ok(f64::from_le_slice(bytes).to_scalar()),
        SampleType::Int8 => Ok(i8::from_le_slice(bytes).to_scalar()),
        SampleType::UInt8 => Ok(u8::from_le_slice(bytes).to_scalar()),
        SampleType::Int16 => Ok(i16::from_le_slice(bytes).to_scalar()),
        SampleType::UInt16 => Ok(u16::from_le_slice(bytes).to_scalar()),
        SampleType::Int32 => Ok(i32::from_le_slice(bytes).to_scalar()),
        SampleType::UInt32 => Ok(u32::from_le_slice(bytes).to_scalar()),
        SampleType::Int64 => Ok(i64::from_le_slice(bytes).to_scalar()),
        SampleType::UInt64 => Ok(u64::from_le_slice(bytes).to_scalar()),
        SampleType::RangeInt64 => Ok(RangeInt64::from_le_slice(bytes).to_scalar()),
        SampleType::ComplexFloat32
        | SampleType::ComplexFloat64
        | SampleType::Binary
        | SampleType::String
        | SampleType::Struct
        | SampleType::Undefined
        | SampleType::Invalid => {
            Err(ReaderError::unsupported_sample_type(sample_type, "for numeric conversion"))
        }
    }
}

fn convert_slice<T: Sample>(
    raw_type: SampleType,
    bytes: &[u8],
    out: &mut [T],
    scaling: Option<&PostScaling>,
) -> Result<()> {
    if raw_type == T::SAMPLE_TYPE && scaling.is_none() {
        for (chunk, slot) in bytes.chunks_exact(raw_type.size()).zip(out.iter_mut()) {
            *slot = T::from_le_slice(chunk);
        }
        return Ok(());
    }
    match raw_type {
        SampleType::Float32 => convert_from::<f32, T>(bytes, out, scaling),
        SampleType::Float64 => convert_from::<f64, T>(bytes, out, scaling),
        SampleType::Int8 => convert_from::<i8, T>(bytes, out, scaling),
        SampleType::UInt8 => convert_from::<u8, T>(bytes, out, scaling),
        SampleType::Int16 => convert_from::<i16, T>(bytes, out, scaling),
        SampleType::UInt16 => convert_from::<u16, T>(bytes, out, scaling),
        SampleType::Int32 => convert_from::<i32, T>(bytes, out, scaling),
        SampleType::UInt32 => convert_from::<u32, T>(bytes, out, scaling),
        SampleType::Int64 => convert_from::<i64, T>(bytes, out, scaling),
        SampleType::UInt64 => convert_from::<u64, T>(bytes, out, scaling),
        SampleType::RangeInt64 => convert_from::<RangeInt64, T>(bytes, out, scaling),
        SampleType::ComplexFloat32
        | SampleType::ComplexFloat64
        | SampleType::Binary
        | SampleType::String
        | SampleType::Struct
        | SampleType::Undefined
        | SampleType::Invalid => {
            return Err(ReaderError::unsupported_sample_type(
                raw_type,
                format!("for conversion to {:?}", T::SAMPLE_TYPE),
            ));
        }
    }
    Ok(())
}

fn convert_from<S: Sample, T: Sample>(bytes: &[u8], out: &mut [T], scaling: Option<&PostScaling>) {
    let chunks = bytes.chunks_exact(S::SAMPLE_TYPE.size());
    match scaling {
        Some(scaling) => {
            for (chunk, slot) in chunks.zip(out.iter_mut()) {
                *slot = T::from_scalar(scaling.apply(S::from_le_slice(chunk).to_scalar()));
            }
        }
        None => {
            for (chunk, slot) in chunks.zip(out.iter_mut()) {
                *slot = T::from_scalar(S::from_le_slice(chunk).to_scalar());
            }
        }
    }
}

/// Destination of decoded samples.
///
/// `at` is the element index inside the sink where the segment's first sample goes.
pub trait SampleSink {
    /// Element type written by this sink; `Undefined` accepts any source.
    fn sample_type(&self) -> SampleType;

    /// Number of samples the sink can hold.
    fn capacity(&self) -> usize;

    fn write(&mut self, at: usize, segment: &SourceSegment<'_>) -> Result<()>;
}

/// Sink over a typed slice.
pub struct TypedSink<'a, T: Sample> {
    buffer: &'a mut [T],
}

impl<'a, T: Sample> TypedSink<'a, T> {
    pub fn new(buffer: &'a mut [T]) -> Self {
        TypedSink { buffer }
    }
}

impl<T: Sample> SampleSink for TypedSink<'_, T> {
    fn sample_type(&self) -> SampleType {
        T::SAMPLE_TYPE
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn write(&mut self, at: usize, segment: &SourceSegment<'_>) -> Result<()> {
        let provided = self.buffer.len();
        let slot = self
            .buffer
            .get_mut(at..at + segment.count)
            .ok_or_else(|| {
                ReaderError::buffer_too_small("typed sink", at + segment.count, provided)
            })?;
        segment.decode_into(slot)
    }
}

/// Sink copying whole raw samples (structs, multi-dimensional samples).
pub struct RawSink<'a> {
    buffer: &'a mut [u8],
    sample_size: usize,
}

impl<'a> RawSink<'a> {
    pub fn new(buffer: &'a mut [u8], sample_size: usize) -> Self {
        RawSink { buffer, sample_size }
    }
}

impl SampleSink for RawSink<'_> {
    fn sample_type(&self) -> SampleType {
        SampleType::Struct
    }

    fn capacity(&self) -> usize {
        self.buffer.len().checked_div(self.sample_size).unwrap_or(0)
    }

    fn write(&mut self, at: usize, segment: &SourceSegment<'_>) -> Result<()> {
        let descriptor = &segment.packet.descriptor;
        if !descriptor.rule.is_explicit() {
            return Err(ReaderError::unsupported_sample_type(
                descriptor.sample_type,
                "for raw reads of implicit packets",
            ));
        }
        if descriptor.raw_sample_size() != self.sample_size {
            return Err(ReaderError::buffer_too_small(
                "raw sample size",
                descriptor.raw_sample_size(),
                self.sample_size,
            ));
        }
        let bytes = segment.raw_bytes()?;
        let begin = at * self.sample_size;
        let provided = self.buffer.len();
        let slot = self
            .buffer
            .get_mut(begin..begin + bytes.len())
            .ok_or_else(|| {
                ReaderError::buffer_too_small("raw sink", begin + bytes.len(), provided)
            })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }
}

/// Sink that drops everything; used to skip samples.
pub struct DiscardSink;

impl SampleSink for DiscardSink {
    fn sample_type(&self) -> SampleType {
        SampleType::Undefined
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }

    fn write(&mut self, _at: usize, _segment: &SourceSegment<'_>) -> Result<()> {
        Ok(())
    }
}
