//! Typed front-end resolving the element type at runtime

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ReadOutcome, SampleRead};
use crate::codec::{DiscardSink, RawSink, SampleKind, SampleSink, TypedSink};
use crate::types::{DataDescriptor, RangeInt64, ReadMode, Sample, SampleType, Scalar};
use crate::{ReaderError, Result};

/// Owned samples of one resolved element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    RangeInt64(Vec<RangeInt64>),
    /// Raw struct samples, `sample_size` bytes each
    Struct { bytes: Vec<u8>, sample_size: usize },
}

macro_rules! for_each_typed {
    ($buffer:expr, |$values:ident| $body:expr, |$bytes:ident, $size:ident| $raw:expr) => {
        match $buffer {
            SampleBuffer::Float32($values) => $body,
            SampleBuffer::Float64($values) => $body,
            SampleBuffer::Int8($values) => $body,
            SampleBuffer::UInt8($values) => $body,
            SampleBuffer::Int16($values) => $body,
            SampleBuffer::UInt16($values) => $body,
            SampleBuffer::Int32($values) => $body,
            SampleBuffer::UInt32($values) => $body,
            SampleBuffer::Int64($values) => $body,
            SampleBuffer::UInt64($values) => $body,
            SampleBuffer::RangeInt64($values) => $body,
            SampleBuffer::Struct { bytes: $bytes, sample_size: $size } => $raw,
        }
    };
}

impl SampleBuffer {
    /// A zero-filled buffer of `len` samples.
    pub fn zeroed(kind: SampleKind, len: usize, sample_size: usize) -> Self {
        match kind {
            SampleKind::Float32 => SampleBuffer::Float32(vec![0.0; len]),
            SampleKind::Float64 => SampleBuffer::Float64(vec![0.0; len]),
            SampleKind::Int8 => SampleBuffer::Int8(vec![0; len]),
            SampleKind::UInt8 => SampleBuffer::UInt8(vec![0; len]),
            SampleKind::Int16 => SampleBuffer::Int16(vec![0; len]),
            SampleKind::UInt16 => SampleBuffer::UInt16(vec![0; len]),
            SampleKind::Int32 => SampleBuffer::Int32(vec![0; len]),
            SampleKind::UInt32 => SampleBuffer::UInt32(vec![0; len]),
            SampleKind::Int64 => SampleBuffer::Int64(vec![0; len]),
            SampleKind::UInt64 => SampleBuffer::UInt64(vec![0; len]),
            SampleKind::RangeInt64 => SampleBuffer::RangeInt64(vec![RangeInt64::default(); len]),
            SampleKind::Struct => {
                SampleBuffer::Struct { bytes: vec![0; len * sample_size], sample_size }
            }
        }
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            SampleBuffer::Float32(_) => SampleKind::Float32,
            SampleBuffer::Float64(_) => SampleKind::Float64,
            SampleBuffer::Int8(_) => SampleKind::Int8,
            SampleBuffer::UInt8(_) => SampleKind::UInt8,
            SampleBuffer::Int16(_) => SampleKind::Int16,
            SampleBuffer::UInt16(_) => SampleKind::UInt16,
            SampleBuffer::Int32(_) => SampleKind::Int32,
            SampleBuffer::UInt32(_) => SampleKind::UInt32,
            SampleBuffer::Int64(_) => SampleKind::Int64,
            SampleBuffer::UInt64(_) => SampleKind::UInt64,
            SampleBuffer::RangeInt64(_) => SampleKind::RangeInt64,
            SampleBuffer::Struct { .. } => SampleKind::Struct,
        }
    }

    pub fn len(&self) -> usize {
        for_each_typed!(
            self,
            |values| values.len(),
            |bytes, size| bytes.len().checked_div(*size).unwrap_or(0)
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn truncate(&mut self, len: usize) {
        for_each_typed!(
            self,
            |values| values.truncate(len),
            |bytes, size| bytes.truncate(len * *size)
        )
    }

    /// Numeric value of sample `index`; `None` for struct samples.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        for_each_typed!(
            self,
            |values| values.get(index).map(|v| v.to_scalar()),
            |_bytes, _size| None
        )
    }

    /// All samples as numeric values; empty for struct samples.
    pub fn to_scalars(&self) -> Vec<Scalar> {
        for_each_typed!(
            self,
            |values| values.iter().map(|v| v.to_scalar()).collect(),
            |_bytes, _size| Vec::new()
        )
    }

    /// Raw bytes of sample `index` of a struct buffer.
    pub fn struct_sample(&self, index: usize) -> Option<&[u8]> {
        match self {
            SampleBuffer::Struct { bytes, sample_size } => {
                bytes.get(index * sample_size..(index + 1) * sample_size)
            }
            _ => None,
        }
    }

    fn sink(&mut self) -> Box<dyn SampleSink + '_> {
        for_each_typed!(
            self,
            |values| Box::new(TypedSink::new(values.as_mut_slice())),
            |bytes, size| Box::new(RawSink::new(bytes.as_mut_slice(), *size))
        )
    }
}

/// Result of resolving a reader's element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No descriptor has arrived yet; retry later.
    Pending,
    Ready(SampleKind),
}

#[derive(Debug, Clone)]
struct Resolved {
    kind: SampleKind,
    sample_size: usize,
    /// Descriptor the kind was resolved from; `None` when fixed by the read type
    descriptor: Option<Arc<DataDescriptor>>,
}

/// Reader front-end that allocates output buffers of the right element type.
///
/// With an `Undefined` read type the element type follows the signal's descriptor,
/// re-resolved whenever the reader sees a different descriptor instance.
#[derive(Debug)]
pub struct TypedReader<R> {
    reader: R,
    values: Option<Resolved>,
    domain: Option<Resolved>,
}

impl<R: SampleRead> TypedReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let values = match reader.value_read_type() {
            SampleType::Undefined | SampleType::Struct => None,
            fixed => Some(Resolved {
                kind: SampleKind::for_value(fixed)?,
                sample_size: fixed.size(),
                descriptor: None,
            }),
        };
        let domain = match reader.domain_read_type() {
            SampleType::Undefined => None,
            fixed => Some(Resolved {
                kind: SampleKind::for_domain(fixed)?,
                sample_size: fixed.size(),
                descriptor: None,
            }),
        };
        Ok(TypedReader { reader, values, domain })
    }

    pub fn inner(&self) -> &R {
        &self.reader
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn stale(resolved: &Option<Resolved>, current: Option<&Arc<DataDescriptor>>) -> bool {
        match resolved {
            None => true,
            Some(Resolved { descriptor: None, .. }) => false,
            Some(Resolved { descriptor: Some(cached), .. }) => {
                current.is_none_or(|current| !Arc::ptr_eq(cached, current))
            }
        }
    }

    fn resolve_values(&mut self) -> Result<Option<Resolved>> {
        let current = self.reader.value_descriptor();
        if !Self::stale(&self.values, current.as_ref()) {
            return Ok(self.values.clone());
        }
        let Some(descriptor) = current else { return Ok(None) };
        let kind = if self.reader.value_read_type() == SampleType::Struct {
            // whole raw samples, whatever the descriptor's element type
            SampleKind::Struct
        } else {
            let stored = match self.reader.options().read_mode {
                ReadMode::Scaled => descriptor.sample_type,
                ReadMode::Unscaled | ReadMode::RawValue => descriptor.raw_sample_type(),
            };
            SampleKind::for_value(stored)?
        };
        debug!(?kind, "value element type resolved from descriptor");
        let sample_size = descriptor.raw_sample_size();
        let resolved = Resolved { kind, sample_size, descriptor: Some(descriptor) };
        self.values = Some(resolved.clone());
        Ok(Some(resolved))
    }

    fn resolve_domain(&mut self) -> Result<Option<Resolved>> {
        let current = self.reader.domain_descriptor();
        if !Self::stale(&self.domain, current.as_ref()) {
            return Ok(self.domain.clone());
        }
        let Some(descriptor) = current else { return Ok(None) };
        let kind = SampleKind::for_domain(descriptor.raw_sample_type())?;
        let sample_size = descriptor.raw_sample_size();
        let resolved = Resolved { kind, sample_size, descriptor: Some(descriptor) };
        self.domain = Some(resolved.clone());
        Ok(Some(resolved))
    }

    /// Resolve the value element type, consuming a leading descriptor event if needed.
    pub fn probe(&mut self) -> Result<ProbeOutcome> {
        if self.resolve_values()?.is_none() {
            self.reader.read_into(&mut DiscardSink, None, 0, Duration::ZERO)?;
        }
        Ok(match self.resolve_values()? {
            Some(resolved) => ProbeOutcome::Ready(resolved.kind),
            None => ProbeOutcome::Pending,
        })
    }

    fn require(resolved: Option<Resolved>) -> Result<Resolved> {
        resolved.ok_or(ReaderError::UndefinedTypeNoDescriptor)
    }

    /// Read `count` units into a freshly allocated buffer.
    pub fn read(&mut self, count: usize, timeout: Duration) -> Result<(SampleBuffer, R::Status)> {
        self.probe()?;
        let values = Self::require(self.resolve_values()?)?;
        let len = count * self.reader.block_size();
        let mut buffer = SampleBuffer::zeroed(values.kind, len, values.sample_size);
        let ReadOutcome { count, status } = {
            let mut sink = buffer.sink();
            self.reader.read_into(sink.as_mut(), None, count, timeout)?
        };
        buffer.truncate(count * self.reader.block_size());
        Ok((buffer, status))
    }

    /// Read `count` units of values and domain values into fresh buffers.
    pub fn read_with_domain(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<(SampleBuffer, SampleBuffer, R::Status)> {
        self.probe()?;
        let values = Self::require(self.resolve_values()?)?;
        let domain = Self::require(self.resolve_domain()?)?;
        let len = count * self.reader.block_size();
        let mut value_buffer = SampleBuffer::zeroed(values.kind, len, values.sample_size);
        let mut domain_buffer = SampleBuffer::zeroed(domain.kind, len, domain.sample_size);
        let ReadOutcome { count, status } = {
            let mut value_sink = value_buffer.sink();
            let mut domain_sink = domain_buffer.sink();
            let domain: &mut dyn SampleSink = domain_sink.as_mut();
            self.reader.read_into(value_sink.as_mut(), Some(domain), count, timeout)?
        };
        let len = count * self.reader.block_size();
        value_buffer.truncate(len);
        domain_buffer.truncate(len);
        Ok((value_buffer, domain_buffer, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Signal;
    use crate::reader::{BlockReader, StreamReader};
    use crate::types::{DataPacket, DataRule, Ratio, encode_samples};

    #[test]
    fn pending_until_descriptor_arrives() {
        let signal = Signal::new("ai0");
        let reader = StreamReader::builder(&signal).build().unwrap();
        let mut typed = TypedReader::new(reader).unwrap();
        assert_eq!(typed.probe().unwrap(), ProbeOutcome::Pending);
        assert!(matches!(
            typed.read(4, Duration::ZERO),
            Err(ReaderError::UndefinedTypeNoDescriptor)
        ));

        let value = DataDescriptor::builder(SampleType::Int16).build().unwrap();
        signal.set_descriptors(Some(value), None);
        assert_eq!(typed.probe().unwrap(), ProbeOutcome::Ready(SampleKind::Int16));
    }

    #[test]
    fn follows_descriptor_changes() {
        let first = DataDescriptor::builder(SampleType::Int32).build().unwrap();
        let signal = Signal::with_descriptors("ai0", first, None);
        let reader = StreamReader::builder(&signal).build().unwrap();
        let mut typed = TypedReader::new(reader).unwrap();

        signal.send_samples(&[1i32, 2], Scalar::Int(0)).unwrap();
        let second = DataDescriptor::builder(SampleType::Float32).build().unwrap();
        signal.set_descriptors(Some(second), None);
        signal.send_samples(&[0.5f32], Scalar::Int(0)).unwrap();

        let (buffer, status) = typed.read(4, Duration::ZERO).unwrap();
        assert_eq!(buffer, SampleBuffer::Int32(vec![1, 2]));
        assert!(status.is_event());

        let (buffer, _) = typed.read(4, Duration::ZERO).unwrap();
        assert_eq!(buffer, SampleBuffer::Float32(vec![0.5]));
    }

    #[test]
    fn fixed_read_type_converts() {
        let value = DataDescriptor::builder(SampleType::Int16).build().unwrap();
        let signal = Signal::with_descriptors("ai0", value, None);
        let reader =
            StreamReader::builder(&signal).value_read_type(SampleType::Float64).build().unwrap();
        let mut typed = TypedReader::new(reader).unwrap();
        signal.send_samples(&[3i16, -4], Scalar::Int(0)).unwrap();
        let (buffer, _) = typed.read(2, Duration::ZERO).unwrap();
        assert_eq!(buffer, SampleBuffer::Float64(vec![3.0, -4.0]));
        assert_eq!(buffer.get(1), Some(Scalar::Float(-4.0)));
    }

    #[test]
    fn struct_samples_are_copied_raw() {
        let field = DataDescriptor::builder(SampleType::Int32).build().unwrap();
        let value = DataDescriptor::builder(SampleType::Struct)
            .struct_field(field.as_ref().clone())
            .struct_field(field.as_ref().clone())
            .build()
            .unwrap();
        let signal = Signal::with_descriptors("ai0", value.clone(), None);
        let reader = StreamReader::builder(&signal).build().unwrap();
        let mut typed = TypedReader::new(reader).unwrap();
        let packet = DataPacket::explicit(value, 2, encode_samples(&[1i32, 2, 3, 4]), None);
        signal.send(packet.unwrap());

        let (buffer, _) = typed.read(2, Duration::ZERO).unwrap();
        assert_eq!(buffer.kind(), SampleKind::Struct);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.struct_sample(1), Some(encode_samples(&[3i32, 4]).as_slice()));
    }

    #[test]
    fn struct_read_type_copies_numeric_samples_raw() {
        let value = DataDescriptor::builder(SampleType::Int32).build().unwrap();
        let signal = Signal::with_descriptors("ai0", value, None);
        let reader =
            StreamReader::builder(&signal).value_read_type(SampleType::Struct).build().unwrap();
        let mut typed = TypedReader::new(reader).unwrap();
        signal.send_samples(&[1i32, -2], Scalar::Int(0)).unwrap();

        assert_eq!(typed.probe().unwrap(), ProbeOutcome::Ready(SampleKind::Struct));
        let (buffer, _) = typed.read(2, Duration::ZERO).unwrap();
        assert_eq!(buffer.kind(), SampleKind::Struct);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.struct_sample(0), Some(encode_samples(&[1i32]).as_slice()));
        assert_eq!(buffer.struct_sample(1), Some(encode_samples(&[-2i32]).as_slice()));
    }

    #[test]
    fn block_reads_allocate_whole_blocks() {
        let value = DataDescriptor::builder(SampleType::UInt8).build().unwrap();
        let domain = DataDescriptor::builder(SampleType::Int64)
            .rule(DataRule::linear(1, 0))
            .tick_resolution(Ratio::new(1, 10).unwrap())
            .build()
            .unwrap();
        let signal = Signal::with_descriptors("ai0", value, Some(domain));
        let reader = BlockReader::builder(&signal, 2).build().unwrap();
        let mut typed = TypedReader::new(reader).unwrap();
        signal.send_samples(&[1u8, 2, 3, 4, 5], Scalar::Int(0)).unwrap();

        let (values, domain, _) = typed.read_with_domain(3, Duration::ZERO).unwrap();
        assert_eq!(values, SampleBuffer::UInt8(vec![1, 2, 3, 4]));
        assert_eq!(domain, SampleBuffer::Int64(vec![0, 1, 2, 3]));
    }
}
