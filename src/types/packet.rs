//! Packets flowing from a signal to its readers

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DataDescriptor, DataRule, Sample, Scalar, encode_samples};
use crate::{ReaderError, Result};

/// Event id published whenever a signal's value or domain descriptor changes.
pub const DATA_DESCRIPTOR_CHANGED: &str = "DATA_DESCRIPTOR_CHANGED";
/// Event id published when an implicit domain skips ahead.
pub const IMPLICIT_DOMAIN_GAP_DETECTED: &str = "IMPLICIT_DOMAIN_GAP_DETECTED";

/// Parameter key of the new value descriptor.
pub const PARAM_DATA_DESCRIPTOR: &str = "DataDescriptor";
/// Parameter key of the new domain descriptor.
pub const PARAM_DOMAIN_DESCRIPTOR: &str = "DomainDataDescriptor";
/// Parameter key of the gap size in domain ticks.
pub const PARAM_GAP_DIFF: &str = "GapDiff";

/// Value of an event parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum EventParameter {
    Descriptor(Arc<DataDescriptor>),
    Scalar(Scalar),
    Text(String),
}

/// Out-of-band notification travelling in order with the data.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPacket {
    pub event_id: String,
    pub parameters: BTreeMap<String, EventParameter>,
}

impl EventPacket {
    pub fn new(event_id: impl Into<String>) -> Self {
        EventPacket { event_id: event_id.into(), parameters: BTreeMap::new() }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: EventParameter) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Descriptor change; `None` leaves that descriptor unchanged.
    pub fn data_descriptor_changed(
        value: Option<Arc<DataDescriptor>>,
        domain: Option<Arc<DataDescriptor>>,
    ) -> Self {
        let mut event = EventPacket::new(DATA_DESCRIPTOR_CHANGED);
        if let Some(value) = value {
            event
                .parameters
                .insert(PARAM_DATA_DESCRIPTOR.to_string(), EventParameter::Descriptor(value));
        }
        if let Some(domain) = domain {
            event
                .parameters
                .insert(PARAM_DOMAIN_DESCRIPTOR.to_string(), EventParameter::Descriptor(domain));
        }
        event
    }

    pub fn implicit_domain_gap_detected(diff: Scalar) -> Self {
        EventPacket::new(IMPLICIT_DOMAIN_GAP_DETECTED)
            .with_parameter(PARAM_GAP_DIFF, EventParameter::Scalar(diff))
    }

    pub fn is_descriptor_change(&self) -> bool {
        self.event_id == DATA_DESCRIPTOR_CHANGED
    }

    fn descriptor(&self, key: &str) -> Option<&Arc<DataDescriptor>> {
        match self.parameters.get(key) {
            Some(EventParameter::Descriptor(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    pub fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.descriptor(PARAM_DATA_DESCRIPTOR)
    }

    pub fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.descriptor(PARAM_DOMAIN_DESCRIPTOR)
    }
}

/// A block of samples described by a descriptor.
///
/// Immutable once sent. Explicit packets carry `sample_count * raw_sample_size`
/// payload bytes; implicit (linear/constant) packets carry none and derive their
/// values from the rule and `offset`.
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub descriptor: Arc<DataDescriptor>,
    pub sample_count: usize,
    pub offset: Scalar,
    pub domain_packet: Option<Arc<DataPacket>>,
    pub data: Bytes,
}

impl DataPacket {
    /// Packet whose samples are stored explicitly in `data`.
    pub fn explicit(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        data: impl Into<Bytes>,
        domain_packet: Option<Arc<DataPacket>>,
    ) -> Result<Self> {
        let data = data.into();
        let required = sample_count * descriptor.raw_sample_size();
        if data.len() != required {
            return Err(ReaderError::buffer_too_small(
                "explicit packet payload",
                required,
                data.len(),
            ));
        }
        let packet =
            DataPacket { descriptor, sample_count, offset: Scalar::Int(0), domain_packet, data };
        packet.check_domain()?;
        Ok(packet)
    }

    /// Explicit packet encoded from typed samples.
    pub fn from_samples<T: Sample>(
        descriptor: Arc<DataDescriptor>,
        samples: &[T],
        domain_packet: Option<Arc<DataPacket>>,
    ) -> Result<Self> {
        if descriptor.raw_sample_type() != T::SAMPLE_TYPE || !descriptor.is_scalar() {
            return Err(ReaderError::TypeMismatch {
                expected: descriptor.raw_sample_type(),
                actual: T::SAMPLE_TYPE,
            });
        }
        Self::explicit(descriptor, samples.len(), encode_samples(samples), domain_packet)
    }

    /// Packet whose samples follow from the descriptor's rule.
    pub fn implicit(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        offset: Scalar,
        domain_packet: Option<Arc<DataPacket>>,
    ) -> Result<Self> {
        if descriptor.rule.is_explicit() {
            return Err(ReaderError::invalid_parameter(
                "descriptor",
                "implicit packets need a linear or constant rule",
            ));
        }
        let packet =
            DataPacket { descriptor, sample_count, offset, domain_packet, data: Bytes::new() };
        packet.check_domain()?;
        Ok(packet)
    }

    fn check_domain(&self) -> Result<()> {
        if let Some(domain) = &self.domain_packet {
            if domain.sample_count != self.sample_count {
                return Err(ReaderError::buffer_too_small(
                    "domain packet sample count",
                    self.sample_count,
                    domain.sample_count,
                ));
            }
        }
        Ok(())
    }

    /// Rule-generated value at `index`, if the rule is implicit.
    pub fn implicit_value(&self, index: usize) -> Option<Scalar> {
        match &self.descriptor.rule {
            DataRule::Explicit => None,
            DataRule::Linear { delta, start } => {
                Some(self.offset.add(*start).offset_by(*delta, index as i64))
            }
            DataRule::Constant { value } => Some(*value),
        }
    }
}

/// Anything a reader can dequeue.
#[derive(Debug, Clone)]
pub enum Packet {
    Event(Arc<EventPacket>),
    Data(Arc<DataPacket>),
}

impl Packet {
    pub fn sample_count(&self) -> usize {
        match self {
            Packet::Event(_) => 0,
            Packet::Data(data) => data.sample_count,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Packet::Event(_))
    }
}

impl From<EventPacket> for Packet {
    fn from(event: EventPacket) -> Self {
        Packet::Event(Arc::new(event))
    }
}

impl From<DataPacket> for Packet {
    fn from(data: DataPacket) -> Self {
        Packet::Data(Arc::new(data))
    }
}
