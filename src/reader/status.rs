//! Outcome of a single read

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{DataDescriptor, EventPacket, Scalar};

/// Why a read returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStatus {
    /// Samples (possibly fewer than requested) were read without interruption.
    Ok,
    /// The read stopped at an event packet.
    Event,
    /// The reader is invalid and read nothing.
    Fail,
    #[default]
    Unknown,
}

/// Status of a stream or block read.
#[derive(Debug, Clone, Default)]
pub struct ReaderStatus {
    pub read_status: ReadStatus,
    /// The event the read stopped at
    pub event_packet: Option<Arc<EventPacket>>,
    /// False once a descriptor change made the configured read types unusable
    pub valid: bool,
    /// Domain offset of the first data packet touched by the read
    pub offset: Option<Scalar>,
    /// The deadline passed before the full count was available
    pub timed_out: bool,
}

impl ReaderStatus {
    pub fn ok() -> Self {
        ReaderStatus { read_status: ReadStatus::Ok, valid: true, ..Default::default() }
    }

    pub fn event(event: Arc<EventPacket>) -> Self {
        ReaderStatus {
            read_status: ReadStatus::Event,
            event_packet: Some(event),
            valid: true,
            ..Default::default()
        }
    }

    pub fn fail() -> Self {
        ReaderStatus { read_status: ReadStatus::Fail, valid: false, ..Default::default() }
    }

    pub fn is_ok(&self) -> bool {
        self.read_status == ReadStatus::Ok
    }

    pub fn is_event(&self) -> bool {
        self.read_status == ReadStatus::Event
    }

    /// New value descriptor carried by the event, if any.
    pub fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.event_packet.as_deref().and_then(EventPacket::value_descriptor)
    }

    /// New domain descriptor carried by the event, if any.
    pub fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.event_packet.as_deref().and_then(EventPacket::domain_descriptor)
    }
}

/// Status of a tail read.
#[derive(Debug, Clone, Default)]
pub struct TailReaderStatus {
    pub status: ReaderStatus,
    /// The history has been completely filled at least once
    pub sufficient_history: bool,
}

impl AsRef<ReaderStatus> for ReaderStatus {
    fn as_ref(&self) -> &ReaderStatus {
        self
    }
}

impl AsRef<ReaderStatus> for TailReaderStatus {
    fn as_ref(&self) -> &ReaderStatus {
        &self.status
    }
}

/// Status of a multi-signal read.
#[derive(Debug, Clone, Default)]
pub struct MultiReaderStatus {
    pub status: ReaderStatus,
    /// Events keyed by signal id; only signals that produced an event appear
    pub event_packets: BTreeMap<String, Arc<EventPacket>>,
}

impl AsRef<ReaderStatus> for MultiReaderStatus {
    fn as_ref(&self) -> &ReaderStatus {
        &self.status
    }
}

/// Number of samples (or blocks) read plus the status explaining the count.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome<S = ReaderStatus> {
    pub count: usize,
    pub status: S,
}

impl<S> ReadOutcome<S> {
    pub fn new(count: usize, status: S) -> Self {
        ReadOutcome { count, status }
    }
}
