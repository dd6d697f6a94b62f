//! Per-signal cursor shared by every reader kind

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::{ReadOutcome, ReaderStatus};
use crate::codec::{SampleSink, SourceSegment, check_domain_read_type, check_value_read_type};
use crate::connection::{ConnectionQueue, QueueSummary, ReaderSource};
use crate::types::{DataDescriptor, DataPacket, EventPacket, Packet, ReadMode, SampleType, Scalar};
use crate::{ReaderError, Result};

/// Read configuration common to all reader kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    pub value_read_type: SampleType,
    pub domain_read_type: SampleType,
    pub read_mode: ReadMode,
    pub skip_events: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            value_read_type: SampleType::Undefined,
            domain_read_type: SampleType::Undefined,
            read_mode: ReadMode::Scaled,
            skip_events: false,
        }
    }
}

impl ReaderOptions {
    pub fn validate(&self) -> Result<()> {
        check_value_read_type(self.value_read_type)?;
        check_domain_read_type(self.domain_read_type)
    }
}

#[derive(Debug)]
struct PacketCursor {
    packet: Arc<DataPacket>,
    position: usize,
}

impl PacketCursor {
    fn remaining(&self) -> usize {
        self.packet.sample_count.saturating_sub(self.position)
    }
}

/// What [`ReaderCore::pull`] took off the queue.
#[derive(Debug)]
pub(crate) enum Pulled {
    Data(Arc<DataPacket>),
    Event(Arc<EventPacket>),
    Empty,
}

/// Cursor over one signal's connection queue.
///
/// Owns its position in the queue and the last seen descriptors, never the queue.
#[derive(Debug)]
pub(crate) struct ReaderCore {
    source: ReaderSource,
    queue: Option<Arc<ConnectionQueue>>,
    options: ReaderOptions,
    value_descriptor: Option<Arc<DataDescriptor>>,
    domain_descriptor: Option<Arc<DataDescriptor>>,
    current: Option<PacketCursor>,
    valid: bool,
    /// Reconfigured after invalidation; skip undecodable data until a readable descriptor
    resuming: bool,
}

impl ReaderCore {
    pub(crate) fn new(source: ReaderSource, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let queue = match &source {
            ReaderSource::Signal(signal) => Some(signal.connect()),
            ReaderSource::InputPort(port) => port.connection(),
        };
        let mut core = ReaderCore {
            source,
            queue,
            options,
            value_descriptor: None,
            domain_descriptor: None,
            current: None,
            valid: true,
            resuming: false,
        };
        core.absorb_initial_events();
        Ok(core)
    }

    /// Continue this cursor under new options, keeping its queue and position.
    ///
    /// Acknowledges an invalidation: if the current descriptor is still unreadable,
    /// following reads drop data until a readable descriptor arrives.
    pub(crate) fn reconfigure(mut self, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        self.options = options;
        self.revalidate();
        self.resuming = !self.valid;
        debug!(source = %self.source.id(), valid = self.valid, "reader reconfigured");
        Ok(self)
    }

    pub(crate) fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub(crate) fn source(&self) -> &ReaderSource {
        &self.source
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn value_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.value_descriptor.as_ref()
    }

    pub(crate) fn domain_descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.domain_descriptor.as_ref()
    }

    /// Consume leading descriptor events that only establish the initial layout.
    ///
    /// Returns whether any event was absorbed.
    pub(crate) fn absorb_initial_events(&mut self) -> bool {
        let Some(queue) = self.queue.clone() else { return false };
        let mut absorbed = false;
        while let Some(Packet::Event(event)) = queue.peek() {
            if !event.is_descriptor_change() {
                break;
            }
            queue.try_dequeue();
            self.apply_event(&event);
            absorbed = true;
        }
        absorbed
    }

    /// Follow an input port to its current connection.
    fn refresh_connection(&mut self) {
        let ReaderSource::InputPort(port) = &self.source else { return };
        let latest = port.connection();
        let unchanged = match (&self.queue, &latest) {
            (Some(current), Some(latest)) => Arc::ptr_eq(current, latest),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        debug!(port = %port.id(), connected = latest.is_some(), "input port connection changed");
        self.queue = latest;
        self.current = None;
        self.value_descriptor = None;
        self.domain_descriptor = None;
        self.valid = true;
        self.resuming = false;
        self.absorb_initial_events();
    }

    /// Update cached descriptors from an event and re-check the configured read types.
    fn apply_event(&mut self, event: &EventPacket) {
        if !event.is_descriptor_change() {
            debug!(event = %event.event_id, "event packet");
            return;
        }
        if let Some(value) = event.value_descriptor() {
            self.value_descriptor = Some(value.clone());
        }
        if let Some(domain) = event.domain_descriptor() {
            self.domain_descriptor = Some(domain.clone());
        }
        debug!(
            value = ?self.value_descriptor.as_ref().map(|d| d.sample_type),
            domain = ?self.domain_descriptor.as_ref().map(|d| d.sample_type),
            "descriptor changed"
        );
        self.revalidate();
    }

    /// Track descriptors carried by data packets; identity, not content, decides.
    fn track_packet_descriptors(&mut self, packet: &DataPacket) {
        let same_value =
            self.value_descriptor.as_ref().is_some_and(|d| Arc::ptr_eq(d, &packet.descriptor));
        let same_domain = match (&self.domain_descriptor, &packet.domain_packet) {
            (Some(cached), Some(domain)) => Arc::ptr_eq(cached, &domain.descriptor),
            (_, None) => true,
            (None, Some(_)) => false,
        };
        if same_value && same_domain {
            return;
        }
        trace!("data packet carries a new descriptor handle");
        self.value_descriptor = Some(packet.descriptor.clone());
        if let Some(domain) = &packet.domain_packet {
            self.domain_descriptor = Some(domain.descriptor.clone());
        }
        self.revalidate();
    }

    fn revalidate(&mut self) {
        let value_ok = self.value_descriptor.as_deref().is_none_or(|d| {
            readable_as(d, self.options.value_read_type, self.options.read_mode)
        });
        let domain_ok = self.domain_descriptor.as_deref().is_none_or(|d| {
            readable_as(d, self.options.domain_read_type, ReadMode::Unscaled)
        });
        let valid = value_ok && domain_ok;
        if self.valid && !valid {
            warn!(
                source = %self.source.id(),
                value_read_type = ?self.options.value_read_type,
                domain_read_type = ?self.options.domain_read_type,
                "descriptor can no longer be read with the configured types; reader invalidated"
            );
        }
        self.valid = valid;
    }

    /// Gate a read on validity; `Some` is the status the read returns at once.
    ///
    /// An invalidated cursor fails until it is reconfigured. A reconfigured cursor
    /// drops data it cannot decode until a readable descriptor arrives and reports
    /// the restoring event.
    pub(crate) fn resume(&mut self) -> Option<ReaderStatus> {
        if self.valid {
            return None;
        }
        if !self.resuming {
            return Some(ReaderStatus::fail());
        }
        let mut dropped = self.current.take().map_or(0, |c| c.remaining());
        let mut restored = None;
        while !self.valid {
            match self.pull() {
                Pulled::Empty => break,
                Pulled::Event(event) => restored = Some(event),
                Pulled::Data(packet) if self.valid => {
                    self.current = Some(PacketCursor { packet, position: 0 });
                }
                Pulled::Data(packet) => dropped += packet.sample_count,
            }
        }
        if dropped > 0 {
            warn!(source = %self.source.id(), dropped, "dropping samples the reader cannot decode");
        }
        if !self.valid {
            return Some(ReaderStatus::fail());
        }
        self.resuming = false;
        debug!(source = %self.source.id(), "reader valid again");
        match restored {
            Some(event) if self.current.is_none() && !self.options.skip_events => {
                Some(self.finish(ReaderStatus::event(event)))
            }
            _ => None,
        }
    }

    /// Hand over a packet kept by [`resume`](Self::resume) to readers that buffer
    /// packets themselves.
    pub(crate) fn take_held_packet(&mut self) -> Option<Arc<DataPacket>> {
        self.current.take().filter(|c| c.remaining() > 0).map(|c| c.packet)
    }

    /// Fail if the next `count` samples cannot be written as `read_type`.
    ///
    /// Inspects queued packets without consuming them.
    pub(crate) fn check_decodable(&mut self, read_type: SampleType, count: usize) -> Result<()> {
        self.refresh_connection();
        let held = self
            .current
            .as_ref()
            .filter(|c| c.remaining() > 0)
            .map(|c| (c.packet.clone(), c.remaining()));
        let queued = self.queue.as_ref().map(|q| q.data_before_event()).unwrap_or_default();
        let packets = held.into_iter().chain(queued.into_iter().map(|p| {
            let n = p.sample_count;
            (p, n)
        }));
        let mut left = count;
        for (packet, available) in packets {
            if left == 0 {
                break;
            }
            decodable_as(&packet.descriptor, read_type, self.options.read_mode)?;
            left = left.saturating_sub(available);
        }
        Ok(())
    }

    /// Take the next packet, applying descriptor bookkeeping.
    pub(crate) fn pull(&mut self) -> Pulled {
        let Some(queue) = &self.queue else { return Pulled::Empty };
        match queue.try_dequeue() {
            None => Pulled::Empty,
            Some(Packet::Event(event)) => {
                self.apply_event(&event);
                Pulled::Event(event)
            }
            Some(Packet::Data(packet)) => {
                self.track_packet_descriptors(&packet);
                Pulled::Data(packet)
            }
        }
    }

    /// Samples available to this cursor, including the partially read packet.
    pub(crate) fn summary(&mut self) -> QueueSummary {
        self.refresh_connection();
        let held = self.current.as_ref().map_or(0, PacketCursor::remaining);
        let mut summary = self.queue.as_ref().map(|q| q.summary()).unwrap_or_default();
        summary.samples_before_event += held;
        summary.total_samples += held;
        summary
    }

    /// Block until `ready` holds for the available samples or the deadline passes.
    pub(crate) fn wait(&mut self, deadline: Instant, ready: impl Fn(QueueSummary) -> bool) -> bool {
        self.refresh_connection();
        let held = self.current.as_ref().map_or(0, PacketCursor::remaining);
        let Some(queue) = &self.queue else { return false };
        queue.wait_until(deadline, |packets| {
            let mut summary = QueueSummary::of(packets.iter());
            summary.samples_before_event += held;
            summary.total_samples += held;
            ready(summary)
        })
    }

    /// Domain value of the next unread sample, if it is already queued before any event.
    pub(crate) fn next_domain_value(&mut self) -> Result<Option<(Scalar, Arc<DataDescriptor>)>> {
        self.refresh_connection();
        let (packet, position) = match &self.current {
            Some(cursor) if cursor.remaining() > 0 => (cursor.packet.clone(), cursor.position),
            _ => match self.queue.as_ref().and_then(|q| q.peek()) {
                Some(Packet::Data(packet)) => (packet, 0),
                _ => return Ok(None),
            },
        };
        let Some(domain) = &packet.domain_packet else {
            return Err(ReaderError::invalid_descriptor("data packet has no domain packet"));
        };
        let value = SourceSegment::new(domain, position, 1, ReadMode::Unscaled).scalars()?;
        Ok(value.first().map(|v| (*v, domain.descriptor.clone())))
    }

    /// Zero-count probe: handles at most one leading event, never consumes data.
    pub(crate) fn probe(&mut self) -> ReaderStatus {
        self.refresh_connection();
        if self.current.as_ref().is_some_and(|c| c.remaining() > 0) {
            return self.finish(ReaderStatus::ok());
        }
        let front_is_event =
            matches!(self.queue.as_ref().and_then(|q| q.peek()), Some(Packet::Event(_)));
        if !front_is_event {
            return self.finish(ReaderStatus::ok());
        }
        match self.pull() {
            Pulled::Event(event) if !self.options.skip_events => {
                self.finish(ReaderStatus::event(event))
            }
            _ => self.finish(ReaderStatus::ok()),
        }
    }

    fn finish(&self, mut status: ReaderStatus) -> ReaderStatus {
        status.valid = self.valid;
        if !self.valid && status.read_status == super::ReadStatus::Ok {
            status.read_status = super::ReadStatus::Fail;
        }
        status
    }

    fn check_sink(&self, sink: &dyn SampleSink, configured: SampleType) -> Result<()> {
        let actual = sink.sample_type();
        let constrained = configured != SampleType::Undefined && actual != SampleType::Undefined;
        if constrained && actual != configured {
            return Err(ReaderError::TypeMismatch { expected: configured, actual });
        }
        Ok(())
    }

    /// Fail if a sink's element type contradicts the configured read type.
    pub(crate) fn check_sinks(
        &self,
        values: &dyn SampleSink,
        domain: Option<&dyn SampleSink>,
    ) -> Result<()> {
        self.check_sink(values, self.options.value_read_type)?;
        if let Some(domain) = domain {
            self.check_sink(domain, self.options.domain_read_type)?;
        }
        Ok(())
    }

    /// Read up to `count` samples into the sinks.
    ///
    /// Stops early at an event (unless events are skipped) or when the queue runs dry
    /// after the deadline. Samples are only consumed once they were written.
    pub(crate) fn read(
        &mut self,
        values: &mut dyn SampleSink,
        mut domain: Option<&mut dyn SampleSink>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.refresh_connection();
        self.check_sinks(values, domain.as_deref())?;
        if let Some(status) = self.resume() {
            return Ok(ReadOutcome::new(0, status));
        }
        if count == 0 {
            return Ok(ReadOutcome::new(0, self.probe()));
        }
        if values.capacity() < count {
            return Err(ReaderError::buffer_too_small("value buffer", count, values.capacity()));
        }
        if let Some(domain) = domain.as_deref() {
            if domain.capacity() < count {
                let provided = domain.capacity();
                return Err(ReaderError::buffer_too_small("domain buffer", count, provided));
            }
        }

        if !timeout.is_zero() {
            let skip_events = self.options.skip_events;
            self.wait(Instant::now() + timeout, |s| {
                if skip_events {
                    s.total_samples >= count
                } else {
                    s.samples_before_event >= count || s.event_pending
                }
            });
        }

        let mut status = ReaderStatus::ok();
        let mut read = 0;
        while read < count {
            if let Some(cursor) = self.current.as_mut().filter(|c| c.remaining() > 0) {
                let n = cursor.remaining().min(count - read);
                let segment =
                    SourceSegment::new(&cursor.packet, cursor.position, n, self.options.read_mode);
                values.write(read, &segment)?;
                if let Some(domain_sink) = domain.as_deref_mut() {
                    let domain_packet = cursor.packet.domain_packet.as_ref().ok_or_else(|| {
                        ReaderError::invalid_descriptor("data packet has no domain packet")
                    })?;
                    let domain_segment =
                        SourceSegment::new(domain_packet, cursor.position, n, ReadMode::Unscaled);
                    domain_sink.write(read, &domain_segment)?;
                }
                if status.offset.is_none() {
                    status.offset = cursor
                        .packet
                        .domain_packet
                        .as_ref()
                        .map(|d| SourceSegment::new(d, cursor.position, 1, ReadMode::Unscaled))
                        .and_then(|s| s.scalars().ok())
                        .and_then(|v| v.first().copied());
                }
                cursor.position += n;
                read += n;
                continue;
            }

            self.current = None;
            match self.pull() {
                Pulled::Empty => break,
                Pulled::Event(event) => {
                    if !self.valid {
                        status = ReaderStatus::event(event);
                        break;
                    }
                    if self.options.skip_events {
                        continue;
                    }
                    status.read_status = super::ReadStatus::Event;
                    status.event_packet = Some(event);
                    break;
                }
                Pulled::Data(packet) => {
                    if !self.valid {
                        // Leave the packet unread; the reader cannot decode it.
                        self.current = Some(PacketCursor { packet, position: 0 });
                        break;
                    }
                    self.current = Some(PacketCursor { packet, position: 0 });
                }
            }
        }

        status.timed_out = read < count && status.read_status == super::ReadStatus::Ok;
        trace!(requested = count, read, status = ?status.read_status, "read");
        Ok(ReadOutcome::new(read, self.finish(status)))
    }

    /// Drop data up to the next event without consuming the event.
    pub(crate) fn discard_until_event(&mut self) -> usize {
        let mut dropped = self.current.take().map_or(0, |c| c.remaining());
        let Some(queue) = self.queue.clone() else { return dropped };
        while let Some(Packet::Data(_)) = queue.peek() {
            if let Pulled::Data(packet) = self.pull() {
                dropped += packet.sample_count;
            }
        }
        dropped
    }
}

/// Element-wise decode check mirroring what the codec rejects per packet.
fn decodable_as(descriptor: &DataDescriptor, read_type: SampleType, mode: ReadMode) -> Result<()> {
    let raw_type = descriptor.raw_sample_type();
    let element_wise = read_type != SampleType::Undefined && read_type != SampleType::Struct;
    let verbatim = mode == ReadMode::RawValue && descriptor.rule.is_explicit();
    if element_wise && verbatim && raw_type != read_type {
        return Err(ReaderError::TypeMismatch { expected: raw_type, actual: read_type });
    }
    Ok(())
}

/// Whether samples described by `descriptor` can be written as `read_type`.
fn readable_as(descriptor: &DataDescriptor, read_type: SampleType, mode: ReadMode) -> bool {
    let stored = match mode {
        ReadMode::Scaled => descriptor.sample_type,
        ReadMode::Unscaled | ReadMode::RawValue => descriptor.raw_sample_type(),
    };
    match read_type {
        SampleType::Undefined => stored != SampleType::Invalid,
        SampleType::Struct => descriptor.rule.is_explicit() && stored != SampleType::Invalid,
        _ if mode == ReadMode::RawValue => stored == read_type,
        _ => stored.is_convertible() && descriptor.is_scalar(),
    }
}
