//! Tail reader: the most recent samples of a bounded history

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::cursor::{Pulled, ReaderCore, ReaderOptions};
use super::{ReadOutcome, ReaderStatus, SampleRead, TailReaderStatus};
use crate::codec::{SampleSink, SourceSegment};
use crate::config::{ReaderConfig, ReaderKind};
use crate::connection::ReaderSource;
use crate::types::{DataDescriptor, DataPacket, EventPacket, ReadMode, SampleType};
use crate::{ReaderError, Result};

#[derive(Debug, Clone)]
struct HistorySegment {
    packet: Arc<DataPacket>,
    start: usize,
    count: usize,
}

/// Keeps the last `history_size` samples and returns the newest of them on each read.
///
/// Reads do not consume history, so consecutive reads without new data return the
/// same samples. A value descriptor change clears the history.
#[derive(Debug)]
pub struct TailReader {
    core: ReaderCore,
    history_size: usize,
    history: VecDeque<HistorySegment>,
    held: usize,
    filled: bool,
}

impl TailReader {
    pub fn builder(source: impl Into<ReaderSource>, history_size: usize) -> TailReaderBuilder {
        TailReaderBuilder { source: source.into(), history_size, options: ReaderOptions::default() }
    }

    /// Build a tail reader from a configuration; the kind must be `Tail`.
    pub fn from_config(source: impl Into<ReaderSource>, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let ReaderKind::Tail { history_size } = config.kind else {
            return Err(ReaderError::invalid_parameter(
                "kind",
                format!("expected a tail reader configuration, got {:?}", config.kind),
            ));
        };
        TailReaderBuilder { source: source.into(), history_size, options: config.options() }
            .build()
    }

    /// Continue reading the queue of `existing` with new options, keeping its history.
    ///
    /// See [`StreamReader::from_existing`](super::StreamReader::from_existing).
    pub fn from_existing(existing: TailReader, options: ReaderOptions) -> Result<Self> {
        let TailReader { core, history_size, history, held, filled } = existing;
        Ok(TailReader { core: core.reconfigure(options)?, history_size, history, held, filled })
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// The history has been completely filled since it was last cleared.
    pub fn sufficient_history(&self) -> bool {
        self.filled
    }

    fn push(&mut self, packet: Arc<DataPacket>) {
        let count = packet.sample_count;
        if count == 0 {
            return;
        }
        self.history.push_back(HistorySegment { packet, start: 0, count });
        self.held += count;
        while self.held > self.history_size {
            let excess = self.held - self.history_size;
            let Some(front) = self.history.front_mut() else { break };
            if front.count <= excess {
                self.held -= front.count;
                self.history.pop_front();
            } else {
                front.start += excess;
                front.count -= excess;
                self.held -= excess;
            }
        }
        if self.held >= self.history_size {
            self.filled = true;
        }
    }

    fn clear(&mut self) {
        debug!(source = %self.core.source().id(), dropped = self.held, "tail history cleared");
        self.history.clear();
        self.held = 0;
        self.filled = false;
    }

    /// Move queued data into the history, stopping at the first surfaced event.
    fn ingest(&mut self) -> Option<Arc<EventPacket>> {
        loop {
            match self.core.pull() {
                Pulled::Empty => return None,
                Pulled::Data(packet) => self.push(packet),
                Pulled::Event(event) => {
                    if event.value_descriptor().is_some() {
                        self.clear();
                    }
                    if !self.core.options().skip_events || !self.core.is_valid() {
                        return Some(event);
                    }
                }
            }
        }
    }

    fn status(&self, status: ReaderStatus) -> TailReaderStatus {
        TailReaderStatus { status, sufficient_history: self.filled }
    }

    /// Write the newest `count` samples of the history into the sinks.
    fn copy_newest(
        &self,
        values: &mut dyn SampleSink,
        mut domain: Option<&mut dyn SampleSink>,
        count: usize,
        status: &mut ReaderStatus,
    ) -> Result<()> {
        let mut skip = self.held - count;
        let mut written = 0;
        let mode = self.core.options().read_mode;
        for segment in &self.history {
            if skip >= segment.count {
                skip -= segment.count;
                continue;
            }
            let start = segment.start + skip;
            let n = segment.count - skip;
            skip = 0;
            values.write(written, &SourceSegment::new(&segment.packet, start, n, mode))?;
            let domain_packet = segment.packet.domain_packet.as_ref();
            if let Some(sink) = domain.as_deref_mut() {
                let domain_packet = domain_packet.ok_or_else(|| {
                    ReaderError::invalid_descriptor("data packet has no domain packet")
                })?;
                let domain_segment =
                    SourceSegment::new(domain_packet, start, n, ReadMode::Unscaled);
                sink.write(written, &domain_segment)?;
            }
            if written == 0 {
                status.offset = domain_packet
                    .map(|d| SourceSegment::new(d, start, 1, ReadMode::Unscaled))
                    .and_then(|s| s.scalars().ok())
                    .and_then(|v| v.first().copied());
            }
            written += n;
        }
        Ok(())
    }
}

impl SampleRead for TailReader {
    type Status = TailReaderStatus;

    fn read_into(
        &mut self,
        values: &mut dyn SampleSink,
        domain: Option<&mut dyn SampleSink>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<TailReaderStatus>> {
        self.core.check_sinks(values, domain.as_deref())?;
        if let Some(status) = self.core.resume() {
            if status.is_event() {
                self.clear();
            }
            return Ok(ReadOutcome::new(0, self.status(status)));
        }
        if let Some(packet) = self.core.take_held_packet() {
            // restored by a data packet with a new descriptor
            self.clear();
            self.push(packet);
        }
        if count > self.history_size {
            return Err(ReaderError::invalid_parameter(
                "count",
                format!("{count} exceeds the history size of {}", self.history_size),
            ));
        }
        if values.capacity() < count {
            return Err(ReaderError::buffer_too_small(
                "tail value buffer",
                count,
                values.capacity(),
            ));
        }
        if let Some(domain) = domain.as_deref() {
            if domain.capacity() < count {
                return Err(ReaderError::buffer_too_small(
                    "tail domain buffer",
                    count,
                    domain.capacity(),
                ));
            }
        }

        if !timeout.is_zero() && count > 0 {
            let held = self.held;
            self.core.wait(Instant::now() + timeout, |s| {
                held + s.samples_before_event >= count || s.event_pending
            });
        }

        let mut status = match self.ingest() {
            Some(event) => {
                let mut status = ReaderStatus::event(event);
                status.valid = self.core.is_valid();
                status
            }
            None if !self.core.is_valid() => ReaderStatus::fail(),
            None => ReaderStatus::ok(),
        };
        if !status.valid {
            return Ok(ReadOutcome::new(0, self.status(status)));
        }

        let n = count.min(self.held);
        if n > 0 {
            self.copy_newest(values, domain, n, &mut status)?;
        }
        status.timed_out = n < count && status.is_ok();
        Ok(ReadOutcome::new(n, self.status(status)))
    }

    fn available_count(&mut self) -> usize {
        (self.held + self.core.summary().samples_before_event).min(self.history_size)
    }

    fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.core.value_descriptor().cloned()
    }

    fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.core.domain_descriptor().cloned()
    }

    fn options(&self) -> &ReaderOptions {
        self.core.options()
    }

    fn is_valid(&self) -> bool {
        self.core.is_valid()
    }
}

/// Builder for [`TailReader`].
#[derive(Debug)]
pub struct TailReaderBuilder {
    source: ReaderSource,
    history_size: usize,
    options: ReaderOptions,
}

impl TailReaderBuilder {
    pub fn value_read_type(mut self, sample_type: SampleType) -> Self {
        self.options.value_read_type = sample_type;
        self
    }

    pub fn domain_read_type(mut self, sample_type: SampleType) -> Self {
        self.options.domain_read_type = sample_type;
        self
    }

    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.options.read_mode = mode;
        self
    }

    pub fn skip_events(mut self, skip: bool) -> Self {
        self.options.skip_events = skip;
        self
    }

    pub fn build(self) -> Result<TailReader> {
        if self.history_size < 1 {
            return Err(ReaderError::invalid_parameter("history_size", "must be at least 1"));
        }
        let core = ReaderCore::new(self.source, self.options)?;
        info!(
            source = %core.source().id(),
            history_size = self.history_size,
            value_read_type = ?self.options.value_read_type,
            "tail reader created"
        );
        Ok(TailReader {
            core,
            history_size: self.history_size,
            history: VecDeque::new(),
            held: 0,
            filled: false,
        })
    }
}
