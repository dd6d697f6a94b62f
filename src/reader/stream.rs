//! Sequential reader: samples in arrival order, stopping at events

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::cursor::{ReaderCore, ReaderOptions};
use super::{ReadOutcome, ReaderStatus, SampleRead};
use crate::codec::SampleSink;
use crate::config::{ReaderConfig, ReaderKind};
use crate::connection::ReaderSource;
use crate::types::{DataDescriptor, ReadMode, SampleType};
use crate::{ReaderError, Result};

/// Reads a signal's samples exactly once, in the order they were sent.
///
/// A read returns fewer samples than requested when it reaches an event packet
/// (status [`Event`](super::ReadStatus::Event)) or when the timeout passes.
#[derive(Debug)]
pub struct StreamReader {
    core: ReaderCore,
}

impl StreamReader {
    pub fn builder(source: impl Into<ReaderSource>) -> StreamReaderBuilder {
        StreamReaderBuilder { source: source.into(), options: ReaderOptions::default() }
    }

    /// Build a stream reader from a configuration; the kind must be `Stream`.
    pub fn from_config(source: impl Into<ReaderSource>, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        if config.kind != ReaderKind::Stream {
            return Err(ReaderError::invalid_parameter(
                "kind",
                format!("expected a stream reader configuration, got {:?}", config.kind),
            ));
        }
        StreamReaderBuilder { source: source.into(), options: config.options() }.build()
    }

    /// Continue reading the queue of `existing` with new options.
    ///
    /// This is how an invalidated reader is acknowledged: queued packets and the
    /// read position carry over. If the current descriptor is still unreadable, the
    /// reader drops data until a readable descriptor arrives.
    pub fn from_existing(existing: StreamReader, options: ReaderOptions) -> Result<Self> {
        Ok(StreamReader { core: existing.core.reconfigure(options)? })
    }

    /// Whether a zero-count read would surface an event.
    pub fn has_pending_event(&mut self) -> bool {
        let summary = self.core.summary();
        summary.samples_before_event == 0 && summary.event_pending
    }
}

impl SampleRead for StreamReader {
    type Status = ReaderStatus;

    fn read_into(
        &mut self,
        values: &mut dyn SampleSink,
        domain: Option<&mut dyn SampleSink>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.core.read(values, domain, count, timeout)
    }

    fn available_count(&mut self) -> usize {
        let summary = self.core.summary();
        if self.core.options().skip_events {
            summary.total_samples
        } else {
            summary.samples_before_event
        }
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

/// Builder for [`StreamReader`].
#[derive(Debug)]
pub struct StreamReaderBuilder {
    source: ReaderSource,
    options: ReaderOptions,
}

impl StreamReaderBuilder {
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

    pub fn build(self) -> Result<StreamReader> {
        let core = ReaderCore::new(self.source, self.options)?;
        info!(
            source = %core.source().id(),
            value_read_type = ?self.options.value_read_type,
            domain_read_type = ?self.options.domain_read_type,
            "stream reader created"
        );
        Ok(StreamReader { core })
    }
}
