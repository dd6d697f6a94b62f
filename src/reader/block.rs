//! Block reader: samples released only in whole blocks

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::cursor::{ReaderCore, ReaderOptions};
use super::{BufferLayout, ReadOutcome, ReadStatus, ReaderStatus, SampleRead};
use crate::codec::SampleSink;
use crate::config::{ReaderConfig, ReaderKind};
use crate::connection::ReaderSource;
use crate::types::{DataDescriptor, ReadMode, SampleType};
use crate::{ReaderError, Result};

/// Reads a signal in blocks of `block_size` consecutive samples.
///
/// `count` arguments and returned counts are in blocks; buffers are laid out as
/// `[blocks, block_size]`. A block never straddles an event: samples left over
/// before an event that cannot fill a block are dropped when the event is reached.
#[derive(Debug)]
pub struct BlockReader {
    core: ReaderCore,
    block_size: usize,
}

impl BlockReader {
    pub fn builder(source: impl Into<ReaderSource>, block_size: usize) -> BlockReaderBuilder {
        BlockReaderBuilder { source: source.into(), block_size, options: ReaderOptions::default() }
    }

    /// Build a block reader from a configuration; the kind must be `Block`.
    pub fn from_config(source: impl Into<ReaderSource>, config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let ReaderKind::Block { block_size } = config.kind else {
            return Err(ReaderError::invalid_parameter(
                "kind",
                format!("expected a block reader configuration, got {:?}", config.kind),
            ));
        };
        BlockReaderBuilder { source: source.into(), block_size, options: config.options() }.build()
    }

    /// Continue reading the queue of `existing` with new options and the same block size.
    ///
    /// See [`StreamReader::from_existing`](super::StreamReader::from_existing).
    pub fn from_existing(existing: BlockReader, options: ReaderOptions) -> Result<Self> {
        let block_size = existing.block_size;
        Ok(BlockReader { core: existing.core.reconfigure(options)?, block_size })
    }

    /// Buffer layout of a read of `blocks` blocks.
    pub fn layout(&self, blocks: usize) -> BufferLayout {
        BufferLayout::block(blocks, self.block_size)
    }

    fn available_samples(&mut self) -> usize {
        let summary = self.core.summary();
        if self.core.options().skip_events {
            summary.total_samples
        } else {
            summary.samples_before_event
        }
    }

    /// Drop a partial block in front of an event and take the event.
    fn take_event_after_partial_block(&mut self, status: &mut ReaderStatus) {
        let summary = self.core.summary();
        if !summary.event_pending || summary.samples_before_event >= self.block_size {
            return;
        }
        let dropped = self.core.discard_until_event();
        if dropped > 0 {
            warn!(
                source = %self.core.source().id(),
                dropped,
                block_size = self.block_size,
                "dropping incomplete block before event"
            );
        }
        let probe = self.core.probe();
        if probe.is_event() {
            status.read_status = ReadStatus::Event;
            status.event_packet = probe.event_packet;
        }
        status.valid = probe.valid;
    }
}

impl SampleRead for BlockReader {
    type Status = ReaderStatus;

    fn read_into(
        &mut self,
        values: &mut dyn SampleSink,
        domain: Option<&mut dyn SampleSink>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.core.check_sinks(values, domain.as_deref())?;
        if let Some(status) = self.core.resume() {
            return Ok(ReadOutcome::new(0, status));
        }
        if count == 0 {
            return self.core.read(values, domain, 0, timeout);
        }
        let layout = self.layout(count);
        layout.check("block value buffer", values.capacity())?;
        if let Some(domain) = domain.as_deref() {
            layout.check("block domain buffer", domain.capacity())?;
        }

        let required = layout.len();
        if !timeout.is_zero() {
            let skip_events = self.core.options().skip_events;
            self.core.wait(Instant::now() + timeout, |s| {
                if skip_events {
                    s.total_samples >= required
                } else {
                    s.samples_before_event >= required || s.event_pending
                }
            });
        }

        let blocks = (self.available_samples() / self.block_size).min(count);
        let mut outcome = if blocks > 0 {
            self.core.read(values, domain, blocks * self.block_size, Duration::ZERO)?
        } else {
            ReadOutcome::new(0, ReaderStatus::ok())
        };
        if !outcome.status.is_ok() {
            outcome.count /= self.block_size;
            return Ok(outcome);
        }

        if blocks < count && !self.core.options().skip_events {
            self.take_event_after_partial_block(&mut outcome.status);
        }
        outcome.count /= self.block_size;
        outcome.status.timed_out = outcome.count < count && outcome.status.is_ok();
        Ok(outcome)
    }

    fn available_count(&mut self) -> usize {
        self.available_samples() / self.block_size
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

    fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Builder for [`BlockReader`].
#[derive(Debug)]
pub struct BlockReaderBuilder {
    source: ReaderSource,
    block_size: usize,
    options: ReaderOptions,
}

impl BlockReaderBuilder {
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

    pub fn build(self) -> Result<BlockReader> {
        if self.block_size < 1 {
            return Err(ReaderError::invalid_parameter("block_size", "must be at least 1"));
        }
        let core = ReaderCore::new(self.source, self.options)?;
        info!(
            source = %core.source().id(),
            block_size = self.block_size,
            value_read_type = ?self.options.value_read_type,
            "block reader created"
        );
        Ok(BlockReader { core, block_size: self.block_size })
    }
}
