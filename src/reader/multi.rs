//! Multi-signal reader aligning independently clocked signals on one domain

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::cursor::{ReaderCore, ReaderOptions};
use super::{
    BufferLayout, DomainResolver, MultiReaderStatus, ReadOutcome, ReadStatus, ReaderStatus,
    TimeSink,
};
use crate::codec::{DiscardSink, SampleSink, SourceSegment, TypedSink};
use crate::config::MultiReaderConfig;
use crate::connection::ReaderSource;
use crate::types::{
    DataDescriptor, EventPacket, Ratio, ReadMode, Sample, SampleType, Scalar, TimeoutType,
};
use crate::{ReaderError, Result};

/// Attempts at converging the start instants before alignment is accepted as inexact.
const MAX_ALIGN_ROUNDS: usize = 32;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Debug)]
struct SignalCursor {
    id: String,
    core: ReaderCore,
    resolver: DomainResolver,
}

/// Rates and shared time base derived from the domain descriptors.
#[derive(Debug, Clone)]
struct Alignment {
    common_rate: Ratio,
    dividers: Vec<usize>,
    decimation: Vec<usize>,
    rates: Vec<Ratio>,
    origin: DateTime<Utc>,
    resolution: Ratio,
    /// Seconds from the shared origin to each signal's epoch
    epoch_offsets: Vec<Ratio>,
    resolutions: Vec<Ratio>,
}

impl Alignment {
    /// Seconds since the shared origin of a raw domain value of signal `index`.
    fn seconds(&self, index: usize, raw: Scalar) -> Result<Ratio> {
        scalar_ratio(raw)
            .checked_mul(&self.resolutions[index])
            .and_then(|t| t.checked_add(&self.epoch_offsets[index]))
            .ok_or_else(|| {
                ReaderError::incompatible_domains("domain value overflows the shared time base")
            })
    }

    /// Shared-resolution ticks of a raw domain value of signal `index`.
    fn shared_ticks(&self, index: usize, raw: Scalar) -> Result<Scalar> {
        if let Scalar::Float(value) = raw {
            let seconds =
                value * self.resolutions[index].to_f64() + self.epoch_offsets[index].to_f64();
            return Ok(Scalar::Float(seconds / self.resolution.to_f64()));
        }
        let ticks = self
            .seconds(index, raw)?
            .checked_div(&self.resolution)
            .ok_or_else(|| ReaderError::incompatible_domains("shared tick conversion overflow"))?;
        Ok(Scalar::Int(round_half_up(ticks)))
    }
}

/// `floor(r + 1/2)`
fn round_half_up(r: Ratio) -> i64 {
    let den = r.denominator() as i128;
    (2 * r.numerator() as i128 + den).div_euclid(2 * den) as i64
}

fn scalar_ratio(raw: Scalar) -> Ratio {
    match raw {
        Scalar::Int(v) => Ratio::from_integer(v),
        Scalar::UInt(v) => Ratio::from_integer(i64::try_from(v).unwrap_or(i64::MAX)),
        Scalar::Float(v) => {
            Ratio::new((v * NANOS_PER_SECOND as f64).round() as i64, NANOS_PER_SECOND)
                .unwrap_or(Ratio::ZERO)
        }
    }
}

fn nanos_ratio(nanos: i64) -> Ratio {
    Ratio::new(nanos, NANOS_PER_SECOND).unwrap_or(Ratio::ZERO)
}

enum AlignState {
    Aligned,
    /// Signal `index` must receive more data first
    NeedData { index: usize },
    EventPending,
}

/// What a read may transfer once alignment and waiting are done.
enum Prepared {
    Done(ReadOutcome<MultiReaderStatus>),
    Ready { samples: usize, offset: Option<Scalar> },
}

/// Reads several signals as one synchronised, channel-major block.
///
/// Every read returns the same number of samples for each signal. Sample `k` of
/// every signal corresponds to the same instant of the shared domain. Signals faster
/// than the slowest one are decimated so all signals advance at the greatest common
/// rate. Output buffers are laid out `[signals, count]`.
#[derive(Debug)]
pub struct MultiReader {
    signals: Vec<SignalCursor>,
    options: ReaderOptions,
    timeout_type: TimeoutType,
    required_rate: Option<Ratio>,
    start_on_full_unit: bool,
    active: bool,
    alignment: Option<Alignment>,
    started: bool,
    aligned: bool,
    exact: bool,
}

impl MultiReader {
    pub fn builder<I, S>(sources: I) -> MultiReaderBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<ReaderSource>,
    {
        MultiReaderBuilder {
            sources: sources.into_iter().map(Into::into).collect(),
            config: MultiReaderConfig::default(),
        }
    }

    pub fn from_config<I, S>(sources: I, config: &MultiReaderConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<ReaderSource>,
    {
        MultiReaderBuilder {
            sources: sources.into_iter().map(Into::into).collect(),
            config: config.clone(),
        }
        .build()
    }

    /// Continue the signals of `existing` under `config`, keeping queues and positions.
    ///
    /// This acknowledges an invalidation. Signals whose descriptors are still
    /// unreadable drop data until a readable descriptor arrives; the restoring event
    /// is reported once and the start is aligned again.
    pub fn from_existing(existing: MultiReader, config: &MultiReaderConfig) -> Result<Self> {
        config.validate()?;
        let options = config.options();
        let active = existing.active;
        let signals = existing
            .signals
            .into_iter()
            .map(|SignalCursor { id, core, resolver }| {
                Ok(SignalCursor { id, core: core.reconfigure(options)?, resolver })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut reader = MultiReader::assemble(signals, config)?;
        reader.active = active;
        Ok(reader)
    }

    fn assemble(signals: Vec<SignalCursor>, config: &MultiReaderConfig) -> Result<Self> {
        let mut reader = MultiReader {
            signals,
            options: config.options(),
            timeout_type: config.timeout_type,
            required_rate: config.required_common_sample_rate,
            start_on_full_unit: config.start_on_full_unit_of_domain,
            active: true,
            alignment: None,
            started: false,
            aligned: false,
            exact: false,
        };
        reader.refresh_alignment()?;
        info!(
            signals = reader.signals.len(),
            common_rate = ?reader.common_sample_rate().map(|r| r.to_string()),
            value_read_type = ?reader.options.value_read_type,
            domain_read_type = ?reader.options.domain_read_type,
            "multi reader created"
        );
        Ok(reader)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Identifiers used as keys of [`MultiReaderStatus::event_packets`].
    pub fn signal_ids(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.id.clone()).collect()
    }

    pub fn layout(&self, count: usize) -> BufferLayout {
        BufferLayout::channel_major(self.signals.len(), count)
    }

    pub fn set_active(&mut self, active: bool) {
        debug!(active, "multi reader activity changed");
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// False once a descriptor change made a signal unreadable with the configured types.
    pub fn is_valid(&self) -> bool {
        self.signals.iter().all(|s| s.core.is_valid())
    }

    /// Every signal's rate is known and divides the common rate.
    pub fn is_synchronized(&self) -> bool {
        self.alignment.is_some()
    }

    /// The first samples of the current run share one instant exactly.
    ///
    /// False before the start is aligned, and after alignment settled on sample
    /// grids that never coincide.
    pub fn is_start_aligned(&self) -> bool {
        self.aligned && self.exact
    }

    pub fn common_sample_rate(&self) -> Option<Ratio> {
        self.alignment.as_ref().map(|a| a.common_rate)
    }

    /// `common_sample_rate / native_rate` per signal.
    pub fn sample_rate_dividers(&self) -> Option<Vec<usize>> {
        self.alignment.as_ref().map(|a| a.dividers.clone())
    }

    /// Native samples consumed per returned sample, per signal.
    pub fn decimation_factors(&self) -> Option<Vec<usize>> {
        self.alignment.as_ref().map(|a| a.decimation.clone())
    }

    /// Native sample rate per signal.
    pub fn sample_rates(&self) -> Option<Vec<Ratio>> {
        self.alignment.as_ref().map(|a| a.rates.clone())
    }

    /// Earliest origin among the signals' domains.
    pub fn origin(&self) -> Option<DateTime<Utc>> {
        self.alignment.as_ref().map(|a| a.origin)
    }

    /// Finest tick resolution among the signals' domains; domain output uses it.
    pub fn tick_resolution(&self) -> Option<Ratio> {
        self.alignment.as_ref().map(|a| a.resolution)
    }

    pub fn value_descriptors(&self) -> Vec<Option<Arc<DataDescriptor>>> {
        self.signals.iter().map(|s| s.core.value_descriptor().cloned()).collect()
    }

    pub fn domain_descriptors(&self) -> Vec<Option<Arc<DataDescriptor>>> {
        self.signals.iter().map(|s| s.core.domain_descriptor().cloned()).collect()
    }

    /// Aligned samples every signal can deliver without blocking.
    pub fn available_count(&mut self) -> usize {
        let Some(decimation) = self.alignment.as_ref().map(|a| a.decimation.clone()) else {
            return 0;
        };
        self.signals
            .iter_mut()
            .zip(decimation)
            .map(|(signal, d)| signal.core.summary().samples_before_event / d)
            .min()
            .unwrap_or(0)
    }

    /// Recompute rates and the shared time base from the current domain descriptors.
    ///
    /// Returns `false` while a signal has not announced a domain descriptor.
    fn refresh_alignment(&mut self) -> Result<bool> {
        if self.alignment.is_some() {
            return Ok(true);
        }
        let mut domains = Vec::with_capacity(self.signals.len());
        for signal in &self.signals {
            match signal.core.domain_descriptor() {
                Some(domain) => domains.push(domain.clone()),
                None => return Ok(false),
            }
        }

        let unit_of =
            |d: &DataDescriptor| d.unit.as_ref().map(|u| (u.symbol.clone(), u.quantity.clone()));
        let reference_unit = unit_of(&domains[0]);
        for (signal, domain) in self.signals.iter().zip(&domains).skip(1) {
            if unit_of(domain) != reference_unit {
                return Err(ReaderError::incompatible_domains(format!(
                    "domain unit of '{}' is {:?}, expected {:?}",
                    signal.id,
                    unit_of(domain),
                    reference_unit
                )));
            }
        }

        let mut rates = Vec::with_capacity(domains.len());
        let mut epochs = Vec::with_capacity(domains.len());
        let mut resolutions = Vec::with_capacity(domains.len());
        for (signal, domain) in self.signals.iter().zip(&domains) {
            let rate = domain.sample_rate().map_err(|e| {
                ReaderError::incompatible_rates(format!("signal '{}': {e}", signal.id))
            })?;
            let resolution = domain.tick_resolution.ok_or_else(|| {
                ReaderError::invalid_descriptor(format!(
                    "domain of '{}' has no tick resolution",
                    signal.id
                ))
            })?;
            rates.push(rate);
            resolutions.push(resolution);
            epochs.push(super::parse_origin(domain.origin.as_deref().unwrap_or_default())?);
        }

        let overflow = || ReaderError::incompatible_rates("sample rate arithmetic overflow");
        let common_rate = match self.required_rate {
            Some(rate) => rate,
            None => rates[1..]
                .iter()
                .try_fold(rates[0], |acc, r| acc.lcm(r))
                .ok_or_else(overflow)?,
        };
        let output_rate = rates[1..]
            .iter()
            .try_fold(rates[0], |acc, r| acc.gcd(r))
            .ok_or_else(overflow)?;

        let mut dividers = Vec::with_capacity(rates.len());
        let mut decimation = Vec::with_capacity(rates.len());
        for (signal, rate) in self.signals.iter().zip(&rates) {
            if !rate.divides(&common_rate) {
                warn!(
                    signal = %signal.id,
                    rate = %rate,
                    common = %common_rate,
                    "sample rate does not divide the common rate"
                );
                return Err(ReaderError::incompatible_rates(format!(
                    "rate {rate} of '{}' does not divide the common rate {common_rate}",
                    signal.id
                )));
            }
            dividers.push(whole(common_rate.checked_div(rate)).ok_or_else(overflow)?);
            decimation.push(whole(rate.checked_div(&output_rate)).ok_or_else(overflow)?);
        }

        let origin = epochs.iter().min().copied().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let resolution = resolutions.iter().min().copied().unwrap_or(Ratio::ONE);
        let epoch_offsets = epochs
            .iter()
            .map(|epoch| {
                (*epoch - origin).num_nanoseconds().map(nanos_ratio).ok_or_else(|| {
                    ReaderError::incompatible_domains("domain origins are too far apart")
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            common_rate = %common_rate,
            output_rate = %output_rate,
            ?dividers,
            ?decimation,
            origin = %origin,
            resolution = %resolution,
            "multi reader rates computed"
        );
        self.alignment = Some(Alignment {
            common_rate,
            dividers,
            decimation,
            rates,
            origin,
            resolution,
            epoch_offsets,
            resolutions,
        });
        Ok(true)
    }

    fn invalidate_alignment(&mut self) {
        self.alignment = None;
        self.aligned = false;
    }

    /// Native samples per aligned sample, per signal; one each until rates are known.
    fn decimation(&self) -> Vec<usize> {
        match &self.alignment {
            Some(a) => a.decimation.clone(),
            None => vec![1; self.signals.len()],
        }
    }

    /// Consume descriptor events in front of signals that still lack a domain descriptor.
    fn absorb_initial_descriptors(&mut self) -> bool {
        let mut absorbed = false;
        for signal in &mut self.signals {
            if signal.core.domain_descriptor().is_none() {
                absorbed |= signal.core.absorb_initial_events();
            }
        }
        absorbed
    }

    /// Advance signals until their next samples fall on the same instant.
    fn align_start(&mut self) -> Result<AlignState> {
        let Some(alignment) = self.alignment.clone() else {
            return Ok(AlignState::NeedData { index: 0 });
        };
        for _ in 0..MAX_ALIGN_ROUNDS {
            let mut times = Vec::with_capacity(self.signals.len());
            for (index, signal) in self.signals.iter_mut().enumerate() {
                let summary = signal.core.summary();
                if summary.samples_before_event == 0 && summary.event_pending {
                    return Ok(AlignState::EventPending);
                }
                match signal.core.next_domain_value()? {
                    Some((raw, _)) => times.push(alignment.seconds(index, raw)?),
                    None => return Ok(AlignState::NeedData { index }),
                }
            }

            let mut start = times.iter().max().copied().unwrap_or(Ratio::ZERO);
            if self.start_on_full_unit && !self.started {
                start = next_full_unit(start, alignment.origin)?;
            }

            let mut all_aligned = true;
            for (index, signal) in self.signals.iter_mut().enumerate() {
                let lag = start
                    .checked_sub(&times[index])
                    .and_then(|lag| lag.checked_mul(&alignment.rates[index]))
                    .ok_or_else(|| {
                        ReaderError::incompatible_domains("alignment arithmetic overflow")
                    })?;
                let skip = usize::try_from(lag.ceil()).unwrap_or(0);
                if skip == 0 {
                    continue;
                }
                all_aligned = false;
                let available = signal.core.summary().samples_before_event;
                let take = skip.min(available);
                if take > 0 {
                    signal.core.read(&mut DiscardSink, None, take, Duration::ZERO)?;
                    trace!(signal = %signal.id, skipped = take, "skipping samples to align start");
                }
                if take < skip {
                    return Ok(AlignState::NeedData { index });
                }
            }
            if all_aligned {
                self.aligned = true;
                self.exact = true;
                self.started = true;
                return Ok(AlignState::Aligned);
            }
        }
        warn!(
            rounds = MAX_ALIGN_ROUNDS,
            "signal sample grids do not coincide; aligning approximately"
        );
        self.aligned = true;
        self.exact = false;
        self.started = true;
        Ok(AlignState::Aligned)
    }

    /// Take the event in front of signal `index` if fewer than one output sample precede it.
    fn take_event(&mut self, index: usize, decimation: usize) -> Option<(Arc<EventPacket>, bool)> {
        let signal = &mut self.signals[index];
        let summary = signal.core.summary();
        if !summary.event_pending || summary.samples_before_event >= decimation {
            return None;
        }
        let dropped = signal.core.discard_until_event();
        if dropped > 0 {
            warn!(
                signal = %signal.id,
                dropped,
                "dropping samples that cannot form an aligned sample before event"
            );
        }
        let next = signal.core.probe();
        next.event_packet.map(|event| (event, next.valid))
    }

    fn collect_events(&mut self, status: &mut MultiReaderStatus) {
        for (index, d) in self.decimation().into_iter().enumerate() {
            if let Some((event, valid)) = self.take_event(index, d) {
                self.record_event(status, index, event, valid);
            }
        }
    }

    fn record_event(
        &mut self,
        status: &mut MultiReaderStatus,
        index: usize,
        event: Arc<EventPacket>,
        valid: bool,
    ) {
        if event.is_descriptor_change() {
            self.invalidate_alignment();
        }
        self.aligned = false;
        status.status.read_status = ReadStatus::Event;
        status.status.valid &= valid;
        if status.status.event_packet.is_none() {
            status.status.event_packet = Some(event.clone());
        }
        status.event_packets.insert(self.signals[index].id.clone(), event);
    }

    /// Discard data on every signal; only events are reported.
    fn drain(&mut self) -> MultiReaderStatus {
        let mut status = MultiReaderStatus { status: ReaderStatus::ok(), ..Default::default() };
        for index in 0..self.signals.len() {
            loop {
                let dropped = self.signals[index].core.discard_until_event();
                if dropped > 0 {
                    trace!(signal = %self.signals[index].id, dropped, "inactive reader drained");
                }
                let next = self.signals[index].core.probe();
                match next.event_packet {
                    Some(event) => self.record_event(&mut status, index, event, next.valid),
                    None => break,
                }
            }
        }
        status
    }

    fn check_types(&self, value: SampleType, domain: Option<SampleType>) -> Result<()> {
        let configured = self.options.value_read_type;
        if configured != SampleType::Undefined
            && value != SampleType::Undefined
            && value != configured
        {
            return Err(ReaderError::TypeMismatch { expected: configured, actual: value });
        }
        if let Some(domain) = domain {
            let configured = self.options.domain_read_type;
            if domain != SampleType::Undefined && domain != configured {
                return Err(ReaderError::TypeMismatch { expected: configured, actual: domain });
            }
        }
        Ok(())
    }

    /// Fail before consuming anything if a signal cannot deliver its share as `read_type`.
    fn check_decodable(&mut self, read_type: SampleType, samples: usize) -> Result<()> {
        let decimation = self.decimation();
        for (signal, factor) in self.signals.iter_mut().zip(decimation) {
            signal.core.check_decodable(read_type, samples * factor).inspect_err(|err| {
                debug!(signal = %signal.id, error = %err, "aligned read rejected");
            })?;
        }
        Ok(())
    }

    /// A transfer that failed part-way leaves the signals at different positions.
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            warn!(error = %err, "aligned transfer failed; the start is aligned again on next read");
            self.invalidate_alignment();
        }
        result
    }

    /// Report restoring events of reconfigured signals; false if a signal cannot be read.
    fn resume(&mut self, status: &mut MultiReaderStatus) -> bool {
        let mut usable = true;
        for index in 0..self.signals.len() {
            let Some(gate) = self.signals[index].core.resume() else { continue };
            match gate.event_packet {
                Some(event) => self.record_event(status, index, event, gate.valid),
                None => usable = false,
            }
        }
        usable
    }

    /// Align, wait and size the read; returns early for probes, events and inactivity.
    fn prepare(&mut self, count: usize, timeout: Duration) -> Result<Prepared> {
        let mut status = MultiReaderStatus { status: ReaderStatus::ok(), ..Default::default() };
        if !self.resume(&mut status) {
            status.status.read_status = ReadStatus::Fail;
            status.status.valid = false;
            return Ok(Prepared::Done(ReadOutcome::new(0, status)));
        }
        if status.status.is_event() {
            return Ok(Prepared::Done(ReadOutcome::new(0, status)));
        }
        if !self.active {
            return Ok(Prepared::Done(ReadOutcome::new(0, self.drain())));
        }

        if count == 0 {
            for index in 0..self.signals.len() {
                let next = self.signals[index].core.probe();
                if let Some(event) = next.event_packet {
                    self.record_event(&mut status, index, event, next.valid);
                }
            }
            return Ok(Prepared::Done(ReadOutcome::new(0, status)));
        }

        let deadline = Instant::now() + timeout;
        loop {
            if !self.refresh_alignment()? {
                if self.absorb_initial_descriptors() {
                    continue;
                }
                self.collect_events(&mut status);
                if status.status.is_event() {
                    return Ok(Prepared::Done(ReadOutcome::new(0, status)));
                }
                let missing =
                    self.signals.iter().position(|s| s.core.domain_descriptor().is_none());
                let arrived = match missing {
                    Some(index) if !timeout.is_zero() => {
                        self.signals[index].core.wait(deadline, |s| {
                            s.event_pending && s.samples_before_event == 0
                        })
                    }
                    _ => false,
                };
                if !arrived {
                    status.status.timed_out = true;
                    return Ok(Prepared::Done(ReadOutcome::new(0, status)));
                }
                continue;
            }
            if self.aligned {
                break;
            }
            match self.align_start()? {
                AlignState::Aligned => break,
                AlignState::EventPending => {
                    self.collect_events(&mut status);
                    return Ok(Prepared::Done(ReadOutcome::new(0, status)));
                }
                AlignState::NeedData { index } => {
                    let available = self.signals[index].core.summary().samples_before_event;
                    let arrived = !timeout.is_zero()
                        && self.signals[index].core.wait(deadline, |s| {
                            s.samples_before_event > available || s.event_pending
                        });
                    if !arrived {
                        status.status.timed_out = true;
                        return Ok(Prepared::Done(ReadOutcome::new(0, status)));
                    }
                }
            }
        }

        let decimation = self.decimation();
        if !timeout.is_zero() {
            for (signal, d) in self.signals.iter_mut().zip(&decimation) {
                let need = match self.timeout_type {
                    TimeoutType::All => count * d,
                    TimeoutType::Any => *d,
                };
                signal.core.wait(deadline, |s| s.samples_before_event >= need || s.event_pending);
                let summary = signal.core.summary();
                if summary.event_pending && summary.samples_before_event < need {
                    break;
                }
            }
        }

        let samples = self
            .signals
            .iter_mut()
            .zip(&decimation)
            .map(|(signal, d)| signal.core.summary().samples_before_event / d)
            .min()
            .unwrap_or(0)
            .min(count);

        let offset = match (&self.alignment, self.signals[0].core.next_domain_value()?) {
            (Some(alignment), Some((raw, _))) if samples > 0 => {
                Some(alignment.shared_ticks(0, raw)?)
            }
            _ => None,
        };
        Ok(Prepared::Ready { samples, offset })
    }

    /// Complete a read of `samples` aligned samples out of `count` requested.
    fn finish(
        &mut self,
        count: usize,
        samples: usize,
        offset: Option<Scalar>,
    ) -> ReadOutcome<MultiReaderStatus> {
        let mut status = MultiReaderStatus { status: ReaderStatus::ok(), ..Default::default() };
        status.status.offset = offset;
        if samples < count {
            self.collect_events(&mut status);
        }
        status.status.timed_out = samples < count && status.status.is_ok();
        trace!(
            requested = count,
            read = samples,
            status = ?status.status.read_status,
            "multi read"
        );
        ReadOutcome::new(samples, status)
    }

    pub fn read<T: Sample>(
        &mut self,
        values: &mut [T],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<MultiReaderStatus>> {
        self.check_types(T::SAMPLE_TYPE, None)?;
        self.layout(count).check("multi value buffer", values.len())?;
        let (samples, offset) = match self.prepare(count, timeout)? {
            Prepared::Done(outcome) => return Ok(outcome),
            Prepared::Ready { samples, offset } => (samples, offset),
        };
        if samples > 0 {
            self.check_decodable(T::SAMPLE_TYPE, samples)?;
            let decimation = self.decimation();
            let result = values
                .chunks_mut(count)
                .zip(self.signals.iter_mut())
                .zip(decimation)
                .try_for_each(|((chunk, signal), factor)| {
                    let mut sink = DecimatingSink::new(TypedSink::new(chunk), factor);
                    transfer(&mut signal.core, &mut sink, None, samples * factor)
                });
            self.settle(result)?;
        }
        Ok(self.finish(count, samples, offset))
    }

    /// Read values and domain values expressed in ticks of the shared resolution.
    pub fn read_with_domain<T: Sample, D: Sample>(
        &mut self,
        values: &mut [T],
        domain: &mut [D],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<MultiReaderStatus>> {
        self.check_types(T::SAMPLE_TYPE, Some(D::SAMPLE_TYPE))?;
        let layout = self.layout(count);
        layout.check("multi value buffer", values.len())?;
        layout.check("multi domain buffer", domain.len())?;
        let (samples, offset) = match self.prepare(count, timeout)? {
            Prepared::Done(outcome) => return Ok(outcome),
            Prepared::Ready { samples, offset } => (samples, offset),
        };
        if samples > 0 {
            self.check_decodable(T::SAMPLE_TYPE, samples)?;
            let alignment = self
                .alignment
                .clone()
                .ok_or_else(|| ReaderError::invalid_descriptor("multi reader lost its alignment"))?;
            let result = values
                .chunks_mut(count)
                .zip(domain.chunks_mut(count))
                .zip(self.signals.iter_mut())
                .enumerate()
                .try_for_each(|(index, ((value_chunk, domain_chunk), signal))| {
                    let factor = alignment.decimation[index];
                    let mut value_sink = DecimatingSink::new(TypedSink::new(value_chunk), factor);
                    let shared =
                        SharedDomainSink { out: domain_chunk, alignment: &alignment, index };
                    let mut domain_sink = DecimatingSink::new(shared, factor);
                    transfer(
                        &mut signal.core,
                        &mut value_sink,
                        Some(&mut domain_sink),
                        samples * factor,
                    )
                });
            self.settle(result)?;
        }
        Ok(self.finish(count, samples, offset))
    }

    /// Read values and the absolute time of each aligned sample.
    pub fn read_with_time<T: Sample>(
        &mut self,
        values: &mut [T],
        times: &mut [DateTime<Utc>],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<MultiReaderStatus>> {
        self.check_types(T::SAMPLE_TYPE, None)?;
        let layout = self.layout(count);
        layout.check("multi value buffer", values.len())?;
        layout.check("multi time buffer", times.len())?;
        let (samples, offset) = match self.prepare(count, timeout)? {
            Prepared::Done(outcome) => return Ok(outcome),
            Prepared::Ready { samples, offset } => (samples, offset),
        };
        if samples > 0 {
            self.check_decodable(T::SAMPLE_TYPE, samples)?;
            let decimation = self.decimation();
            let result = values
                .chunks_mut(count)
                .zip(times.chunks_mut(count))
                .zip(self.signals.iter_mut())
                .zip(decimation)
                .try_for_each(|(((value_chunk, time_chunk), signal), factor)| {
                    let SignalCursor { core, resolver, .. } = signal;
                    let mut value_sink = DecimatingSink::new(TypedSink::new(value_chunk), factor);
                    let mut time_sink =
                        DecimatingSink::new(TimeSink::new(resolver, time_chunk), factor);
                    transfer(core, &mut value_sink, Some(&mut time_sink), samples * factor)
                });
            self.settle(result)?;
        }
        Ok(self.finish(count, samples, offset))
    }

    /// Advance every signal by `count` aligned samples without materialising them.
    pub fn skip_samples(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<MultiReaderStatus>> {
        let (samples, offset) = match self.prepare(count, timeout)? {
            Prepared::Done(outcome) => return Ok(outcome),
            Prepared::Ready { samples, offset } => (samples, offset),
        };
        if samples > 0 {
            let decimation = self.decimation();
            let result = self.signals.iter_mut().zip(decimation).try_for_each(|(signal, factor)| {
                transfer(&mut signal.core, &mut DiscardSink, None, samples * factor)
            });
            self.settle(result)?;
        }
        Ok(self.finish(count, samples, offset))
    }
}

fn whole(ratio: Option<Ratio>) -> Option<usize> {
    ratio.filter(Ratio::is_integer).and_then(|r| usize::try_from(r.numerator()).ok())
}

/// Smallest whole unit of absolute time at or after `start` seconds past `origin`.
fn next_full_unit(start: Ratio, origin: DateTime<Utc>) -> Result<Ratio> {
    let fraction = nanos_ratio(i64::from(origin.timestamp_subsec_nanos()));
    start
        .checked_add(&fraction)
        .map(|absolute| Ratio::from_integer(absolute.ceil()))
        .and_then(|unit| unit.checked_sub(&fraction))
        .ok_or_else(|| ReaderError::incompatible_domains("start instant overflow"))
}

fn transfer(
    core: &mut ReaderCore,
    values: &mut dyn SampleSink,
    domain: Option<&mut dyn SampleSink>,
    samples: usize,
) -> Result<()> {
    let outcome = core.read(values, domain, samples, Duration::ZERO)?;
    if outcome.count != samples {
        return Err(ReaderError::invalid_descriptor(format!(
            "aligned read expected {samples} queued samples, found {}",
            outcome.count
        )));
    }
    Ok(())
}

/// Keeps every `factor`-th sample, starting with the first one.
struct DecimatingSink<S> {
    inner: S,
    factor: usize,
}

impl<S: SampleSink> DecimatingSink<S> {
    fn new(inner: S, factor: usize) -> Self {
        DecimatingSink { inner, factor: factor.max(1) }
    }
}

impl<S: SampleSink> SampleSink for DecimatingSink<S> {
    fn sample_type(&self) -> SampleType {
        self.inner.sample_type()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity().saturating_mul(self.factor)
    }

    fn write(&mut self, at: usize, segment: &SourceSegment<'_>) -> Result<()> {
        if self.factor == 1 {
            return self.inner.write(at, segment);
        }
        let first = at.div_ceil(self.factor) * self.factor;
        for kept in (first..at + segment.count).step_by(self.factor) {
            let start = segment.start + (kept - at);
            let single = SourceSegment::new(segment.packet, start, 1, segment.mode);
            self.inner.write(kept / self.factor, &single)?;
        }
        Ok(())
    }
}

/// Writes domain values converted to ticks of the shared resolution.
struct SharedDomainSink<'a, D> {
    out: &'a mut [D],
    alignment: &'a Alignment,
    index: usize,
}

impl<D: Sample> SampleSink for SharedDomainSink<'_, D> {
    fn sample_type(&self) -> SampleType {
        D::SAMPLE_TYPE
    }

    fn capacity(&self) -> usize {
        self.out.len()
    }

    fn write(&mut self, at: usize, segment: &SourceSegment<'_>) -> Result<()> {
        let provided = self.out.len();
        let end = at + segment.count;
        let slots = self.out.get_mut(at..end).ok_or_else(|| {
            ReaderError::buffer_too_small("shared domain sink", end, provided)
        })?;
        let raw = SourceSegment { mode: ReadMode::Unscaled, ..*segment }.scalars()?;
        for (slot, value) in slots.iter_mut().zip(raw) {
            *slot = D::from_scalar(self.alignment.shared_ticks(self.index, value)?);
        }
        Ok(())
    }
}

/// Builder for [`MultiReader`].
#[derive(Debug)]
pub struct MultiReaderBuilder {
    sources: Vec<ReaderSource>,
    config: MultiReaderConfig,
}

impl MultiReaderBuilder {
    pub fn value_read_type(mut self, sample_type: SampleType) -> Self {
        self.config.value_read_type = sample_type;
        self
    }

    pub fn domain_read_type(mut self, sample_type: SampleType) -> Self {
        self.config.domain_read_type = sample_type;
        self
    }

    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.config.read_mode = mode;
        self
    }

    pub fn timeout_type(mut self, timeout_type: TimeoutType) -> Self {
        self.config.timeout_type = timeout_type;
        self
    }

    pub fn required_common_sample_rate(mut self, rate: Ratio) -> Self {
        self.config.required_common_sample_rate = Some(rate);
        self
    }

    pub fn start_on_full_unit_of_domain(mut self, enabled: bool) -> Self {
        self.config.start_on_full_unit_of_domain = enabled;
        self
    }

    pub fn build(self) -> Result<MultiReader> {
        self.config.validate()?;
        if self.sources.is_empty() {
            return Err(ReaderError::invalid_parameter(
                "signals",
                "at least one signal is required",
            ));
        }
        let mut seen = BTreeSet::new();
        for source in &self.sources {
            let id = source.id();
            if !seen.insert(id.clone()) {
                return Err(ReaderError::invalid_parameter(
                    "signals",
                    format!("signal '{id}' is listed more than once"),
                ));
            }
        }
        let options = self.config.options();
        let signals = self
            .sources
            .into_iter()
            .map(|source| {
                Ok(SignalCursor {
                    id: source.id(),
                    core: ReaderCore::new(source, options)?,
                    resolver: DomainResolver::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        MultiReader::assemble(signals, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Signal;
    use crate::types::{DataRule, Unit};

    fn signal(id: &str, ticks_per_sample: i64, origin: &str) -> Arc<Signal> {
        let value = DataDescriptor::builder(SampleType::Int64).build().unwrap();
        let domain = DataDescriptor::builder(SampleType::Int64)
            .rule(DataRule::linear(ticks_per_sample, 0))
            .unit(Unit::seconds())
            .tick_resolution(Ratio::new(1, 1000).unwrap())
            .origin(origin)
            .build()
            .unwrap();
        Signal::with_descriptors(id, value, Some(domain))
    }

    fn send_indices(signal: &Signal, first: i64, count: i64, ticks_per_sample: i64) {
        let values: Vec<i64> = (first..first + count).collect();
        signal.send_samples(&values, Scalar::Int(first * ticks_per_sample)).unwrap();
    }

    #[test]
    fn undefined_domain_type_is_rejected() {
        let a = signal("a", 1, "2024-01-01T00:00:00Z");
        let result = MultiReader::builder([&a]).build();
        assert!(matches!(result, Err(ReaderError::InvalidParameter { .. })));
    }

    #[test]
    fn rates_and_decimation() {
        let fast = signal("fast", 1, "2024-01-01T00:00:00Z");
        let slow = signal("slow", 4, "2024-01-01T00:00:00Z");
        let reader = MultiReader::builder([&fast, &slow])
            .domain_read_type(SampleType::Int64)
            .build()
            .unwrap();
        assert_eq!(reader.common_sample_rate(), Some(Ratio::from_integer(1000)));
        assert_eq!(reader.sample_rate_dividers(), Some(vec![1, 4]));
        assert_eq!(reader.decimation_factors(), Some(vec![4, 1]));
    }

    #[test]
    fn required_rate_must_be_divisible() {
        let fast = signal("fast", 1, "2024-01-01T00:00:00Z");
        let result = MultiReader::builder([&fast])
            .domain_read_type(SampleType::Int64)
            .required_common_sample_rate(Ratio::from_integer(300))
            .build();
        assert!(matches!(result, Err(ReaderError::IncompatibleSampleRates { .. })));
    }

    #[test]
    fn later_start_is_skipped_to() {
        let a = signal("a", 1, "2024-01-01T00:00:00Z");
        let b = signal("b", 1, "2024-01-01T00:00:00Z");
        let mut reader = MultiReader::builder([&a, &b])
            .domain_read_type(SampleType::Int64)
            .build()
            .unwrap();
        send_indices(&a, 0, 10, 1);
        send_indices(&b, 3, 10, 1);

        let mut values = [0i64; 4];
        let mut domain = [0i64; 4];
        let outcome = reader.read_with_domain(&mut values, &mut domain, 2, Duration::ZERO).unwrap();
        assert_eq!(outcome.count, 2);
        assert_eq!(values, [3, 4, 3, 4]);
        assert_eq!(domain, [3, 4, 3, 4]);
        assert_eq!(outcome.status.status.offset, Some(Scalar::Int(3)));
        assert!(reader.is_synchronized());
        assert!(reader.is_start_aligned());
    }

    #[test]
    fn synchronized_once_rates_are_known() {
        let fast = signal("fast", 1, "2024-01-01T00:00:00Z");
        let slow = signal("slow", 4, "2024-01-01T00:00:00Z");
        let reader = MultiReader::builder([&fast, &slow])
            .domain_read_type(SampleType::Int64)
            .build()
            .unwrap();
        assert!(reader.is_synchronized());
        assert!(!reader.is_start_aligned());
    }

    #[test]
    fn duplicate_signals_are_rejected() {
        let a = signal("a", 1, "2024-01-01T00:00:00Z");
        let result = MultiReader::builder([&a, &a]).domain_read_type(SampleType::Int64).build();
        assert!(matches!(
            result,
            Err(ReaderError::InvalidParameter { ref parameter, .. }) if parameter == "signals"
        ));
    }

    #[test]
    fn raw_value_mismatch_consumes_nothing() {
        let a = signal("a", 1, "2024-01-01T00:00:00Z");
        let b = signal("b", 1, "2024-01-01T00:00:00Z");
        b.set_descriptors(Some(DataDescriptor::builder(SampleType::Int32).build().unwrap()), None);
        let mut reader = MultiReader::builder([&a, &b])
            .domain_read_type(SampleType::Int64)
            .read_mode(ReadMode::RawValue)
            .build()
            .unwrap();
        send_indices(&a, 0, 4, 1);
        b.send_samples(&[0i32, 1, 2, 3], Scalar::Int(0)).unwrap();

        let mut values = [0i64; 4];
        let err = reader.read(&mut values, 2, Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::TypeMismatch { expected: SampleType::Int32, actual: SampleType::Int64 }
        ));
        assert_eq!(reader.available_count(), 4);
        assert_eq!(reader.skip_samples(4, Duration::ZERO).unwrap().count, 4);
    }

    #[test]
    fn reconfigured_reader_recovers_from_invalid_descriptor() {
        let a = signal("a", 1, "2024-01-01T00:00:00Z");
        let b = signal("b", 1, "2024-01-01T00:00:00Z");
        let config = MultiReaderConfig {
            value_read_type: SampleType::Int64,
            domain_read_type: SampleType::Int64,
            ..Default::default()
        };
        let mut reader = MultiReader::from_config([&a, &b], &config).unwrap();
        let mut values = [0i64; 8];
        send_indices(&a, 0, 4, 1);
        send_indices(&b, 0, 4, 1);
        assert_eq!(reader.read(&mut values, 4, Duration::ZERO).unwrap().count, 4);

        let complex = DataDescriptor::builder(SampleType::ComplexFloat64).build().unwrap();
        let int64 = DataDescriptor::builder(SampleType::Int64).build().unwrap();
        b.set_descriptors(Some(complex), None);
        b.set_descriptors(Some(int64), None);
        send_indices(&a, 4, 4, 1);
        send_indices(&b, 4, 4, 1);

        let invalidated = reader.read(&mut values, 4, Duration::ZERO).unwrap();
        assert!(invalidated.status.status.is_event());
        assert!(!invalidated.status.status.valid);
        assert!(!reader.is_valid());
        let failed = reader.read(&mut values, 4, Duration::ZERO).unwrap();
        assert_eq!(failed.status.status.read_status, ReadStatus::Fail);

        let mut reader = MultiReader::from_existing(reader, &config).unwrap();
        let restored = reader.read(&mut values, 4, Duration::ZERO).unwrap();
        assert!(restored.status.status.is_event());
        assert!(restored.status.status.valid);
        assert!(restored.status.event_packets.contains_key("b"));

        let outcome = reader.read(&mut values, 4, Duration::ZERO).unwrap();
        assert_eq!(outcome.count, 4);
        assert_eq!(values, [4, 5, 6, 7, 4, 5, 6, 7]);
        assert!(reader.is_valid());
    }

    #[test]
    fn decimating_sink_keeps_every_nth() {
        let descriptor = DataDescriptor::builder(SampleType::Int32).build().unwrap();
        let samples = [0i32, 1, 2, 3, 4, 5, 6, 7];
        let packet = crate::types::DataPacket::from_samples(descriptor, &samples, None).unwrap();
        let mut out = [0i32; 2];
        let mut sink = DecimatingSink::new(TypedSink::new(&mut out), 3);
        sink.write(0, &SourceSegment::new(&packet, 0, 2, ReadMode::Scaled)).unwrap();
        sink.write(2, &SourceSegment::new(&packet, 2, 4, ReadMode::Scaled)).unwrap();
        assert_eq!(out, [0, 3]);
    }

    #[test]
    fn shared_ticks_round_to_nearest() {
        assert_eq!(round_half_up(Ratio::new(5, 2).unwrap()), 3);
        assert_eq!(round_half_up(Ratio::new(-5, 2).unwrap()), -2);
        assert_eq!(round_half_up(Ratio::new(7, 3).unwrap()), 2);
    }

    #[test]
    fn full_unit_start_rounds_up_to_whole_second() {
        let origin = "2024-01-01T00:00:00.250Z".parse::<DateTime<Utc>>().unwrap();
        let start = next_full_unit(Ratio::new(1, 2).unwrap(), origin).unwrap();
        assert_eq!(start, Ratio::new(3, 4).unwrap());
    }

    #[test]
    fn inactive_reader_only_reports_events() {
        let a = signal("a", 1, "2024-01-01T00:00:00Z");
        let mut reader = MultiReader::builder([&a])
            .domain_read_type(SampleType::Int64)
            .build()
            .unwrap();
        reader.set_active(false);
        send_indices(&a, 0, 5, 1);
        a.send(EventPacket::new("CUSTOM"));

        let mut values = [0i64; 5];
        let outcome = reader.read(&mut values, 5, Duration::ZERO).unwrap();
        assert_eq!(outcome.count, 0);
        assert!(outcome.status.event_packets.contains_key("a"));
        assert_eq!(reader.available_count(), 0);
    }
}
