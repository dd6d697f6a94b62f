//! Conversion of raw domain samples into absolute time points

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ReadOutcome, SampleRead};
use crate::codec::{DiscardSink, SampleSink, SourceSegment, TypedSink};
use crate::types::{DataDescriptor, Ratio, Sample, SampleType, Scalar};
use crate::{ReaderError, Result};

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Parse a domain origin into an instant.
///
/// Accepts RFC 3339, ISO 8601 with a compact offset (`+0000`), a naive date-time
/// taken as UTC, or a bare date at midnight UTC. An empty origin is the Unix epoch.
pub fn parse_origin(origin: &str) -> Result<DateTime<Utc>> {
    let origin = origin.trim();
    if origin.is_empty() {
        return Ok(DateTime::<Utc>::UNIX_EPOCH);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(origin) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(origin, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(origin, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(parsed.and_utc());
    }
    NaiveDate::parse_from_str(origin, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            ReaderError::parse_error("domain origin", format!("'{origin}' is not an ISO 8601 time"))
        })
}

/// Time base of one domain descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDomain {
    epoch: DateTime<Utc>,
    resolution: Ratio,
    sample_type: SampleType,
}

impl TimeDomain {
    /// Validate a domain descriptor and extract its time base.
    pub fn from_descriptor(descriptor: &DataDescriptor) -> Result<Self> {
        let sample_type = descriptor.raw_sample_type();
        match sample_type {
            SampleType::Invalid => {
                return Err(ReaderError::invalid_descriptor("domain sample type is invalid"));
            }
            SampleType::Float32
            | SampleType::Float64
            | SampleType::Int8
            | SampleType::UInt8
            | SampleType::Int16
            | SampleType::UInt16
            | SampleType::Int32
            | SampleType::UInt32
            | SampleType::Int64
            | SampleType::UInt64
            | SampleType::RangeInt64 => {}
            SampleType::ComplexFloat32
            | SampleType::ComplexFloat64
            | SampleType::Binary
            | SampleType::String
            | SampleType::Struct
            | SampleType::Undefined => {
                return Err(ReaderError::UnsupportedDomainSampleType { sample_type });
            }
        }

        let unit = descriptor.unit.as_ref();
        let quantity = unit.map_or("", |u| u.quantity.as_str());
        if quantity != "time" {
            return Err(ReaderError::InvalidDomainQuantity { quantity: quantity.to_string() });
        }
        let symbol = unit.map_or("", |u| u.symbol.as_str());
        if symbol != "s" {
            return Err(ReaderError::UnsupportedTimeUnit { symbol: symbol.to_string() });
        }

        let resolution = descriptor
            .tick_resolution
            .ok_or_else(|| {
                ReaderError::invalid_descriptor("domain descriptor has no tick resolution")
            })?;
        let epoch = parse_origin(descriptor.origin.as_deref().unwrap_or_default())?;
        Ok(TimeDomain { epoch, resolution, sample_type })
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    pub fn resolution(&self) -> Ratio {
        self.resolution
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// `epoch + raw * resolution` seconds, rounded to the nearest nanosecond.
    pub fn time_point(&self, raw: Scalar) -> Result<DateTime<Utc>> {
        let num = self.resolution.numerator() as i128;
        let den = self.resolution.denominator() as i128;
        let nanos = match raw {
            Scalar::Int(ticks) => rounded_div(ticks as i128 * num * NANOS_PER_SECOND, den),
            Scalar::UInt(ticks) => rounded_div(ticks as i128 * num * NANOS_PER_SECOND, den),
            Scalar::Float(ticks) => {
                (ticks * self.resolution.to_f64() * NANOS_PER_SECOND as f64).round() as i128
            }
        };
        i64::try_from(nanos)
            .ok()
            .and_then(|nanos| self.epoch.checked_add_signed(TimeDelta::nanoseconds(nanos)))
            .ok_or_else(|| {
                ReaderError::invalid_descriptor(format!(
                    "domain value {raw:?} is outside the time range"
                ))
            })
    }
}

/// Round half away from zero; `den` is positive.
fn rounded_div(num: i128, den: i128) -> i128 {
    let quotient = num / den;
    let remainder = num % den;
    if 2 * remainder.abs() >= den { quotient + num.signum() } else { quotient }
}

/// Converts domain samples to time points, caching the time base per descriptor.
///
/// The cache is keyed by descriptor identity: a structurally equal descriptor that is
/// a different allocation is parsed again.
#[derive(Debug, Default)]
pub struct DomainResolver {
    cached: Option<(Arc<DataDescriptor>, TimeDomain)>,
}

impl DomainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, descriptor: &Arc<DataDescriptor>) -> Result<&TimeDomain> {
        let stale = self.cached.as_ref().is_none_or(|(cached, _)| !Arc::ptr_eq(cached, descriptor));
        if stale {
            let domain = TimeDomain::from_descriptor(descriptor)?;
            debug!(
                epoch = %domain.epoch,
                resolution = %domain.resolution,
                "domain time base changed"
            );
            self.cached = Some((descriptor.clone(), domain));
        }
        self.cached
            .as_ref()
            .map(|(_, domain)| domain)
            .ok_or_else(|| ReaderError::invalid_descriptor("domain time base unavailable"))
    }

    pub fn time_point(
        &mut self,
        descriptor: &Arc<DataDescriptor>,
        raw: Scalar,
    ) -> Result<DateTime<Utc>> {
        self.resolve(descriptor)?.time_point(raw)
    }
}

/// Sink writing the time point of each domain sample.
pub struct TimeSink<'a> {
    resolver: &'a mut DomainResolver,
    times: &'a mut [DateTime<Utc>],
}

impl<'a> TimeSink<'a> {
    pub fn new(resolver: &'a mut DomainResolver, times: &'a mut [DateTime<Utc>]) -> Self {
        TimeSink { resolver, times }
    }
}

impl SampleSink for TimeSink<'_> {
    fn sample_type(&self) -> SampleType {
        SampleType::Undefined
    }

    fn capacity(&self) -> usize {
        self.times.len()
    }

    fn write(&mut self, at: usize, segment: &SourceSegment<'_>) -> Result<()> {
        let provided = self.times.len();
        let slots = self
            .times
            .get_mut(at..at + segment.count)
            .ok_or_else(|| {
                ReaderError::buffer_too_small("time sink", at + segment.count, provided)
            })?;
        let domain = self.resolver.resolve(&segment.packet.descriptor)?;
        for (slot, raw) in slots.iter_mut().zip(segment.scalars()?) {
            *slot = domain.time_point(raw)?;
        }
        Ok(())
    }
}

/// Wraps a reader so its domain output is delivered as absolute time points.
#[derive(Debug)]
pub struct TimeReader<R> {
    reader: R,
    resolver: DomainResolver,
}

impl<R: SampleRead> TimeReader<R> {
    pub fn new(reader: R) -> Self {
        TimeReader { reader, resolver: DomainResolver::new() }
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

    /// Read values and the time point of every value.
    pub fn read_with_time<T: Sample>(
        &mut self,
        values: &mut [T],
        times: &mut [DateTime<Utc>],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<R::Status>> {
        let mut sink = TimeSink::new(&mut self.resolver, times);
        self.reader.read_into(&mut TypedSink::new(values), Some(&mut sink), count, timeout)
    }

    /// Read only the time points, discarding the values.
    pub fn read_times(
        &mut self,
        times: &mut [DateTime<Utc>],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<R::Status>> {
        let mut sink = TimeSink::new(&mut self.resolver, times);
        self.reader.read_into(&mut DiscardSink, Some(&mut sink), count, timeout)
    }

    /// Time base of the reader's current domain descriptor.
    pub fn time_domain(&mut self) -> Result<Option<TimeDomain>> {
        match self.reader.domain_descriptor() {
            Some(descriptor) => self.resolver.resolve(&descriptor).cloned().map(Some),
            None => Ok(None),
        }
    }
}
