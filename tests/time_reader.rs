//! Domain values reconstructed as absolute time points

mod common;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, SecondsFormat, Utc};
use signal_reader::{
    DataDescriptor, DataRule, Ratio, ReaderError, SampleRead, SampleType, Scalar, Signal,
    StreamReader, TimeReader,
    Unit,
};
use std::sync::Arc;
use std::time::Duration;

fn domain(origin: &str) -> Result<Arc<DataDescriptor>> {
    Ok(DataDescriptor::builder(SampleType::Int64)
        .rule(DataRule::linear(1, 0))
        .unit(Unit::seconds())
        .tick_resolution(Ratio::new(1, 1000).context("resolution")?)
        .origin(origin)
        .build()?)
}

#[test]
fn millisecond_ticks_become_timestamps() -> Result<()> {
    common::init_tracing();
    let value = DataDescriptor::builder(SampleType::Float64).build()?;
    let signal = Signal::with_descriptors("ai0", value, Some(domain("2024-01-01T00:00:00+0000")?));
    let mut reader = TimeReader::new(StreamReader::builder(&signal).build()?);

    let samples: Vec<f64> = (0..10).map(f64::from).collect();
    signal.send_samples(&samples, Scalar::Int(0))?;

    let mut values = [0.0f64; 10];
    let mut times = [DateTime::<Utc>::UNIX_EPOCH; 10];
    let outcome = reader.read_with_time(&mut values, &mut times, 10, Duration::ZERO)?;
    ensure!(outcome.count == 10 && outcome.status.is_ok() && outcome.status.valid);
    ensure!(values.as_slice() == samples.as_slice());

    let formatted: Vec<String> =
        times.iter().map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)).collect();
    let expected: Vec<String> = (0..10).map(|ms| format!("2024-01-01T00:00:00.{ms:03}Z")).collect();
    ensure!(formatted == expected, "times {formatted:?}");

    let time_domain = reader.time_domain()?.context("time domain")?;
    ensure!(time_domain.resolution() == Ratio::new(1, 1000).context("resolution")?);
    Ok(())
}

#[test]
fn origin_follows_descriptor_changes() -> Result<()> {
    let value = DataDescriptor::builder(SampleType::Int32).build()?;
    let signal = Signal::with_descriptors("ai0", value, Some(domain("2024-01-01T00:00:00Z")?));
    let mut reader = TimeReader::new(StreamReader::builder(&signal).build()?);

    signal.send_samples(&[1i32], Scalar::Int(1000))?;
    signal.set_descriptors(None, Some(domain("2025-06-01T12:00:00Z")?));
    signal.send_samples(&[2i32], Scalar::Int(500))?;

    let mut values = [0i32; 2];
    let mut times = [DateTime::<Utc>::UNIX_EPOCH; 2];
    let first = reader.read_with_time(&mut values, &mut times, 2, Duration::ZERO)?;
    ensure!(first.count == 1 && first.status.is_event());
    ensure!(times[0].to_rfc3339_opts(SecondsFormat::Millis, true) == "2024-01-01T00:00:01.000Z");

    reader.read_times(&mut times, 1, Duration::ZERO)?;
    ensure!(times[0].to_rfc3339_opts(SecondsFormat::Millis, true) == "2025-06-01T12:00:00.500Z");
    Ok(())
}

#[test]
fn non_time_domains_are_rejected() -> Result<()> {
    let value = DataDescriptor::builder(SampleType::Int32).build()?;
    let meters = DataDescriptor::builder(SampleType::Int64)
        .rule(DataRule::linear(1, 0))
        .unit(Unit::new("m", "meter", "length"))
        .tick_resolution(Ratio::from_integer(1))
        .build()?;
    let signal = Signal::with_descriptors("ai0", value, Some(meters));
    let mut reader = TimeReader::new(StreamReader::builder(&signal).build()?);
    signal.send_samples(&[1i32], Scalar::Int(0))?;

    let mut values = [0i32; 1];
    let mut times = [DateTime::<Utc>::UNIX_EPOCH; 1];
    let err = reader.read_with_time(&mut values, &mut times, 1, Duration::ZERO).unwrap_err();
    ensure!(
        matches!(err, ReaderError::InvalidDomainQuantity { ref quantity } if quantity == "length"),
        "{err:?}"
    );
    ensure!(reader.inner().is_valid());
    Ok(())
}
