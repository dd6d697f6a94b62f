//! Tail reader: a sliding window over the newest samples

mod common;

use anyhow::{Result, ensure};
use signal_reader::{
    DataDescriptor, DataRule, EventPacket, Ratio, ReaderError, SampleRead, SampleType, Scalar,
    Signal, TailReader,
};
use std::sync::Arc;
use std::time::Duration;

fn signal() -> Result<Arc<Signal>> {
    let value = DataDescriptor::builder(SampleType::Int32).build()?;
    let domain = DataDescriptor::builder(SampleType::Int64)
        .rule(DataRule::linear(2, 0))
        .tick_resolution(Ratio::from_integer(1))
        .build()?;
    Ok(Signal::with_descriptors("ai0", value, Some(domain)))
}

#[test]
fn window_slides_over_packets() -> Result<()> {
    common::init_tracing();
    let signal = signal()?;
    let mut reader = TailReader::builder(&signal, 5).build()?;

    signal.send_samples(&[1i32, 2, 3], Scalar::Int(0))?;
    let mut values = [0i32; 5];
    let outcome = reader.read(&mut values, 3, Duration::ZERO)?;
    ensure!(outcome.count == 3 && values[..3] == [1, 2, 3]);
    ensure!(!outcome.status.sufficient_history, "history is not full yet");

    signal.send_samples(&[4i32, 5, 6, 7], Scalar::Int(6))?;
    let outcome = reader.read(&mut values, 5, Duration::ZERO)?;
    ensure!(outcome.count == 5 && values == [3, 4, 5, 6, 7], "window {values:?}");
    ensure!(outcome.status.sufficient_history);

    // reading does not consume the history
    let mut newest = [0i32; 2];
    for _ in 0..2 {
        reader.read(&mut newest, 2, Duration::ZERO)?;
        ensure!(newest == [6, 7]);
    }
    Ok(())
}

#[test]
fn domain_values_match_the_window() -> Result<()> {
    let signal = signal()?;
    let mut reader = TailReader::builder(&signal, 4).build()?;
    signal.send_samples(&[10i32, 11, 12, 13, 14, 15], Scalar::Int(0))?;

    let mut values = [0i32; 3];
    let mut domain = [0i64; 3];
    let outcome = reader.read_with_domain(&mut values, &mut domain, 3, Duration::ZERO)?;
    ensure!(outcome.count == 3);
    ensure!(values == [13, 14, 15]);
    ensure!(domain == [6, 8, 10], "domain {domain:?}");
    ensure!(outcome.status.status.offset == Some(Scalar::Int(6)));
    Ok(())
}

#[test]
fn descriptor_change_restarts_history() -> Result<()> {
    let signal = signal()?;
    let mut reader = TailReader::builder(&signal, 3).build()?;
    signal.send_samples(&[1i32, 2, 3], Scalar::Int(0))?;
    let mut values = [0i32; 3];
    ensure!(reader.read(&mut values, 3, Duration::ZERO)?.status.sufficient_history);

    signal.set_descriptors(Some(DataDescriptor::builder(SampleType::Int32).build()?), None);
    let outcome = reader.read(&mut values, 3, Duration::ZERO)?;
    ensure!(outcome.count == 0 && outcome.status.status.is_event());
    ensure!(!outcome.status.sufficient_history);

    signal.send_samples(&[7i32, 8], Scalar::Int(6))?;
    let outcome = reader.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.count == 2 && values[..2] == [7, 8]);
    Ok(())
}

#[test]
fn other_events_keep_history() -> Result<()> {
    let signal = signal()?;
    let mut reader = TailReader::builder(&signal, 2).build()?;
    signal.send_samples(&[1i32, 2], Scalar::Int(0))?;
    signal.send(EventPacket::implicit_domain_gap_detected(Scalar::Int(4)));

    let mut values = [0i32; 2];
    let outcome = reader.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.status.status.is_event());
    ensure!(outcome.count == 2 && values == [1, 2]);
    ensure!(outcome.status.sufficient_history);
    Ok(())
}

#[test]
fn count_above_history_size_is_rejected() -> Result<()> {
    let signal = signal()?;
    let mut reader = TailReader::builder(&signal, 2).build()?;
    let mut values = [0i32; 3];
    let err = reader.read(&mut values, 3, Duration::ZERO).unwrap_err();
    ensure!(matches!(err, ReaderError::InvalidParameter { .. }), "unexpected error {err:?}");
    let result = TailReader::builder(&signal, 0).build();
    ensure!(matches!(result, Err(ReaderError::InvalidParameter { .. })));
    Ok(())
}

#[test]
fn recovered_reader_starts_a_fresh_history() -> Result<()> {
    let signal = signal()?;
    let mut reader = TailReader::builder(&signal, 3).value_read_type(SampleType::Int32).build()?;
    signal.send_samples(&[1i32, 2, 3], Scalar::Int(0))?;
    let complex = DataDescriptor::builder(SampleType::ComplexFloat32).build()?;
    signal.set_descriptors(Some(complex), None);
    signal.set_descriptors(Some(DataDescriptor::builder(SampleType::Int32).build()?), None);
    signal.send_samples(&[7i32, 8], Scalar::Int(6))?;

    let mut values = [0i32; 3];
    let outcome = reader.read(&mut values, 3, Duration::ZERO)?;
    ensure!(outcome.count == 0 && !outcome.status.status.valid);

    let options = *reader.options();
    let mut reader = TailReader::from_existing(reader, options)?;
    let outcome = reader.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.status.status.is_event() && outcome.status.status.valid);

    let outcome = reader.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.count == 2 && values[..2] == [7, 8], "values {values:?}");
    ensure!(!outcome.status.sufficient_history);
    Ok(())
}
