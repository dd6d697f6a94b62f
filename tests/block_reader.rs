//! Block reader: whole blocks across packet boundaries

mod common;

use anyhow::{Result, ensure};
use signal_reader::{
    BlockReader, DataDescriptor, DataRule, Ratio, ReadMode, ReaderConfig, ReaderError,
    ReaderOptions, SampleRead, SampleType, Scalar, Signal,
};
use std::sync::Arc;
use std::time::Duration;

fn signal() -> Result<Arc<Signal>> {
    let value = DataDescriptor::builder(SampleType::Int16).build()?;
    let domain = DataDescriptor::builder(SampleType::Int64)
        .rule(DataRule::linear(10, 0))
        .tick_resolution(Ratio::from_integer(1))
        .build()?;
    Ok(Signal::with_descriptors("ai0", value, Some(domain)))
}

#[test]
fn blocks_span_packet_boundaries() -> Result<()> {
    common::init_tracing();
    let signal = signal()?;
    let mut reader = BlockReader::builder(&signal, 3).value_read_type(SampleType::Int32).build()?;

    signal.send_samples(&[1i16, 2], Scalar::Int(0))?;
    signal.send_samples(&[3i16, 4, 5], Scalar::Int(20))?;
    signal.send_samples(&[6i16, 7], Scalar::Int(50))?;

    ensure!(reader.available_count() == 2);
    let mut values = [0i32; 9];
    let mut domain = [0i64; 9];
    let outcome = reader.read_with_domain(&mut values, &mut domain, 3, Duration::ZERO)?;
    ensure!(outcome.count == 2, "expected two whole blocks, got {}", outcome.count);
    ensure!(values[..6] == [1, 2, 3, 4, 5, 6], "values {values:?}");
    ensure!(domain[..6] == [0, 10, 20, 30, 40, 50], "domain {domain:?}");
    ensure!(outcome.status.offset == Some(Scalar::Int(0)));

    // the trailing sample waits for the rest of its block
    ensure!(reader.available_count() == 0);
    signal.send_samples(&[8i16, 9], Scalar::Int(70))?;
    let outcome = reader.read(&mut values, 1, Duration::ZERO)?;
    ensure!(outcome.count == 1 && values[..3] == [7, 8, 9]);
    Ok(())
}

#[test]
fn incomplete_block_before_event_is_dropped() -> Result<()> {
    let signal = signal()?;
    let mut reader = BlockReader::builder(&signal, 4).build()?;

    signal.send_samples(&[1i16, 2, 3, 4, 5, 6], Scalar::Int(0))?;
    signal.set_descriptors(Some(DataDescriptor::builder(SampleType::Int16).build()?), None);
    signal.send_samples(&[7i16, 8, 9, 10], Scalar::Int(60))?;

    let mut values = [0i16; 8];
    let outcome = reader.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.count == 1);
    ensure!(outcome.status.is_event(), "event should follow the dropped partial block");
    ensure!(values[..4] == [1, 2, 3, 4]);

    let outcome = reader.read(&mut values, 2, Duration::ZERO)?;
    ensure!(outcome.count == 1 && values[..4] == [7, 8, 9, 10], "values {values:?}");
    Ok(())
}

#[test]
fn buffers_are_checked_against_the_block_layout() -> Result<()> {
    let signal = signal()?;
    let mut reader = BlockReader::builder(&signal, 4).build()?;
    ensure!(reader.layout(2).shape() == [2, 4]);

    let mut short = [0i16; 7];
    let err = reader.read(&mut short, 2, Duration::ZERO).unwrap_err();
    ensure!(
        matches!(err, ReaderError::Buffer { required: 8, provided: 7, .. }),
        "unexpected error {err:?}"
    );
    Ok(())
}

#[test]
fn built_from_yaml_configuration() -> Result<()> {
    let config = ReaderConfig::from_yaml(
        "kind:\n  type: block\n  block_size: 2\nvalue_read_type: Float32\n",
    )?;
    let signal = signal()?;
    let mut reader = BlockReader::from_config(&signal, &config)?;
    ensure!(reader.block_size() == 2);

    signal.send_samples(&[5i16, 6], Scalar::Int(0))?;
    let mut values = [0.0f32; 2];
    ensure!(reader.read(&mut values, 1, Duration::ZERO)?.count == 1);
    ensure!(values == [5.0, 6.0]);

    let stream = ReaderConfig::from_yaml("{}")?;
    let result = BlockReader::from_config(&signal, &stream);
    ensure!(matches!(result, Err(ReaderError::InvalidParameter { .. })));
    Ok(())
}

#[test]
fn reconfigured_for_a_new_raw_type() -> Result<()> {
    let signal = signal()?;
    let mut reader = BlockReader::builder(&signal, 2)
        .value_read_type(SampleType::Int16)
        .read_mode(ReadMode::RawValue)
        .build()?;

    signal.set_descriptors(Some(DataDescriptor::builder(SampleType::Int32).build()?), None);
    signal.send_samples(&[3i32, 4, 5, 6], Scalar::Int(0))?;

    let mut narrow = [0i16; 4];
    let outcome = reader.read(&mut narrow, 2, Duration::ZERO)?;
    ensure!(outcome.count == 0 && outcome.status.is_event());
    ensure!(!outcome.status.valid && !reader.is_valid());

    let options = ReaderOptions { value_read_type: SampleType::Int32, ..*reader.options() };
    let mut reader = BlockReader::from_existing(reader, options)?;
    ensure!(reader.is_valid() && reader.block_size() == 2);
    let mut wide = [0i32; 4];
    let outcome = reader.read(&mut wide, 2, Duration::ZERO)?;
    ensure!(outcome.count == 2 && wide == [3, 4, 5, 6], "values {wide:?}");
    Ok(())
}
