//! Test utilities: tracing setup and signal fixtures
//!
//! Shared by unit tests, integration tests and benches so every suite builds its
//! signals the same way.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::Result;
use crate::connection::Signal;
use crate::types::{DataDescriptor, DataRule, Ratio, Sample, SampleType, Scalar, Unit};

/// Install a test-friendly subscriber once; later calls are no-ops.
///
/// Honours `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Explicit scalar value descriptor.
pub fn value_descriptor(sample_type: SampleType) -> Result<Arc<DataDescriptor>> {
    DataDescriptor::builder(sample_type).name("value").build()
}

/// Linear time domain in `Int64` ticks of `resolution` seconds.
pub fn time_domain(
    ticks_per_sample: i64,
    resolution: Ratio,
    origin: &str,
) -> Result<Arc<DataDescriptor>> {
    DataDescriptor::builder(SampleType::Int64)
        .name("time")
        .rule(DataRule::linear(ticks_per_sample, 0))
        .unit(Unit::seconds())
        .tick_resolution(resolution)
        .origin(origin)
        .build()
}

/// Signal with `Float64` values on a millisecond-tick time domain.
pub fn time_signal(id: &str, ticks_per_sample: i64, origin: &str) -> Result<Arc<Signal>> {
    let resolution = Ratio::new(1, 1000)
        .ok_or_else(|| crate::ReaderError::invalid_parameter("resolution", "zero denominator"))?;
    Ok(Signal::with_descriptors(
        id,
        value_descriptor(SampleType::Float64)?,
        Some(time_domain(ticks_per_sample, resolution, origin)?),
    ))
}

/// Descriptor parsed from a YAML fixture.
pub fn descriptor_from_yaml(yaml: &str) -> Result<Arc<DataDescriptor>> {
    let descriptor: DataDescriptor = serde_yaml_ng::from_str(yaml)?;
    descriptor.validate()?;
    Ok(Arc::new(descriptor))
}

/// Send samples `first..first + count` (value = index) with a matching domain offset.
pub fn send_ramp<T: Sample>(
    signal: &Signal,
    first: i64,
    count: i64,
    ticks_per_sample: i64,
) -> Result<()> {
    let values: Vec<T> = (first..first + count).map(|i| T::from_scalar(Scalar::Int(i))).collect();
    signal.send_samples(&values, Scalar::Int(first * ticks_per_sample))
}
