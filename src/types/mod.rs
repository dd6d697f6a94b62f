//! Data model consumed by the readers.
//!
//! Producers publish [`Packet`]s on a signal's connection queue. Data packets carry
//! a shared [`DataDescriptor`] telling readers how to interpret the payload; event
//! packets announce structural changes such as a new descriptor.
//!
//! ## Usage Example
//!
//! ```rust
//! use signal_reader::types::{DataDescriptor, DataPacket, DataRule, Ratio, SampleType, Scalar};
//! use std::sync::Arc;
//!
//! let domain = DataDescriptor::builder(SampleType::Int64)
//!     .rule(DataRule::linear(1, 0))
//!     .tick_resolution(Ratio::new(1, 1000).unwrap())
//!     .origin("2024-01-01T00:00:00+0000")
//!     .build()
//!     .unwrap();
//! let value = DataDescriptor::builder(SampleType::Float64).build().unwrap();
//!
//! let domain_packet = Arc::new(DataPacket::implicit(domain, 3, Scalar::Int(0), None).unwrap());
//! let packet = DataPacket::from_samples(value, &[1.0f64, 2.0, 3.0], Some(domain_packet)).unwrap();
//! assert_eq!(packet.sample_count, 3);
//! ```

mod descriptor;
mod packet;
mod ratio;
mod read_mode;
mod sample;
mod sample_type;

pub use descriptor::{
    DataDescriptor, DataDescriptorBuilder, DataRule, Dimension, PostScaling, Unit, ValueRange,
};
pub use packet::{
    DATA_DESCRIPTOR_CHANGED, DataPacket, EventPacket, EventParameter,
    IMPLICIT_DOMAIN_GAP_DETECTED, PARAM_DATA_DESCRIPTOR, PARAM_DOMAIN_DESCRIPTOR, PARAM_GAP_DIFF,
    Packet,
};
pub use ratio::Ratio;
pub use read_mode::{ReadMode, TimeoutType};
pub use sample::{RangeInt64, Sample, Scalar, encode_samples};
pub use sample_type::SampleType;
