//! Typed, aligned sample readers over self-describing data-acquisition streams.
//!
//! A [`Signal`] publishes data packets together with descriptors of their encoding.
//! Readers connect to a signal (directly or through an [`InputPort`]), follow its
//! descriptor changes and copy samples into caller-owned buffers of the type the
//! caller asked for.
//!
//! # Features
//!
//! - **Stream, block and tail readers** over one signal, sharing the [`SampleRead`] contract
//! - **Multi-signal alignment** to a common rate and start time with [`MultiReader`]
//! - **Time reconstruction** of domain values as `chrono` time points with [`TimeReader`]
//! - **Runtime-typed reads** through [`TypedReader`] when the sample type is only known
//!   from the descriptor
//! - **Async polling** of any reader as a `futures::Stream` (see [`stream`])
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use signal_reader::{DataDescriptor, SampleRead, SampleType, Scalar, Signal, StreamReader};
//!
//! # fn main() -> signal_reader::Result<()> {
//! let descriptor = DataDescriptor::builder(SampleType::Int16).build()?;
//! let signal = Signal::with_descriptors("ai0", descriptor, None);
//! let mut reader = StreamReader::builder(&signal).value_read_type(SampleType::Float64).build()?;
//!
//! signal.send_samples(&[1i16, 2, 3], Scalar::Int(0))?;
//! let mut values = [0.0f64; 3];
//! let outcome = reader.read(&mut values, 3, Duration::ZERO)?;
//! assert_eq!(outcome.count, 3);
//! assert_eq!(values, [1.0, 2.0, 3.0]);
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod codec;
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Packet transport and readers
pub mod connection;
pub mod reader;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use codec::{DiscardSink, RawSink, SampleKind, SampleSink, SourceSegment, TypedSink};
pub use config::{MultiReaderConfig, ReaderConfig, ReaderKind};
pub use connection::{ConnectionQueue, InputPort, ReaderSource, Signal};
pub use reader::*;
pub use stream::{Chunk, SampleStream, SampleStreamExt};
