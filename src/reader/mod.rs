//! Reader engines over a signal's connection queue.
//!
//! [`StreamReader`], [`BlockReader`] and [`TailReader`] each wrap one signal and
//! share the [`SampleRead`] contract. [`MultiReader`] aligns several signals onto a
//! shared domain. [`TimeReader`] and [`TypedReader`] are front-ends over any
//! [`SampleRead`] implementation.
//!
//! ## Usage Example
//!
//! ```rust
//! use signal_reader::connection::Signal;
//! use signal_reader::reader::{SampleRead, StreamReader};
//! use signal_reader::types::{DataDescriptor, SampleType, Scalar};
//! use std::time::Duration;
//!
//! let value = DataDescriptor::builder(SampleType::Float64).build().unwrap();
//! let signal = Signal::with_descriptors("ai0", value, None);
//! let mut reader =
//!     StreamReader::builder(&signal).value_read_type(SampleType::Float64).build().unwrap();
//!
//! signal.send_samples(&[1.0f64, 2.0, 3.0], Scalar::Int(0)).unwrap();
//! let mut values = [0f64; 3];
//! let outcome = reader.read(&mut values, 3, Duration::ZERO).unwrap();
//! assert_eq!(outcome.count, 3);
//! assert_eq!(values, [1.0, 2.0, 3.0]);
//! ```

mod block;
mod cursor;
mod layout;
mod multi;
mod status;
mod stream;
mod tail;
mod time;
mod typed;

pub use block::{BlockReader, BlockReaderBuilder};
pub use cursor::ReaderOptions;
pub use layout::BufferLayout;
pub use multi::{MultiReader, MultiReaderBuilder};
pub use status::{MultiReaderStatus, ReadOutcome, ReadStatus, ReaderStatus, TailReaderStatus};
pub use stream::{StreamReader, StreamReaderBuilder};
pub use tail::{TailReader, TailReaderBuilder};
pub use time::{DomainResolver, TimeDomain, TimeReader, TimeSink, parse_origin};
pub use typed::{ProbeOutcome, SampleBuffer, TypedReader};

use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::codec::{DiscardSink, SampleSink, TypedSink};
use crate::types::{DataDescriptor, Sample, SampleType};

/// Common contract of the single-signal readers.
///
/// `count` is expressed in the reader's read unit: samples for stream and tail
/// readers, blocks for [`BlockReader`]. Buffers must hold `count * block_size()`
/// elements.
pub trait SampleRead {
    type Status: AsRef<ReaderStatus> + Clone + Default;

    /// Read into type-erased sinks; all other read methods delegate here.
    fn read_into(
        &mut self,
        values: &mut dyn SampleSink,
        domain: Option<&mut dyn SampleSink>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<Self::Status>>;

    /// Read units available without blocking.
    fn available_count(&mut self) -> usize;

    /// Last value descriptor seen by the reader.
    fn value_descriptor(&self) -> Option<Arc<DataDescriptor>>;

    /// Last domain descriptor seen by the reader.
    fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>>;

    fn options(&self) -> &ReaderOptions;

    /// False once a descriptor change made the configured read types unusable.
    fn is_valid(&self) -> bool;

    /// Samples per read unit.
    fn block_size(&self) -> usize {
        1
    }

    fn value_read_type(&self) -> SampleType {
        self.options().value_read_type
    }

    fn domain_read_type(&self) -> SampleType {
        self.options().domain_read_type
    }

    fn read<T: Sample>(
        &mut self,
        values: &mut [T],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<Self::Status>>
    where
        Self: Sized,
    {
        self.read_into(&mut TypedSink::new(values), None, count, timeout)
    }

    fn read_with_domain<T: Sample, D: Sample>(
        &mut self,
        values: &mut [T],
        domain: &mut [D],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome<Self::Status>>
    where
        Self: Sized,
    {
        let mut domain = TypedSink::new(domain);
        self.read_into(
            &mut TypedSink::new(values),
            Some(&mut domain as &mut dyn SampleSink),
            count,
            timeout,
        )
    }

    /// Advance past `count` read units without materialising them.
    fn skip_samples(&mut self, count: usize) -> Result<ReadOutcome<Self::Status>>
    where
        Self: Sized,
    {
        self.read_into(&mut DiscardSink, None, count, Duration::ZERO)
    }
}
