//! Polling a reader from async code

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::trace;

use crate::Result;
use crate::reader::{ReadStatus, SampleRead};
use crate::types::Sample;

/// Samples produced by one poll of the reader.
#[derive(Debug, Clone)]
pub struct Chunk<T, S> {
    pub values: Vec<T>,
    pub status: S,
}

/// Extension trait turning a reader into a [`Stream`] of chunks.
pub trait SampleStreamExt: SampleRead + Sized {
    /// Poll the reader every `period` for up to `chunk_size` read units.
    ///
    /// Must be called from within a tokio runtime.
    fn into_stream<T: Sample>(self, chunk_size: usize, period: Duration) -> SampleStream<Self, T> {
        SampleStream::new(self, chunk_size, period)
    }
}

impl<R: SampleRead> SampleStreamExt for R {}

pin_project! {
    /// A stream that reads without blocking on every interval tick.
    ///
    /// Ticks with no data and no event yield nothing. The stream ends after the
    /// reader reports `Fail` or returns an error.
    pub struct SampleStream<R, T> {
        reader: R,
        interval: Interval,
        chunk_size: usize,
        finished: bool,
        _sample: PhantomData<fn() -> T>,
    }
}

impl<R: SampleRead, T: Sample> SampleStream<R, T> {
    pub fn new(reader: R, chunk_size: usize, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        SampleStream {
            reader,
            interval,
            chunk_size: chunk_size.max(1),
            finished: false,
            _sample: PhantomData,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn into_reader(self) -> R {
        self.reader
    }
}

impl<R: SampleRead, T: Sample> Stream for SampleStream<R, T> {
    type Item = Result<Chunk<T, R::Status>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        loop {
            ready!(this.interval.poll_tick(cx));

            let block_size = this.reader.block_size();
            let mut values = vec![T::default(); *this.chunk_size * block_size];
            let outcome = match this.reader.read(&mut values, *this.chunk_size, Duration::ZERO) {
                Ok(outcome) => outcome,
                Err(err) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
            };

            let read_status = outcome.status.as_ref().read_status;
            if outcome.count == 0 && read_status == ReadStatus::Ok {
                continue;
            }
            if read_status == ReadStatus::Fail {
                *this.finished = true;
            }
            trace!(count = outcome.count, ?read_status, "chunk ready");
            values.truncate(outcome.count * block_size);
            return Poll::Ready(Some(Ok(Chunk { values, status: outcome.status })));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Signal;
    use crate::reader::{BlockReader, StreamReader};
    use crate::types::{DataDescriptor, SampleType, Scalar};
    use futures::StreamExt;

    fn signal() -> std::sync::Arc<Signal> {
        let value = DataDescriptor::builder(SampleType::Int32).build().unwrap();
        Signal::with_descriptors("ai0", value, None)
    }

    #[tokio::test]
    async fn yields_chunks_as_data_arrives() {
        let signal = signal();
        let reader = StreamReader::builder(&signal).build().unwrap();
        let mut stream = reader.into_stream::<i32>(4, Duration::from_millis(1));

        signal.send_samples(&[1i32, 2, 3, 4, 5, 6], Scalar::Int(0)).unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.values, vec![1, 2, 3, 4]);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.values, vec![5, 6]);
    }

    #[tokio::test]
    async fn events_are_yielded_with_the_preceding_samples() {
        let signal = signal();
        let reader = StreamReader::builder(&signal).build().unwrap();
        let mut stream = reader.into_stream::<f64>(8, Duration::from_millis(1));

        signal.send_samples(&[7i32], Scalar::Int(0)).unwrap();
        let narrower = DataDescriptor::builder(SampleType::Int16).build().unwrap();
        signal.set_descriptors(Some(narrower), None);

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.values, vec![7.0]);
        assert!(chunk.status.is_event());
    }

    #[tokio::test]
    async fn block_streams_deliver_whole_blocks() {
        let signal = signal();
        let reader = BlockReader::builder(&signal, 2).build().unwrap();
        let mut stream = reader.into_stream::<i32>(2, Duration::from_millis(1));

        signal.send_samples(&[1i32, 2, 3], Scalar::Int(0)).unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.values, vec![1, 2]);
    }
}
