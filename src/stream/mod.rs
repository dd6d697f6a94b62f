//! Async adapters over the synchronous readers

mod sample_stream;

pub use sample_stream::{Chunk, SampleStream, SampleStreamExt};
