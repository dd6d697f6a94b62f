//! Shape and strides of caller buffers

use crate::{ReaderError, Result};

/// Row-major shape and element strides of an output buffer.
///
/// Block readers lay samples out as `[blocks, block_size]`; multi readers use the
/// channel-major `[signals, count]`, so signal `i` starts at `i * count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl BufferLayout {
    pub fn stream(count: usize) -> Self {
        BufferLayout { shape: vec![count], strides: vec![1] }
    }

    pub fn block(blocks: usize, block_size: usize) -> Self {
        BufferLayout { shape: vec![blocks, block_size], strides: vec![block_size, 1] }
    }

    pub fn channel_major(signals: usize, count: usize) -> Self {
        BufferLayout { shape: vec![signals, count], strides: vec![count, 1] }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element offset of a multi-dimensional index.
    pub fn offset(&self, index: &[usize]) -> usize {
        index.iter().zip(&self.strides).map(|(i, stride)| i * stride).sum()
    }

    /// Fail unless a buffer of `provided` elements can hold this layout.
    pub fn check(&self, context: &str, provided: usize) -> Result<()> {
        if provided < self.len() {
            return Err(ReaderError::buffer_too_small(context, self.len(), provided));
        }
        Ok(())
    }
}
