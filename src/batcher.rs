//! Fixed-size batching of individually produced samples.
//!
//! Emulators and synthesizers tend to produce one sample at a time; sending each through
//! the handoff would cost a lock round trip per sample.

use crate::handoff::Delivery;
use crate::output::{AudioOutput, OutputBackend, OutputError};
use crate::samples::PcmSample;
use std::sync::Arc;

/// Anything that accepts blocking sample sends.
pub trait SampleSink<S: PcmSample> {
    fn send_samples(&self, samples: &[S]) -> Result<Delivery, OutputError>;
}

impl<S: PcmSample, B: OutputBackend> SampleSink<S> for AudioOutput<B> {
    fn send_samples(&self, samples: &[S]) -> Result<Delivery, OutputError> {
        self.send(samples)
    }
}

impl<S: PcmSample, T: SampleSink<S> + ?Sized> SampleSink<S> for Arc<T> {
    fn send_samples(&self, samples: &[S]) -> Result<Delivery, OutputError> {
        (**self).send_samples(samples)
    }
}

impl<S: PcmSample, T: SampleSink<S> + ?Sized> SampleSink<S> for &T {
    fn send_samples(&self, samples: &[S]) -> Result<Delivery, OutputError> {
        (**self).send_samples(samples)
    }
}

pub struct SampleBatcher<S: PcmSample, K: SampleSink<S>> {
    sink: K,
    block: Vec<S>,
    filled: usize,
}

impl<S: PcmSample, K: SampleSink<S>> SampleBatcher<S, K> {
    pub fn new(sink: K, block_len: usize) -> Self {
        let block_len = block_len.max(1);
        Self {
            sink,
            block: vec![S::zeroed(); block_len],
            filled: 0,
        }
    }

    pub fn block_len(&self) -> usize {
        self.block.len()
    }

    /// Samples waiting for the block to fill up.
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Queue one sample; sends the block (blocking) when it becomes full.
    pub fn append(&mut self, sample: S) -> Result<Option<Delivery>, OutputError> {
        self.block[self.filled] = sample;
        self.filled += 1;

        if self.filled == self.block.len() {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Send whatever is queued, even a partial block.
    pub fn flush(&mut self) -> Result<Delivery, OutputError> {
        let filled = std::mem::take(&mut self.filled);
        self.sink.send_samples(&self.block[..filled])
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}
