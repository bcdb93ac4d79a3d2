//! Typed PCM samples and their byte views.

use crate::config::SampleFormat;
use dasp_sample::FromSample;

/// A PCM sample type that can be sent through the handoff as raw bytes.
pub trait PcmSample: bytemuck::Pod + FromSample<f32> + Send + 'static {
    const FORMAT: SampleFormat;
}

impl PcmSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::S16;
}

impl PcmSample for u16 {
    const FORMAT: SampleFormat = SampleFormat::U16;
}

impl PcmSample for i8 {
    const FORMAT: SampleFormat = SampleFormat::S8;
}

impl PcmSample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;
}

pub fn as_bytes<S: PcmSample>(samples: &[S]) -> &[u8] {
    bytemuck::cast_slice(samples)
}

/// Copy raw native-endian bytes back into samples. Trailing bytes that do not make a
/// whole sample are dropped.
pub fn from_bytes<S: PcmSample>(bytes: &[u8]) -> Vec<S> {
    let whole = bytes.len() - bytes.len() % std::mem::size_of::<S>();
    bytemuck::pod_collect_to_vec(&bytes[..whole])
}

/// Sine generator used by the demo binaries.
pub struct SineTone {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl SineTone {
    pub fn new(frequency: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            phase: 0.0,
            step: frequency / sample_rate as f32,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    pub fn next_sample<S: PcmSample>(&mut self) -> S {
        let value = (self.phase * std::f32::consts::TAU).sin() * self.amplitude;
        self.phase = (self.phase + self.step).fract();
        S::from_sample_(value)
    }
}
