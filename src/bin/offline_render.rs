//! Render a tone through the handoff into a WAV file.
//!
//! Usage: `offline_render [output.wav] [config.json]`
//!
//! A device thread pulls fixed blocks exactly like a sound card callback would, while the
//! main thread produces samples one at a time through a [`SampleBatcher`] whose block size
//! deliberately does not match the device's.

use anyhow::Context;
use parking_lot::Mutex;
use pcm_handoff::{
    AudioOutput, ManualBackend, SampleBatcher, SampleFormat, SineTone, StreamConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TONE_HZ: f32 = 440.0;
const AMPLITUDE: f32 = 0.5;
const SECONDS: f32 = 2.0;
const PRODUCER_BLOCK: usize = 441;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let out_path = args.next().unwrap_or_else(|| "handoff_render.wav".to_string());
    let config = match args.next() {
        Some(path) => StreamConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => StreamConfig::default(),
    };
    if config.format != SampleFormat::S16 {
        anyhow::bail!("offline rendering writes 16-bit WAV; got {:?}", config.format);
    }

    let rendered = Arc::new(Mutex::new(Vec::<u8>::new()));
    let output = {
        let rendered = Arc::clone(&rendered);
        AudioOutput::open(config.clone(), move |config, handoff| {
            ManualBackend::spawn(config, handoff, move |block| {
                rendered.lock().extend_from_slice(block)
            })
        })
        .context("failed to open output")?
    };
    output.pause(false)?;

    let channels = usize::from(config.channels);
    let total_frames = (config.sample_rate as f32 * SECONDS) as usize;
    let mut tone = SineTone::new(TONE_HZ, config.sample_rate, AMPLITUDE);
    let mut batcher = SampleBatcher::<i16, _>::new(&output, PRODUCER_BLOCK * channels);

    info!(
        frames = total_frames,
        device_block = config.block_frames,
        producer_block = PRODUCER_BLOCK,
        "rendering"
    );
    for _ in 0..total_frames {
        let sample: i16 = tone.next_sample();
        for _ in 0..channels {
            batcher.append(sample)?;
        }
    }
    batcher.flush()?;
    output.close()?;

    let stats = output.stats();
    info!(
        rounds = stats.rounds,
        silenced = stats.silenced_rounds,
        avg_wait_us = stats.average_wait().as_micros() as u64,
        max_wait_us = stats.max_wait.as_micros() as u64,
        "device finished"
    );

    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&out_path, spec)
        .with_context(|| format!("failed to create {}", out_path))?;
    let samples = pcm_handoff::samples::from_bytes::<i16>(&rendered.lock());
    for sample in &samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize().context("failed to finalize WAV")?;

    info!(path = %out_path, samples = samples.len(), "wrote WAV");
    Ok(())
}
