//! Play a tone on the default output device through the handoff.
//!
//! Usage: `native_demo [seconds] [config.json]`

use anyhow::Context;
use pcm_handoff::{
    AudioOutput, CpalBackend, SampleBatcher, SampleFormat, SineTone, StreamConfig,
};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TONE_HZ: f32 = 220.0;
const AMPLITUDE: f32 = 0.3;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let seconds: f32 = match args.next() {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("invalid duration: {}", arg))?,
        None => 3.0,
    };
    let config = match args.next() {
        Some(path) => StreamConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => StreamConfig::default(),
    };
    if config.format != SampleFormat::S16 {
        anyhow::bail!("the demo tone is 16-bit; got {:?}", config.format);
    }

    for host in CpalBackend::list_hosts() {
        info!(
            host = %host.name,
            default_device = host.has_default_device,
            "audio host"
        );
    }

    let output = AudioOutput::open(config.clone(), CpalBackend::open)
        .context("failed to open output device")?;
    output.pause(false)?;

    info!(seconds, "now playing");
    let duration = Duration::from_secs_f32(seconds);
    let started = Instant::now();
    let channels = usize::from(config.channels);
    let mut tone = SineTone::new(TONE_HZ, config.sample_rate, AMPLITUDE);
    let mut batcher = SampleBatcher::<i16, _>::new(&output, config.block_frames * channels);

    // Each full batch blocks until the device has taken it, so the loop runs at
    // playback speed.
    while started.elapsed() < duration {
        let sample: i16 = tone.next_sample();
        for _ in 0..channels {
            batcher.append(sample)?;
        }
    }
    output.close()?;

    let stats = output.stats();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        rounds = stats.rounds,
        avg_wait_us = stats.average_wait().as_micros() as u64,
        "stopped"
    );
    Ok(())
}
