//! CPAL-based output backend for native playback
//!
//! This module handles CPAL-specific functionality: host and device selection, stream
//! configuration, and wiring the stream callback to [`Handoff::fill`].

use super::{OutputBackend, OutputError};
use crate::config::{SampleFormat, StreamConfig};
use crate::handoff::Handoff;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, HostId, SizedSample, SupportedBufferSize, SupportedStreamConfigRange};
use std::sync::Arc;
use tracing::{info, warn};

/// Information about an available audio host
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub id: HostId,
    pub name: String,
    pub has_default_device: bool,
}

/// Backend that feeds a cpal output stream from a [`Handoff`].
pub struct CpalBackend {
    stream: Option<cpal::Stream>,
    host_name: String,
    device_name: String,
    block_frames: Option<usize>,
}

impl CpalBackend {
    /// List all available audio hosts on the system
    pub fn list_hosts() -> Vec<HostInfo> {
        let mut hosts = Vec::new();

        for host_id in cpal::available_hosts() {
            if let Ok(host) = cpal::host_from_id(host_id) {
                let has_default_device = host.default_output_device().is_some();
                hosts.push(HostInfo {
                    id: host_id,
                    name: host_id.name().to_string(),
                    has_default_device,
                });
            }
        }

        hosts
    }

    /// Open the default output device and build a paused stream whose callback pulls
    /// from `handoff`.
    ///
    /// `config.preferred_host` is tried first before falling back to the other hosts.
    pub fn open(config: &StreamConfig, handoff: Arc<Handoff>) -> Result<Self, OutputError> {
        config.validate()?;

        let (device, stream_config, host_name) = select_output_device(config)?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());

        info!(
            host = %host_name,
            device = %device_name,
            sample_rate = stream_config.sample_rate.0,
            channels = stream_config.channels,
            buffer = ?stream_config.buffer_size,
            "opening output stream"
        );

        let block_frames = match stream_config.buffer_size {
            BufferSize::Fixed(frames) => usize::try_from(frames).ok(),
            BufferSize::Default => None,
        };

        let stream = match config.format {
            SampleFormat::S16 => build_stream::<i16>(&device, &stream_config, handoff)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, handoff)?,
            SampleFormat::S8 => build_stream::<i8>(&device, &stream_config, handoff)?,
            SampleFormat::U8 => build_stream::<u8>(&device, &stream_config, handoff)?,
        };

        // Some hosts start streams on build.
        if let Err(err) = stream.pause() {
            warn!("could not pause new stream: {}", err);
        }

        Ok(Self {
            stream: Some(stream),
            host_name,
            device_name,
            block_frames,
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl OutputBackend for CpalBackend {
    fn set_paused(&mut self, paused: bool) -> Result<(), OutputError> {
        let stream = self.stream.as_ref().ok_or(OutputError::Closed)?;
        if paused {
            stream
                .pause()
                .map_err(|err| OutputError::PauseStream(err.to_string()))
        } else {
            stream
                .play()
                .map_err(|err| OutputError::PlayStream(err.to_string()))
        }
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if let Some(stream) = self.stream.take() {
            // Dropping the stream joins the callback thread.
            drop(stream);
            info!(device = %self.device_name, "output stream closed");
        }
        Ok(())
    }

    fn block_frames(&self) -> Option<usize> {
        self.block_frames
    }
}

fn cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::S16 => cpal::SampleFormat::I16,
        SampleFormat::U16 => cpal::SampleFormat::U16,
        SampleFormat::S8 => cpal::SampleFormat::I8,
        SampleFormat::U8 => cpal::SampleFormat::U8,
    }
}

fn matches_config(supported: &SupportedStreamConfigRange, config: &StreamConfig) -> bool {
    supported.sample_format() == cpal_format(config.format)
        && supported.channels() == config.channels
        && supported.min_sample_rate().0 <= config.sample_rate
        && supported.max_sample_rate().0 >= config.sample_rate
}

/// Select an output device that supports the requested format exactly
fn select_output_device(
    config: &StreamConfig,
) -> Result<(cpal::Device, cpal::StreamConfig, String), OutputError> {
    let preferred_host = config.preferred_host.as_deref();
    let available_hosts = cpal::available_hosts();

    for host_id in &available_hosts {
        let marker = if Some(host_id.name()) == preferred_host {
            " (preferred)"
        } else {
            ""
        };
        info!("available audio host: {}{}", host_id.name(), marker);
    }

    // Build host priority list: preferred first, then others
    let mut host_priority = Vec::new();
    if let Some(preferred) = preferred_host {
        if let Some(&host_id) = available_hosts.iter().find(|&h| h.name() == preferred) {
            host_priority.push(host_id);
        }
    }
    for host_id in available_hosts {
        if !host_priority.contains(&host_id) {
            host_priority.push(host_id);
        }
    }

    let mut last_error = None;
    for host_id in host_priority {
        let host_name = host_id.name().to_string();
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(err) => {
                last_error = Some(OutputError::NoDevice(format!("{}: {}", host_name, err)));
                continue;
            }
        };

        let Some(device) = host.default_output_device() else {
            last_error = Some(OutputError::NoDevice(format!(
                "host {} has no default output device",
                host_name
            )));
            continue;
        };

        let mut configs = match device.supported_output_configs() {
            Ok(configs) => configs,
            Err(err) => {
                last_error = Some(OutputError::NoDevice(format!(
                    "failed to enumerate output configs for host {}: {}",
                    host_name, err
                )));
                continue;
            }
        };

        let Some(supported) = configs.find(|supported| matches_config(supported, config)) else {
            last_error = Some(OutputError::UnsupportedFormat(config.format));
            continue;
        };

        let buffer_size = choose_buffer_size(supported.buffer_size(), config.block_frames);
        let mut stream_config = supported
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .config();
        stream_config.buffer_size = buffer_size;
        return Ok((device, stream_config, host_name));
    }

    Err(last_error.unwrap_or_else(|| OutputError::NoDevice("no audio hosts".into())))
}

/// Request the configured block size, clamped to what the device reports
fn choose_buffer_size(supported: &SupportedBufferSize, block_frames: usize) -> BufferSize {
    let desired = u32::try_from(block_frames).unwrap_or(u32::MAX);
    match *supported {
        SupportedBufferSize::Range { min, max } => BufferSize::Fixed(desired.clamp(min, max)),
        SupportedBufferSize::Unknown => BufferSize::Fixed(desired),
    }
}

/// Build an output stream for the given sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    handoff: Arc<Handoff>,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + bytemuck::Pod,
{
    let mut first_call = true;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if first_call {
                    info!(samples = data.len(), "first audio callback");
                    first_call = false;
                }

                // The handoff leaves unserved bytes untouched, so they must already be silence.
                data.fill(T::EQUILIBRIUM);
                let bytes: &mut [u8] = bytemuck::cast_slice_mut(data);
                if !bytes.is_empty() {
                    handoff.fill(bytes);
                }
            },
            move |err| {
                warn!("stream error: {}", err);
            },
            None,
        )
        .map_err(|err| OutputError::BuildStream(err.to_string()))
}
