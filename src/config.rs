//! Stream configuration shared by the output session and its backends.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 1;
const DEFAULT_BLOCK_FRAMES: usize = 2048;

/// Errors produced while loading or validating a [`StreamConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Sample encoding of the bytes that travel through the handoff.
///
/// Always native-endian for the 16-bit formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    S16,
    U16,
    S8,
    U8,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 | SampleFormat::U16 => 2,
            SampleFormat::S8 | SampleFormat::U8 => 1,
        }
    }

    /// Overwrite `bytes` with this format's silence.
    ///
    /// Signed formats are silent at zero, unsigned ones at the midpoint.
    pub fn fill_silence(self, bytes: &mut [u8]) {
        match self {
            SampleFormat::S16 | SampleFormat::S8 => bytes.fill(0),
            SampleFormat::U8 => bytes.fill(0x80),
            SampleFormat::U16 => {
                let pattern = 0x8000u16.to_ne_bytes();
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = pattern[i % 2];
                }
            }
        }
    }
}

/// Parameters of one audio stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: u32,
    /// 1 (mono) or 2 (interleaved stereo).
    pub channels: u16,
    /// Frames the device pulls per callback.
    pub block_frames: usize,
    pub format: SampleFormat,
    /// Audio host to try first (cpal host name, e.g. "ALSA" or "JACK").
    pub preferred_host: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            block_frames: DEFAULT_BLOCK_FRAMES,
            format: SampleFormat::S16,
            preferred_host: None,
        }
    }
}

impl StreamConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(ConfigError::Invalid(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.block_frames == 0 {
            return Err(ConfigError::Invalid("block_frames must be positive".into()));
        }
        Ok(())
    }

    pub fn frame_bytes(&self) -> usize {
        usize::from(self.channels) * self.format.bytes_per_sample()
    }

    /// Bytes the device asks for in one callback.
    pub fn block_bytes(&self) -> usize {
        self.block_frames * self.frame_bytes()
    }
}
