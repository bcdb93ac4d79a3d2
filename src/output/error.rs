use crate::config::{ConfigError, SampleFormat};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no usable output device: {0}")]
    NoDevice(String),
    #[error("device does not support {0:?} output")]
    UnsupportedFormat(SampleFormat),
    #[error("stream expects {expected:?} samples, got {actual:?}")]
    FormatMismatch {
        expected: SampleFormat,
        actual: SampleFormat,
    },
    #[error("failed to build output stream: {0}")]
    BuildStream(String),
    #[error("failed to start output stream: {0}")]
    PlayStream(String),
    #[error("failed to pause output stream: {0}")]
    PauseStream(String),
    #[error("failed to spawn device thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("device thread panicked")]
    DeviceThreadPanicked,
    #[error("output is closed")]
    Closed,
}
