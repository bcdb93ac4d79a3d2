pub mod batcher;
pub mod config;
pub mod handoff;
pub mod output;
pub mod samples;

pub use batcher::{SampleBatcher, SampleSink};
pub use config::{ConfigError, SampleFormat, StreamConfig};
pub use handoff::{Delivery, Handoff, RoundStats, Snapshot};
pub use output::{AudioOutput, ManualBackend, OutputBackend, OutputError, PlaybackStatus};
pub use samples::{PcmSample, SineTone};

#[cfg(feature = "native-host")]
pub use output::{CpalBackend, HostInfo};
