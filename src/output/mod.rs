//! Output session: one [`Handoff`] feeding one device backend.

#[cfg(feature = "native-host")]
mod cpal_host;
mod error;
mod manual;

#[cfg(feature = "native-host")]
pub use cpal_host::{CpalBackend, HostInfo};
pub use error::OutputError;
pub use manual::ManualBackend;

use crate::config::StreamConfig;
use crate::handoff::{Delivery, Handoff, RoundStats};
use crate::samples::{self, PcmSample};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// The device side of an output session.
///
/// A backend owns whatever thread calls [`Handoff::fill`], and must silence-fill each
/// buffer before passing it in. New backends start paused.
pub trait OutputBackend {
    fn set_paused(&mut self, paused: bool) -> Result<(), OutputError>;
    fn close(&mut self) -> Result<(), OutputError>;

    /// Frames per device callback, when the backend knows it.
    fn block_frames(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

struct Control<B> {
    backend: Option<B>,
    /// What the caller asked for.
    user_paused: bool,
    /// What the backend is actually doing.
    device_paused: bool,
    /// A send is in flight.
    have_data: bool,
}

impl<B: OutputBackend> Control<B> {
    fn apply_device_pause(&mut self, paused: bool) -> Result<(), OutputError> {
        let backend = self.backend.as_mut().ok_or(OutputError::Closed)?;
        backend.set_paused(paused)?;
        self.device_paused = paused;
        Ok(())
    }
}

/// A playing (or paused) audio stream fed by blocking sends.
///
/// Unpausing is deferred until a send actually carries samples, so the device does not
/// start pulling silence-completed blocks before the producer has anything to say.
pub struct AudioOutput<B: OutputBackend> {
    handoff: Arc<Handoff>,
    config: StreamConfig,
    obtained: StreamConfig,
    control: Mutex<Control<B>>,
}

impl<B: OutputBackend> AudioOutput<B> {
    /// Validate `config`, create the handoff and let `factory` build the backend around it.
    pub fn open<F>(config: StreamConfig, factory: F) -> Result<Self, OutputError>
    where
        F: FnOnce(&StreamConfig, Arc<Handoff>) -> Result<B, OutputError>,
    {
        config.validate()?;
        let handoff = Arc::new(Handoff::new());
        let backend = factory(&config, Arc::clone(&handoff))?;
        let obtained = StreamConfig {
            block_frames: backend.block_frames().unwrap_or(config.block_frames),
            ..config.clone()
        };
        debug!(
            sample_rate = obtained.sample_rate,
            channels = obtained.channels,
            requested_frames = config.block_frames,
            block_bytes = obtained.block_bytes(),
            "output opened"
        );

        Ok(Self {
            handoff,
            config,
            obtained,
            control: Mutex::new(Control {
                backend: Some(backend),
                user_paused: true,
                device_paused: true,
                have_data: false,
            }),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// The config the device runs with. Differs from [`config`](Self::config) only in
    /// `block_frames`, when the backend could not honor the requested block size.
    pub fn obtained(&self) -> &StreamConfig {
        &self.obtained
    }

    pub fn handoff(&self) -> &Arc<Handoff> {
        &self.handoff
    }

    pub fn stats(&self) -> RoundStats {
        self.handoff.stats()
    }

    pub fn status(&self) -> PlaybackStatus {
        let control = self.control.lock();
        if control.backend.is_none() {
            PlaybackStatus::Stopped
        } else if control.device_paused {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Playing
        }
    }

    /// Pausing takes effect at once. Unpausing waits for the next send that carries
    /// samples, unless one is already in flight.
    pub fn pause(&self, paused: bool) -> Result<(), OutputError> {
        let mut control = self.control.lock();
        if control.backend.is_none() {
            return Err(OutputError::Closed);
        }

        control.user_paused = paused;
        if paused {
            if !control.device_paused {
                control.apply_device_pause(true)?;
            }
        } else if control.device_paused && control.have_data {
            control.apply_device_pause(false)?;
        }
        Ok(())
    }

    /// Send samples to the device, blocking until they are all consumed, or until
    /// [`interrupt`](Self::interrupt) or [`close`](Self::close) cuts the send short.
    pub fn send<S: PcmSample>(&self, samples: &[S]) -> Result<Delivery, OutputError> {
        if S::FORMAT != self.config.format {
            return Err(OutputError::FormatMismatch {
                expected: self.config.format,
                actual: S::FORMAT,
            });
        }
        if samples.is_empty() {
            return Ok(Delivery::default());
        }

        {
            let mut control = self.control.lock();
            if control.backend.is_none() {
                return Err(OutputError::Closed);
            }
            if !control.user_paused && control.device_paused {
                control.apply_device_pause(false)?;
            }
            control.have_data = true;
        }

        let delivery = self.handoff.push(samples::as_bytes(samples));

        self.control.lock().have_data = false;
        Ok(delivery)
    }

    pub fn send_i16(&self, samples: &[i16]) -> Result<Delivery, OutputError> {
        self.send(samples)
    }

    pub fn send_u16(&self, samples: &[u16]) -> Result<Delivery, OutputError> {
        self.send(samples)
    }

    pub fn send_i8(&self, samples: &[i8]) -> Result<Delivery, OutputError> {
        self.send(samples)
    }

    pub fn send_u8(&self, samples: &[u8]) -> Result<Delivery, OutputError> {
        self.send(samples)
    }

    /// Flush: complete the device's pending block with silence and cut a blocked send
    /// short. The stream keeps running.
    pub fn interrupt(&self) {
        self.handoff.unblock();
    }

    /// Release both sides of the handoff, pause the device and close the backend.
    ///
    /// Safe to call from another thread while a send is blocked, and more than once.
    pub fn close(&self) -> Result<(), OutputError> {
        let mut control = self.control.lock();
        let Some(mut backend) = control.backend.take() else {
            return Ok(());
        };

        // Shut down first: a host may wait for an in-flight callback before pausing.
        self.handoff.shutdown();
        let paused = backend.set_paused(true);
        control.user_paused = true;
        control.device_paused = true;
        drop(control);

        backend.close()?;
        debug!(stats = ?self.handoff.stats(), "output closed");
        paused
    }
}

impl<B: OutputBackend> Drop for AudioOutput<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("error while closing output: {}", err);
        }
    }
}
