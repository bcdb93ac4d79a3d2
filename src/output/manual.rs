//! Device stand-in that pulls blocks on its own thread.
//!
//! Behaves like a driver callback thread: it pre-fills each block with silence, calls
//! [`Handoff::fill`], then hands the finished block to a sink. Useful for offline
//! rendering, where the sink writes to a file instead of a sound card.

use super::{OutputBackend, OutputError};
use crate::config::StreamConfig;
use crate::handoff::Handoff;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace};

#[derive(Default)]
struct Gate {
    paused: bool,
    closed: bool,
}

#[derive(Default)]
struct ClockShared {
    gate: Mutex<Gate>,
    changed: Condvar,
}

pub struct ManualBackend {
    shared: Arc<ClockShared>,
    handoff: Arc<Handoff>,
    block_frames: usize,
    worker: Option<JoinHandle<u64>>,
}

impl ManualBackend {
    /// Start the device thread, paused. `sink` receives every completed block.
    pub fn spawn<F>(
        config: &StreamConfig,
        handoff: Arc<Handoff>,
        mut sink: F,
    ) -> Result<Self, OutputError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        config.validate()?;

        let shared = Arc::new(ClockShared {
            gate: Mutex::new(Gate {
                paused: true,
                closed: false,
            }),
            changed: Condvar::new(),
        });

        let format = config.format;
        let mut block = vec![0u8; config.block_bytes()];
        let worker = {
            let shared = Arc::clone(&shared);
            let handoff = Arc::clone(&handoff);
            std::thread::Builder::new()
                .name("pcm-handoff-device".into())
                .spawn(move || {
                    let mut blocks = 0u64;
                    loop {
                        {
                            let mut gate = shared.gate.lock();
                            while gate.paused && !gate.closed {
                                shared.changed.wait(&mut gate);
                            }
                            if gate.closed {
                                break;
                            }
                        }

                        // A shut-down handoff returns at once; stop instead of spinning.
                        if handoff.is_shut_down() {
                            break;
                        }
                        format.fill_silence(&mut block);
                        handoff.fill(&mut block);
                        sink(&block);
                        blocks += 1;
                        trace!(blocks, "device block complete");
                        if handoff.is_shut_down() {
                            break;
                        }
                    }
                    blocks
                })
                .map_err(OutputError::Spawn)?
        };

        Ok(Self {
            shared,
            handoff,
            block_frames: config.block_frames,
            worker: Some(worker),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.shared.gate.lock().paused
    }
}

impl OutputBackend for ManualBackend {
    fn set_paused(&mut self, paused: bool) -> Result<(), OutputError> {
        let mut gate = self.shared.gate.lock();
        if gate.closed {
            return Err(OutputError::Closed);
        }
        gate.paused = paused;
        self.shared.changed.notify_all();
        Ok(())
    }

    fn block_frames(&self) -> Option<usize> {
        Some(self.block_frames)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        {
            let mut gate = self.shared.gate.lock();
            gate.closed = true;
            self.shared.changed.notify_all();
        }
        // A block may be parked in `fill`.
        self.handoff.shutdown();

        let blocks = worker
            .join()
            .map_err(|_| OutputError::DeviceThreadPanicked)?;
        debug!(blocks, "device thread stopped");
        Ok(())
    }
}

impl Drop for ManualBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
