//! Blocking byte handoff between a pull-based audio callback and a push-based producer.
//!
//! The device callback calls [`Handoff::fill`] with the buffer it has to hand back to the
//! driver. The producer calls [`Handoff::push`] with whatever it has decoded, in chunks of
//! any size. Bytes are copied straight into the callback's buffer, so there is no ring
//! buffer and no allocation on the real-time side.
//!
//! Exactly one consumer call and one producer call may be active at a time.

mod region;
#[cfg(test)]
mod tests;

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use region::Region;

/// Result of one [`Handoff::push`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Bytes copied into consumer buffers.
    pub delivered: usize,
    /// The call ended early because of [`Handoff::unblock`] or [`Handoff::shutdown`].
    pub interrupted: bool,
}

/// Why a producer waiting for demand woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    DemandPosted,
    Interrupted,
}

/// Timing of completed consumer rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub rounds: u64,
    /// Rounds completed (fully or partly) with silence by `unblock`.
    pub silenced_rounds: u64,
    pub last_wait: Duration,
    pub max_wait: Duration,
    pub total_wait: Duration,
}

impl RoundStats {
    pub fn average_wait(&self) -> Duration {
        if self.rounds == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_wait.as_nanos() / u128::from(self.rounds);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn record(&mut self, wait: Duration) {
        self.rounds += 1;
        self.last_wait = wait;
        self.max_wait = self.max_wait.max(wait);
        self.total_wait = self.total_wait.saturating_add(wait);
    }
}

/// Point-in-time copy of the channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub needed: usize,
    pub available: usize,
    /// Length of the buffer lent by the consumer call in progress, 0 between rounds.
    pub requested: usize,
    pub producer_active: bool,
    pub shut_down: bool,
}

impl Snapshot {
    pub fn in_round(&self) -> bool {
        self.requested > 0
    }
}

#[derive(Default)]
struct State {
    /// Bytes the consumer still wants this round.
    needed: usize,
    /// Bytes already written into the region this round.
    available: usize,
    region: Option<Region>,
    /// Bumped by every unblock; a producer compares it across its wait.
    interrupts: u64,
    producer_active: bool,
    shut_down: bool,
    stats: RoundStats,
}

impl State {
    /// Copy as much of `src` as the current round still needs.
    fn copy_in(&mut self, src: &[u8]) -> usize {
        let n = self.needed.min(src.len());
        let offset = self.available;
        let Some(region) = self.region.as_mut() else {
            panic!("demand of {} bytes posted without a destination", self.needed);
        };
        region.write_at(offset, &src[..n]);
        self.available += n;
        self.needed -= n;
        n
    }
}

/// Channel shared by the device callback, the producer and any controller thread.
///
/// Usually held in an `Arc`: one clone moves into the device callback, one stays with the
/// producer.
#[derive(Default)]
pub struct Handoff {
    state: Mutex<State>,
    /// Consumer -> producer: `needed` became positive, or an interrupt.
    need: Condvar,
    /// Producer -> consumer: the outstanding request is satisfied.
    avail: Condvar,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumer side. Blocks until `dest` has been completely handed over.
    ///
    /// `dest` must already hold silence: bytes not written by the producer (after an
    /// [`unblock`](Self::unblock)) are left as they are. After [`shutdown`](Self::shutdown)
    /// this returns at once.
    ///
    /// # Panics
    ///
    /// If `dest` is empty, or if another `fill` is still in progress.
    pub fn fill(&self, dest: &mut [u8]) {
        let len = dest.len();
        assert!(len > 0, "fill called with an empty buffer");

        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        assert_eq!(state.available, 0, "fill entered with undrained bytes");
        assert_eq!(state.needed, 0, "fill entered while a request is outstanding");

        let posted = Instant::now();
        state.region = Some(Region::new(dest));
        state.needed = len;
        self.need.notify_one();

        while !(state.needed == 0 && state.available == len) {
            self.avail.wait(&mut state);
        }

        state.available = 0;
        state.region = None;
        state.stats.record(posted.elapsed());
        trace!(len, "round complete");
    }

    /// Producer side. Copies `src` into consumer buffers, blocking while nobody asks for
    /// bytes.
    ///
    /// Returns once all of `src` is handed over, or once the current request is larger
    /// than what is left of `src` (the next call continues filling it), or when an
    /// interrupt arrives while waiting for demand. In the last case
    /// [`Delivery::interrupted`] is set and `delivered < src.len()`.
    ///
    /// # Panics
    ///
    /// If another `push` is still in progress.
    pub fn push(&self, src: &[u8]) -> Delivery {
        let mut delivery = Delivery::default();
        if src.is_empty() {
            return delivery;
        }

        let mut state = self.state.lock();
        assert!(
            !state.producer_active,
            "push called while another push is in progress"
        );
        state.producer_active = true;

        while delivery.delivered < src.len() {
            if state.shut_down {
                delivery.interrupted = true;
                break;
            }

            if state.needed == 0 && self.wait_for_demand(&mut state) == Wake::Interrupted {
                trace!(delivered = delivery.delivered, "producer interrupted");
                delivery.interrupted = true;
                break;
            }

            let copied = state.copy_in(&src[delivery.delivered..]);
            delivery.delivered += copied;

            if state.needed == 0 {
                self.avail.notify_one();
            }
        }

        state.producer_active = false;
        delivery
    }

    /// Release whoever is parked.
    ///
    /// An outstanding request is completed with the silence already in the consumer's
    /// buffer, and a producer waiting for demand returns with a short write. With nobody
    /// parked this leaves the counters untouched.
    pub fn unblock(&self) {
        let mut state = self.state.lock();
        self.interrupt(&mut state);
    }

    /// Like [`unblock`](Self::unblock), and every later `fill` and `push` returns
    /// immediately. Used at stream teardown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.shut_down {
            debug!("handoff shut down");
        }
        state.shut_down = true;
        self.interrupt(&mut state);
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            needed: state.needed,
            available: state.available,
            requested: state.region.as_ref().map_or(0, Region::len),
            producer_active: state.producer_active,
            shut_down: state.shut_down,
        }
    }

    pub fn stats(&self) -> RoundStats {
        self.state.lock().stats
    }

    fn wait_for_demand(&self, state: &mut MutexGuard<'_, State>) -> Wake {
        let generation = state.interrupts;
        while state.needed == 0 && state.interrupts == generation {
            self.need.wait(state);
        }

        if state.interrupts != generation {
            Wake::Interrupted
        } else {
            Wake::DemandPosted
        }
    }

    fn interrupt(&self, state: &mut MutexGuard<'_, State>) {
        if state.needed > 0 {
            debug!(
                silence = state.needed,
                available = state.available,
                "completing request with silence"
            );
            state.available += state.needed;
            state.needed = 0;
            state.stats.silenced_rounds += 1;
            self.avail.notify_one();
        }

        state.interrupts = state.interrupts.wrapping_add(1);
        self.need.notify_all();
    }
}
