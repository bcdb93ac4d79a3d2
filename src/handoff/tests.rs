use super::{Delivery, Handoff, Region, Snapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_until(handoff: &Handoff, what: &str, pred: impl Fn(&Snapshot) -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !pred(&handoff.snapshot()) {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Run `push` on its own thread; the delivery arrives on the returned channel.
fn spawn_push(handoff: &Arc<Handoff>, src: Vec<u8>) -> mpsc::Receiver<Delivery> {
    let (tx, rx) = mpsc::channel();
    let handoff = Arc::clone(handoff);
    thread::spawn(move || {
        let delivery = handoff.push(&src);
        let _ = tx.send(delivery);
    });
    rx
}

/// Run `fill` on its own thread with a zeroed buffer of `len` bytes.
fn spawn_fill(handoff: &Arc<Handoff>, len: usize) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let handoff = Arc::clone(handoff);
    thread::spawn(move || {
        let mut dest = vec![0u8; len];
        handoff.fill(&mut dest);
        let _ = tx.send(dest);
    });
    rx
}

#[test]
fn one_push_spans_two_fills() {
    let handoff = Arc::new(Handoff::new());
    let pushed = spawn_push(&handoff, (0..10).collect());

    let mut first = [0u8; 4];
    handoff.fill(&mut first);
    assert_eq!(first, [0, 1, 2, 3]);

    // The producer still owes 6 bytes, so it cannot have returned yet.
    assert!(pushed.try_recv().is_err());

    let mut second = [0u8; 6];
    handoff.fill(&mut second);
    assert_eq!(second, [4, 5, 6, 7, 8, 9]);

    let delivery = pushed.recv_timeout(TIMEOUT).expect("push did not return");
    assert_eq!(
        delivery,
        Delivery {
            delivered: 10,
            interrupted: false
        }
    );
    assert_eq!(handoff.snapshot(), Snapshot::default());
}

#[test]
fn fill_takes_exactly_the_requested_prefix() {
    let handoff = Arc::new(Handoff::new());
    let src: Vec<u8> = (0..100).collect();
    let pushed = spawn_push(&handoff, src.clone());

    let mut dest = vec![0u8; 64];
    handoff.fill(&mut dest);
    assert_eq!(dest, src[..64]);

    wait_until(&handoff, "producer to park", |s| {
        s.producer_active && !s.in_round()
    });
    handoff.unblock();

    let delivery = pushed.recv_timeout(TIMEOUT).expect("push did not return");
    assert_eq!(delivery.delivered, 64);
    assert!(delivery.interrupted);
}

#[test]
fn several_pushes_complete_one_fill() {
    let handoff = Arc::new(Handoff::new());
    let filled = spawn_fill(&handoff, 8);

    // Each chunk is smaller than the outstanding request, so every push returns as soon as
    // its bytes are copied.
    let chunks: [&[u8]; 3] = [&[1, 2, 3], &[4, 5, 6], &[7, 8]];
    for chunk in chunks {
        let delivery = handoff.push(chunk);
        assert_eq!(delivery.delivered, chunk.len());
        assert!(!delivery.interrupted);
    }

    let dest = filled.recv_timeout(TIMEOUT).expect("fill did not return");
    assert_eq!(dest, [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn misaligned_chunks_preserve_byte_order() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let total = 20_000;
    let src: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < total {
        let len = rng.random_range(1..=700).min(total - offset);
        chunks.push(src[offset..offset + len].to_vec());
        offset += len;
    }

    let mut requests = Vec::new();
    let mut requested = 0;
    while requested < total {
        let len = rng.random_range(1..=500).min(total - requested);
        requests.push(len);
        requested += len;
    }

    let handoff = Arc::new(Handoff::new());
    let producer = {
        let handoff = Arc::clone(&handoff);
        thread::spawn(move || {
            chunks
                .iter()
                .map(|chunk| handoff.push(chunk))
                .collect::<Vec<_>>()
        })
    };

    let rounds = requests.len();
    let mut received = Vec::with_capacity(total);
    for len in requests {
        let mut dest = vec![0u8; len];
        handoff.fill(&mut dest);
        received.extend_from_slice(&dest);
    }

    let deliveries = producer.join().expect("producer panicked");
    assert!(deliveries.iter().all(|d| !d.interrupted));
    assert_eq!(deliveries.iter().map(|d| d.delivered).sum::<usize>(), total);
    assert_eq!(received, src);
    assert_eq!(handoff.stats().rounds, rounds as u64);
}

#[test]
fn counters_stay_consistent_while_running() {
    let handoff = Arc::new(Handoff::new());
    let done = Arc::new(AtomicBool::new(false));

    let monitor = {
        let handoff = Arc::clone(&handoff);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut samples = 0usize;
            while !done.load(Ordering::Relaxed) {
                let s = handoff.snapshot();
                if s.in_round() {
                    assert_eq!(s.needed + s.available, s.requested, "{:?}", s);
                } else {
                    assert_eq!((s.needed, s.available), (0, 0), "{:?}", s);
                }
                samples += 1;
            }
            samples
        })
    };

    let producer = {
        let handoff = Arc::clone(&handoff);
        thread::spawn(move || {
            let block: Vec<u8> = (0..=255).collect();
            for _ in 0..50 {
                handoff.push(&block[..97]);
                handoff.push(&block);
            }
        })
    };

    // 50 * (97 + 256) bytes in requests of 353.
    for _ in 0..50 {
        let mut dest = [0u8; 353];
        handoff.fill(&mut dest);
        assert_eq!(&dest[..97], &(0..97).collect::<Vec<u8>>()[..]);
    }

    producer.join().expect("producer panicked");
    done.store(true, Ordering::Relaxed);
    assert!(monitor.join().expect("monitor panicked") > 0);
    assert_eq!(handoff.stats().rounds, 50);
}

#[test]
fn unblock_releases_parked_consumer_with_silence() {
    let handoff = Arc::new(Handoff::new());
    let filled = spawn_fill(&handoff, 16);

    wait_until(&handoff, "demand", |s| s.needed == 16);
    let delivery = handoff.push(&[9, 9, 9, 9, 9]);
    assert_eq!(delivery.delivered, 5);
    assert!(!delivery.interrupted);

    let started = Instant::now();
    handoff.unblock();
    let dest = filled.recv_timeout(TIMEOUT).expect("fill stayed parked");
    assert!(started.elapsed() < TIMEOUT);

    assert_eq!(&dest[..5], &[9, 9, 9, 9, 9]);
    assert!(dest[5..].iter().all(|&b| b == 0));

    let stats = handoff.stats();
    assert_eq!(stats.rounds, 1);
    assert_eq!(stats.silenced_rounds, 1);
    assert_eq!(handoff.snapshot(), Snapshot::default());
}

#[test]
fn interrupted_push_is_a_short_write_without_recopy() {
    let handoff = Arc::new(Handoff::new());
    let src: Vec<u8> = (100..120).collect();
    let pushed = spawn_push(&handoff, src.clone());

    let mut first = [0u8; 8];
    handoff.fill(&mut first);
    assert_eq!(first, src[..8]);

    wait_until(&handoff, "producer to park", |s| {
        s.producer_active && !s.in_round()
    });
    handoff.unblock();

    let delivery = pushed.recv_timeout(TIMEOUT).expect("push did not return");
    assert!(delivery.interrupted);
    assert_eq!(delivery.delivered, 8);
    assert!(delivery.delivered < src.len());

    // The owner resumes from the reported offset.
    let resumed = spawn_push(&handoff, src[delivery.delivered..].to_vec());
    let mut second = [0u8; 12];
    handoff.fill(&mut second);
    assert_eq!(second, src[8..]);
    let delivery = resumed.recv_timeout(TIMEOUT).expect("push did not return");
    assert_eq!(delivery.delivered, 12);
    assert!(!delivery.interrupted);
}

#[test]
fn unblock_with_nobody_parked_changes_nothing() {
    let handoff = Arc::new(Handoff::new());
    handoff.unblock();
    handoff.unblock();
    assert_eq!(handoff.snapshot(), Snapshot::default());
    assert_eq!(handoff.stats().silenced_rounds, 0);

    let pushed = spawn_push(&handoff, vec![1, 2, 3]);
    let mut dest = [0u8; 3];
    handoff.fill(&mut dest);
    assert_eq!(dest, [1, 2, 3]);
    assert_eq!(
        pushed.recv_timeout(TIMEOUT).expect("push did not return"),
        Delivery {
            delivered: 3,
            interrupted: false
        }
    );
}

#[test]
fn empty_push_is_a_no_op() {
    let handoff = Handoff::new();
    assert_eq!(handoff.push(&[]), Delivery::default());
    assert!(!handoff.snapshot().producer_active);
}

#[test]
fn shutdown_releases_both_sides_for_good() {
    let handoff = Arc::new(Handoff::new());
    let pushed = spawn_push(&handoff, vec![7; 32]);
    wait_until(&handoff, "producer to park", |s| s.producer_active);

    handoff.shutdown();
    let delivery = pushed.recv_timeout(TIMEOUT).expect("push did not return");
    assert_eq!(
        delivery,
        Delivery {
            delivered: 0,
            interrupted: true
        }
    );

    let mut dest = [0u8; 4];
    handoff.fill(&mut dest);
    assert_eq!(dest, [0; 4]);
    assert_eq!(
        handoff.push(&[1]),
        Delivery {
            delivered: 0,
            interrupted: true
        }
    );
    assert!(handoff.is_shut_down());
}

#[test]
fn shutdown_completes_a_parked_fill() {
    let handoff = Arc::new(Handoff::new());
    let filled = spawn_fill(&handoff, 10);
    wait_until(&handoff, "demand", |s| s.needed == 10);

    handoff.shutdown();
    let dest = filled.recv_timeout(TIMEOUT).expect("fill stayed parked");
    assert_eq!(dest, vec![0; 10]);
}

#[test]
#[should_panic(expected = "empty buffer")]
fn empty_fill_is_fatal() {
    let handoff = Handoff::new();
    handoff.fill(&mut []);
}

#[test]
#[should_panic(expected = "another push")]
fn overlapping_push_is_fatal() {
    let handoff = Arc::new(Handoff::new());
    let _parked = spawn_push(&handoff, vec![1; 4]);
    wait_until(&handoff, "producer to park", |s| s.producer_active);
    handoff.push(&[2]);
}

#[test]
fn interrupt_wins_over_demand_posted_in_the_same_wait() {
    let handoff = Arc::new(Handoff::new());
    let pushed = spawn_push(&handoff, vec![1, 2, 3, 4, 5, 6]);
    wait_until(&handoff, "producer to park", |s| s.producer_active);

    // Land an unblock and a fresh request while the producer cannot run in between,
    // posting the request the way `fill` does.
    let mut dest = [0u8; 6];
    let len = dest.len();
    {
        let mut state = handoff.state.lock();
        handoff.interrupt(&mut state);
        state.region = Some(Region::new(&mut dest));
        state.needed = len;
        handoff.need.notify_one();
    }

    let delivery = pushed.recv_timeout(TIMEOUT).expect("push did not return");
    assert_eq!(
        delivery,
        Delivery {
            delivered: 0,
            interrupted: true
        }
    );
    // The request survives for the next push.
    let snapshot = handoff.snapshot();
    assert_eq!((snapshot.needed, snapshot.available), (6, 0));
    assert!(!snapshot.producer_active);

    let delivery = handoff.push(&[1, 2, 3, 4, 5, 6]);
    assert_eq!(delivery.delivered, 6);
    assert!(!delivery.interrupted);
    {
        let mut state = handoff.state.lock();
        assert_eq!(state.available, len);
        state.available = 0;
        state.region = None;
    }
    assert_eq!(dest, [1, 2, 3, 4, 5, 6]);
}

#[test]
#[should_panic(expected = "request is outstanding")]
fn fill_during_an_outstanding_request_is_fatal() {
    let handoff = Arc::new(Handoff::new());
    let _parked = spawn_fill(&handoff, 8);
    wait_until(&handoff, "demand", |s| s.needed == 8);

    let mut second = [0u8; 4];
    handoff.fill(&mut second);
}
