//! Handoff buffer integration tests.
//!
//! Latest-value semantics across threads, shape rejection at the producer,
//! and a tearing stress test with a real producer thread.

use relay_common::consts::MAX_AXES;
use relay_common::relay::types::{CommandRecord, RecordError};
use relay_core::handoff::handoff;
use relay_core::producer::RecordPublisher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn record(values: &[f64]) -> CommandRecord {
    CommandRecord::from_slice(values).expect("record within capacity")
}

#[test]
fn publish_then_consume_yields_record_once() {
    let (tx, mut rx) = handoff(3);
    tx.publish(&record(&[1.0, 2.0, 3.0]));

    assert_eq!(rx.try_consume().unwrap().as_slice(), &[1.0, 2.0, 3.0]);
    assert!(rx.try_consume().is_none());
}

#[test]
fn only_newest_of_many_publishes_is_seen() {
    let (tx, mut rx) = handoff(1);
    for i in 1..=5 {
        tx.publish(&record(&[f64::from(i)]));
    }

    assert_eq!(rx.try_consume().unwrap().as_slice(), &[5.0]);
    assert!(rx.try_consume().is_none());

    let stats = rx.stats();
    assert_eq!(stats.published, 5);
    assert_eq!(stats.consumed, 1);
    assert_eq!(stats.overwritten, 4);
}

#[test]
fn never_published_buffer_is_empty() {
    let (_tx, mut rx) = handoff(4);
    assert!(!rx.has_pending());
    assert!(rx.try_consume().is_none());
}

#[test]
fn oversized_slice_is_refused_and_content_kept() {
    let (tx, mut rx) = handoff(2);
    tx.publish(&record(&[7.0, 8.0]));

    let oversized = vec![0.0; MAX_AXES + 1];
    assert_eq!(
        tx.publish_slice(&oversized),
        Err(RecordError::CapacityExceeded {
            capacity: MAX_AXES,
            received: MAX_AXES + 1,
        })
    );
    assert_eq!(rx.try_consume().unwrap().as_slice(), &[7.0, 8.0]);
}

#[test]
fn misshaped_record_does_not_reach_buffer() {
    let (tx, mut rx) = handoff(2);
    let mut publisher = RecordPublisher::new("relay", 2, tx);

    assert!(publisher.offer(&[1.0, 2.0]));
    assert!(!publisher.offer(&[1.0, 2.0, 3.0]));
    assert!(!publisher.offer(&[]));

    assert_eq!(rx.try_consume().unwrap().as_slice(), &[1.0, 2.0]);
    assert!(rx.try_consume().is_none());
    assert_eq!(publisher.rejected(), 2);
}

#[test]
fn force_set_replaces_pending_without_counting() {
    let (tx, mut rx) = handoff(2);
    tx.publish(&record(&[1.0, 1.0]));
    tx.force_set(&CommandRecord::sentinel(2));

    assert!(rx.try_consume().unwrap().is_sentinel());
    assert_eq!(rx.stats().published, 1);
}

#[test]
fn consumer_moves_to_another_thread() {
    let (tx, mut rx) = handoff(1);
    let reader = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(r) = rx.try_consume() {
                return r.as_slice()[0];
            }
            assert!(Instant::now() < deadline, "no record within 5 s");
            thread::yield_now();
        }
    });

    tx.publish(&record(&[42.0]));
    assert_eq!(reader.join().unwrap(), 42.0);
}

/// Every published record holds `[k, k+1, ..., k+n-1]` for one `k`. A torn
/// read would mix two values of `k`.
#[test]
fn concurrent_publish_never_tears() {
    const AXES: usize = 16;
    const PUBLISHES: u64 = 200_000;

    let (tx, mut rx) = handoff(AXES);
    let done = Arc::new(AtomicBool::new(false));

    let producer_done = Arc::clone(&done);
    let producer = thread::spawn(move || {
        let mut values = [0.0; AXES];
        for k in 0..PUBLISHES {
            for (i, v) in values.iter_mut().enumerate() {
                *v = (k + i as u64) as f64;
            }
            tx.publish_slice(&values).unwrap();
        }
        producer_done.store(true, Ordering::Release);
    });

    let mut seen = 0u64;
    let mut last_base = -1.0;
    loop {
        let finished = done.load(Ordering::Acquire);
        if let Some(r) = rx.try_consume() {
            let values = r.as_slice();
            assert_eq!(values.len(), AXES);
            let base = values[0];
            for (i, v) in values.iter().enumerate() {
                assert_eq!(*v, base + i as f64, "torn record: {values:?}");
            }
            assert!(base > last_base, "records went backwards");
            last_base = base;
            seen += 1;
        } else if finished {
            break;
        }
    }
    producer.join().unwrap();

    assert!(seen > 0);
    assert_eq!(last_base, (PUBLISHES - 1) as f64);
    let stats = rx.stats();
    assert_eq!(stats.published, PUBLISHES);
    assert_eq!(stats.consumed, seen);
}
