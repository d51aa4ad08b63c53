//! Single-slot handoff buffer between one producer and the real-time consumer.
//!
//! Latest-value semantics: every publish replaces the pending record, and a
//! record that was never consumed is lost. The consumer sees either "no
//! update" or one complete record, never a mix of two publishes.
//!
//! # Layout
//!
//! A triple buffer: three record slots and one atomic index word.
//!
//! ```text
//!   producer (back) ──publish──► middle ◄──swap── consumer (front)
//!                                  │
//!                        bit 2 = FRESH (unconsumed)
//! ```
//!
//! The producer writes into its private back slot, then swaps it with the
//! middle slot and sets the fresh bit. The consumer swaps its front slot
//! with the middle slot only when the fresh bit is set. Each slot is owned
//! by exactly one side at any time, so the copy in and out never races.
//!
//! # Timing
//!
//! | Side | Operation | Cost |
//! |------|-----------|------|
//! | Consumer | `try_consume()` | one load, one swap, no lock (wait-free) |
//! | Producer | `publish()` / `force_set()` | short mutex + bounded copy + swap |
//!
//! The producer mutex only serializes the two non-real-time writers (the
//! producer thread and the management context); the consumer never takes it.

use relay_common::relay::types::{CommandRecord, RecordError};
use std::cell::UnsafeCell;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const INDEX_MASK: u8 = 0b011;
const FRESH: u8 = 0b100;

/// Snapshot of handoff counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandoffStats {
    /// Records published by the producer (excluding administrative sets).
    pub published: u64,
    /// Records handed to the consumer.
    pub consumed: u64,
    /// Records replaced before the consumer saw them.
    pub overwritten: u64,
}

struct Shared {
    slots: [UnsafeCell<CommandRecord>; 3],
    /// Index of the middle slot plus the `FRESH` bit.
    middle: AtomicU8,
    /// Index of the producer's back slot. Held while writing it.
    back: Mutex<u8>,
    published: AtomicU64,
    consumed: AtomicU64,
    overwritten: AtomicU64,
}

// SAFETY: a slot is only dereferenced by the side that currently owns its
// index. The producer owns `back` (under the mutex), the single consumer owns
// `front`, and ownership moves only through the atomic swap on `middle`,
// whose AcqRel ordering publishes the slot contents to the new owner.
unsafe impl Sync for Shared {}

impl Shared {
    /// Write into the back slot and exchange it with the middle slot.
    ///
    /// Returns `true` if an unconsumed record was overwritten.
    fn write_with<F, E>(&self, fill: F) -> Result<bool, E>
    where
        F: FnOnce(&mut CommandRecord) -> Result<(), E>,
    {
        let mut back = self.back.lock().unwrap_or_else(PoisonError::into_inner);

        // SAFETY: the back index is exclusively ours while the mutex is held.
        let slot = unsafe { &mut *self.slots[usize::from(*back)].get() };
        fill(slot)?;

        let previous = self.middle.swap(*back | FRESH, Ordering::AcqRel);
        *back = previous & INDEX_MASK;
        Ok(previous & FRESH != 0)
    }
}

/// Create a connected producer / consumer pair.
///
/// All three slots start as sentinel records of `axis_count` values, and
/// nothing is pending.
pub fn handoff(axis_count: usize) -> (HandoffProducer, HandoffConsumer) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(CommandRecord::sentinel(axis_count)),
            UnsafeCell::new(CommandRecord::sentinel(axis_count)),
            UnsafeCell::new(CommandRecord::sentinel(axis_count)),
        ],
        middle: AtomicU8::new(1),
        back: Mutex::new(0),
        published: AtomicU64::new(0),
        consumed: AtomicU64::new(0),
        overwritten: AtomicU64::new(0),
    });

    (
        HandoffProducer {
            shared: Arc::clone(&shared),
        },
        HandoffConsumer { shared, front: 2 },
    )
}

/// Writing side. Cloneable: the producer thread and the management context
/// each hold one.
#[derive(Clone)]
pub struct HandoffProducer {
    shared: Arc<Shared>,
}

impl HandoffProducer {
    /// Replace the pending record with a copy of `record`.
    pub fn publish(&self, record: &CommandRecord) {
        let Ok(overwritten) = self.shared.write_with(|slot| {
            slot.copy_from(record);
            Ok::<(), Infallible>(())
        });
        self.count_publish(overwritten);
    }

    /// Replace the pending record with `values`, copied straight into the slot.
    ///
    /// # Errors
    /// `RecordError::CapacityExceeded` if `values` does not fit a record; the
    /// pending record is left untouched.
    pub fn publish_slice(&self, values: &[f64]) -> Result<(), RecordError> {
        let overwritten = self.shared.write_with(|slot| slot.set_from_slice(values))?;
        self.count_publish(overwritten);
        Ok(())
    }

    /// Administrative overwrite (activation / deactivation sentinel).
    ///
    /// Same exchange as [`publish`](Self::publish) but not counted as a
    /// producer publish.
    pub fn force_set(&self, record: &CommandRecord) {
        let _ = self.shared.write_with(|slot| {
            slot.copy_from(record);
            Ok::<(), Infallible>(())
        });
    }

    /// Counter snapshot.
    pub fn stats(&self) -> HandoffStats {
        stats_of(&self.shared)
    }

    fn count_publish(&self, overwritten: bool) {
        self.shared.published.fetch_add(1, Ordering::Relaxed);
        if overwritten {
            self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for HandoffProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffProducer")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Reading side. Exactly one exists per buffer; it is `Send` but not
/// `Clone`, which keeps the single-consumer contract in the type system.
pub struct HandoffConsumer {
    shared: Arc<Shared>,
    front: u8,
}

impl HandoffConsumer {
    /// Most recent record not yet returned, or `None`.
    ///
    /// Wait-free: one atomic load, at most one atomic swap, no copy. The
    /// returned record stays valid until the next call.
    #[inline]
    pub fn try_consume(&mut self) -> Option<&CommandRecord> {
        if self.shared.middle.load(Ordering::Relaxed) & FRESH == 0 {
            return None;
        }
        let previous = self.shared.middle.swap(self.front, Ordering::AcqRel);
        self.front = previous & INDEX_MASK;
        self.shared.consumed.fetch_add(1, Ordering::Relaxed);

        // SAFETY: the front index is owned by this (single) consumer until
        // the next swap, which needs `&mut self`.
        Some(unsafe { &*self.shared.slots[usize::from(self.front)].get() })
    }

    /// `true` if a record is waiting.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.shared.middle.load(Ordering::Acquire) & FRESH != 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> HandoffStats {
        stats_of(&self.shared)
    }
}

impl std::fmt::Debug for HandoffConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffConsumer")
            .field("front", &self.front)
            .field("stats", &self.stats())
            .finish()
    }
}

fn stats_of(shared: &Shared) -> HandoffStats {
    HandoffStats {
        published: shared.published.load(Ordering::Relaxed),
        consumed: shared.consumed.load(Ordering::Relaxed),
        overwritten: shared.overwritten.load(Ordering::Relaxed),
    }
}
