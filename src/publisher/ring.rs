//! Triple-buffered collection exchange between one writer and one reader.
//!
//! Three slots each own a [`Collection`]. The writer always fills a slot that is neither the
//! last published one nor the one the reader has pinned, then publishes it by storing a tag
//! (`generation << 2 | slot`) into `latest`. The reader pins the slot named by `latest`,
//! re-checks `latest`, and only then copies the slot out into an [`Arc`] it owns.
//!
//! Why this is sound: all accesses to `latest` and `reader_pin` are `SeqCst`. When the
//! reader's re-check observes tag `T` (published by writer cycle `Z` into slot `s`), cycle `Z`
//! has finished writing `s`. Cycle `Z + 1` starts with `s` as its last-written slot and so never
//! picks it. Every later cycle loads `reader_pin` after `Z + 1` published, which is after the
//! re-check and therefore after the pin store, so it sees `s` pinned and avoids it. The pin
//! stays on `s` until the next reader call, by which time the copy is complete.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::metrics::PublisherMetrics;
use crate::models::Collection;

/// Number of slots in the ring.
pub const SLOT_COUNT: usize = 3;

/// Reader pin value before the first read.
const NO_SLOT: usize = usize::MAX;

/// Reader tag value before the first read.
const NO_TAG: u64 = u64::MAX;

/// Pin attempts before the reader settles for its previous snapshot.
const MAX_PIN_ATTEMPTS: usize = 4;

const SLOT_BITS: u32 = 2;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;

/// Pick the slot the next cycle writes into.
///
/// Normally the slot after the last written one; if the reader is pinned there, the one after
/// that. The result is never `last_written` and never `reader_pinned`.
pub fn select_write_slot(last_written: usize, reader_pinned: usize) -> usize {
    let next = (last_written + 1) % SLOT_COUNT;
    if reader_pinned == next {
        (last_written + 2) % SLOT_COUNT
    } else {
        next
    }
}

fn pack(generation: u64, slot: usize) -> u64 {
    (generation << SLOT_BITS) | slot as u64
}

fn slot_of(tag: u64) -> usize {
    (tag & SLOT_MASK) as usize
}

fn generation_of(tag: u64) -> u64 {
    tag >> SLOT_BITS
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    collection: Collection,
}

struct SnapshotRing {
    slots: [UnsafeCell<Slot>; SLOT_COUNT],
    /// Tag of the newest complete slot.
    latest: AtomicU64,
    /// Slot the reader is copying from, or last copied from.
    reader_pin: AtomicUsize,
    metrics: Arc<PublisherMetrics>,
}

// SAFETY: slots are only touched through `SnapshotWriter` (one per ring, never cloned) and
// `SnapshotReader` (same). The selection and pin protocol described in the module docs
// guarantees the writer's `&mut Slot` and the reader's `&Slot` never refer to the same slot at
// the same time.
unsafe impl Sync for SnapshotRing {}

/// Create a ring with an empty generation 0 collection in slot 0.
pub fn snapshot_ring(metrics: Arc<PublisherMetrics>) -> (SnapshotWriter, SnapshotReader) {
    let ring = Arc::new(SnapshotRing {
        slots: Default::default(),
        latest: AtomicU64::new(pack(0, 0)),
        reader_pin: AtomicUsize::new(NO_SLOT),
        metrics,
    });

    let writer = SnapshotWriter {
        ring: Arc::clone(&ring),
        last_written: 0,
        generation: 0,
    };

    let reader = SnapshotReader {
        ring,
        last_read_tag: NO_TAG,
        cached: Arc::new(Collection::new()),
    };

    (writer, reader)
}

/// Record of one published write, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket {
    pub slot: usize,
    pub generation: u64,
    /// Reader pin observed when the slot was selected
    pub reader_pinned: Option<usize>,
}

/// Writing half of the ring. Owned by the refresh worker.
pub struct SnapshotWriter {
    ring: Arc<SnapshotRing>,
    last_written: usize,
    generation: u64,
}

impl SnapshotWriter {
    /// Rebuild a slot from scratch with `fill` and publish it.
    ///
    /// The chosen slot's collection is cleared (keeping its allocation) before `fill` runs.
    /// Publication is the last thing that happens; if `fill` panics nothing is published.
    pub fn write_with<F>(&mut self, fill: F) -> WriteTicket
    where
        F: FnOnce(&mut Collection),
    {
        let pinned = self.ring.reader_pin.load(Ordering::SeqCst);
        let target = select_write_slot(self.last_written, pinned);
        debug_assert_ne!(target, pinned, "selected the reader's pinned slot");
        debug_assert_ne!(target, self.last_written, "selected the published slot");

        // SAFETY: `target` is neither the published slot nor the pinned one; see module docs.
        let slot = unsafe { &mut *self.ring.slots[target].get() };

        slot.collection.clear();
        fill(&mut slot.collection);

        let generation = self.generation + 1;
        slot.generation = generation;
        slot.collection.generation = generation;

        self.ring
            .latest
            .store(pack(generation, target), Ordering::SeqCst);
        self.generation = generation;
        self.last_written = target;

        WriteTicket {
            slot: target,
            generation,
            reader_pinned: (pinned != NO_SLOT).then_some(pinned),
        }
    }

    /// Generation of the most recently published collection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_written(&self) -> usize {
        self.last_written
    }
}

/// Reading half of the ring. Owned by the single consumer.
pub struct SnapshotReader {
    ring: Arc<SnapshotRing>,
    last_read_tag: u64,
    cached: Arc<Collection>,
}

impl SnapshotReader {
    /// Newest complete collection.
    ///
    /// Never blocks. When nothing was published since the previous call the same [`Arc`] is
    /// returned again. If cycles keep publishing while the reader tries to pin a slot, it gives
    /// up after a few attempts and returns its previous snapshot.
    pub fn get_latest(&mut self) -> Arc<Collection> {
        let mut tag = self.ring.latest.load(Ordering::SeqCst);
        if tag == self.last_read_tag {
            self.ring.metrics.record_reader_cache_hit();
            return Arc::clone(&self.cached);
        }

        for _ in 0..MAX_PIN_ATTEMPTS {
            let slot_index = slot_of(tag);
            self.ring.reader_pin.store(slot_index, Ordering::SeqCst);

            let recheck = self.ring.latest.load(Ordering::SeqCst);
            if recheck == tag {
                // SAFETY: pinned and re-checked; the writer cannot select this slot now.
                let slot = unsafe { &*self.ring.slots[slot_index].get() };
                debug_assert_eq!(slot.generation, generation_of(tag));

                self.cached = Arc::new(slot.collection.clone());
                self.last_read_tag = tag;
                self.ring.metrics.record_reader_copy();
                return Arc::clone(&self.cached);
            }

            self.ring.metrics.record_pin_retry();
            tag = recheck;
            if tag == self.last_read_tag {
                break;
            }
        }

        tracing::trace!("Reader kept previous snapshot, writer kept publishing");
        Arc::clone(&self.cached)
    }

    /// Generation of the collection last handed out.
    pub fn generation(&self) -> u64 {
        self.cached.generation
    }

    /// Slot the last returned collection was copied from.
    pub fn last_read_slot(&self) -> Option<usize> {
        (self.last_read_tag != NO_TAG).then(|| slot_of(self.last_read_tag))
    }

    /// Whether a newer collection than the cached one has been published.
    pub fn has_update(&self) -> bool {
        self.ring.latest.load(Ordering::SeqCst) != self.last_read_tag
    }
}
