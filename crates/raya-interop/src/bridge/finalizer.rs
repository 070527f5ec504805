//! Deferred finalization queue
//!
//! Managed finalizers may run on any thread and must never take the
//! interpreter lock. They push a [`PendingFinalization`] here instead; the
//! queue is drained later, at a point where the lock is held.

use crate::script::{CompanionRelease, Gil, ScriptRef, ScriptRuntime, SessionToken};
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A companion awaiting release after its managed instance was finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFinalization {
    /// Companion object
    pub companion: ScriptRef,
    /// Session that created it
    pub token: SessionToken,
}

/// Result of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Companions freed
    pub released: usize,
    /// Companions still referenced from scripting, freed on their last release
    pub orphaned: usize,
    /// Companions already gone (freed by session teardown)
    pub missing: usize,
    /// Entries from ended sessions, dropped without touching any heap
    pub discarded: usize,
}

impl DrainStats {
    /// Number of entries consumed
    pub fn total(&self) -> usize {
        self.released + self.orphaned + self.missing + self.discarded
    }
}

/// Lock-free multi-producer queue of pending finalizations
#[derive(Default)]
pub struct FinalizationQueue {
    queue: SegQueue<PendingFinalization>,
    enqueued: AtomicU64,
    consumed: AtomicU64,
}

impl FinalizationQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an entry; callable from any thread
    pub fn enqueue(&self, pending: PendingFinalization) {
        self.queue.push(pending);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Entries waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Entries ever enqueued
    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Entries ever consumed by a drain or a clear
    pub fn total_consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Drain under a freshly acquired interpreter lock
    ///
    /// With no live session every entry is stale and is discarded.
    pub fn drain(&self, runtime: &ScriptRuntime, max_batch: Option<usize>) -> DrainStats {
        match runtime.current() {
            Some(session) => {
                let gil = session.lock();
                self.drain_locked(&gil, max_batch)
            }
            None => {
                let mut stats = DrainStats::default();
                while let Some(pending) = self.pop_within(max_batch, stats.total()) {
                    warn!(
                        companion = pending.companion.id(),
                        token = pending.token.as_u64(),
                        "discarding finalization without a live session"
                    );
                    stats.discarded += 1;
                }
                stats
            }
        }
    }

    /// Drain while already holding the interpreter lock
    pub fn drain_locked(&self, gil: &Gil<'_>, max_batch: Option<usize>) -> DrainStats {
        let mut stats = DrainStats::default();
        let current = gil.token();

        while let Some(pending) = self.pop_within(max_batch, stats.total()) {
            if pending.token != current {
                warn!(
                    companion = pending.companion.id(),
                    token = pending.token.as_u64(),
                    "discarding finalization from an ended session"
                );
                stats.discarded += 1;
                continue;
            }
            match gil.release_companion(pending.companion) {
                CompanionRelease::Freed => stats.released += 1,
                CompanionRelease::Orphaned => stats.orphaned += 1,
                CompanionRelease::Missing => stats.missing += 1,
            }
        }

        if stats.total() > 0 {
            debug!(
                released = stats.released,
                orphaned = stats.orphaned,
                missing = stats.missing,
                discarded = stats.discarded,
                "drained finalization queue"
            );
        }
        stats
    }

    /// Drop every waiting entry; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.queue.pop().is_some() {
            dropped += 1;
        }
        self.consumed.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    fn pop_within(&self, max_batch: Option<usize>, taken: usize) -> Option<PendingFinalization> {
        if max_batch.is_some_and(|limit| taken >= limit) {
            return None;
        }
        let pending = self.queue.pop()?;
        self.consumed.fetch_add(1, Ordering::Relaxed);
        Some(pending)
    }
}
