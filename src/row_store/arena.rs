//! Request-scoped arena
//!
//! One [`Arena`] lives for the duration of one merge request. Sketch register
//! buffers and merged-doc sequence buffers are taken from it, and it keeps count of
//! what was handed out. Nothing is returned to the arena individually; all of it
//! goes away with the request.

use super::reference::MatchDoc;
use std::cell::Cell;

/// Allocation counters for one arena
#[derive(Debug, Default)]
pub struct ArenaStatistics {
    /// Number of sketch register buffers handed out
    pub register_buffers: Cell<u64>,
    /// Number of doc sequence buffers handed out
    pub doc_buffers: Cell<u64>,
    /// Total bytes handed out across all buffers
    pub bytes_allocated: Cell<u64>,
    /// Largest single buffer in bytes
    pub peak_buffer_bytes: Cell<u64>,
}

impl ArenaStatistics {
    fn record(&self, counter: &Cell<u64>, bytes: usize) {
        counter.set(counter.get() + 1);
        self.bytes_allocated.set(self.bytes_allocated.get() + bytes as u64);
        if bytes as u64 > self.peak_buffer_bytes.get() {
            self.peak_buffer_bytes.set(bytes as u64);
        }
    }

    /// Copy the counters out
    pub fn snapshot(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            register_buffers: self.register_buffers.get(),
            doc_buffers: self.doc_buffers.get(),
            bytes_allocated: self.bytes_allocated.get(),
            peak_buffer_bytes: self.peak_buffer_bytes.get(),
        }
    }
}

/// Point-in-time copy of [`ArenaStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaSnapshot {
    pub register_buffers: u64,
    pub doc_buffers: u64,
    pub bytes_allocated: u64,
    pub peak_buffer_bytes: u64,
}

/// Request-scoped allocation source for merge work
///
/// The arena is used through a shared reference; merges are single-threaded, so the
/// counters use `Cell` and the type is not `Sync`.
#[derive(Debug, Default)]
pub struct Arena {
    stats: ArenaStatistics,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed register buffer for a dense sketch
    pub fn alloc_registers(&self, count: usize) -> Box<[u8]> {
        self.stats.record(&self.stats.register_buffers, count);
        vec![0u8; count].into_boxed_slice()
    }

    /// Allocate an empty buffer for a merged doc sequence
    pub fn alloc_doc_buffer(&self, capacity: usize) -> Vec<MatchDoc> {
        self.stats
            .record(&self.stats.doc_buffers, capacity * std::mem::size_of::<MatchDoc>());
        Vec::with_capacity(capacity)
    }

    pub fn stats(&self) -> &ArenaStatistics {
        &self.stats
    }
}
