//! Entry allocator and diagnostic history, spec §4.4 / §9.
//!
//! The free list is "a legitimate optimization to preserve": every replay
//! call consumes one entry from the queue and immediately recycles it, so
//! a small pool of reusable shells avoids allocator churn on that hot
//! path. The history ring is diagnostic-only — ten most-recently-consumed
//! entries with their trailing buffers dropped, per spec §4.4's "history
//! never owns buffers."

use crate::callsite::Callsite;
use crate::event::{EventKind, EventVariant, LogEntry};
use crate::program_point::ProgramPoint;

/// Recycle pool ("free list") of consumed entry shells.
pub struct EntryPool {
    free_list: Vec<LogEntry>,
}

impl EntryPool {
    pub fn new() -> Self {
        EntryPool {
            free_list: Vec::new(),
        }
    }

    /// Pops a zeroed shell from the free list, or heap-allocates one.
    pub fn alloc_new_entry(&mut self) -> LogEntry {
        self.free_list.pop().unwrap_or_else(|| {
            LogEntry::new(ProgramPoint::ZERO, EventKind::Debug, Callsite::Other, EventVariant::Debug)
        })
    }

    /// Frees any variable-length buffer the entry owns (by dropping it
    /// along with the rest of the shell's old contents) and pushes the
    /// shell back onto the free list for reuse.
    pub fn recycle_entry(&mut self, entry: LogEntry) {
        self.free_list.push(entry);
    }

    /// Number of shells currently available for reuse; exposed for tests
    /// and diagnostics, not part of any invariant.
    pub fn free_list_len(&self) -> usize {
        self.free_list.len()
    }
}

impl Default for EntryPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Ring buffer of the `hist_size` most recently consumed entries, for
/// post-mortem diagnosis only. Not part of any invariant.
pub struct History {
    ring: Vec<LogEntry>,
    capacity: usize,
    next: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            ring: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    /// Records a history-ring copy (buffer pointer nulled, per spec §4.4)
    /// of a just-consumed entry.
    pub fn record(&mut self, entry: &LogEntry) {
        if self.capacity == 0 {
            return;
        }
        let copy = entry.history_copy();
        if self.ring.len() < self.capacity {
            self.ring.push(copy);
        } else {
            self.ring[self.next] = copy;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.ring.iter()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
