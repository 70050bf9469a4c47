//! Reader and look-ahead queue (REPLAY path), spec §4.3. Mirrors the
//! writer's format exactly and produces fully-owned [`LogEntry`] values;
//! variable-length buffers are freshly allocated and owned by the entry
//! until it's recycled.

use crate::allocator::{EntryPool, History};
use crate::callsite::Callsite;
use crate::collab::{classify_alignment, EmulatorCollaborator};
use crate::error::fatal_divergence;
use crate::event::{EventKind, EventVariant, LogEntry, SkippedCallVariant};
use crate::lifecycle::{ProgressReporter, ReadHandle};
use crate::program_point::{Alignment, ProgramPoint};
use crate::wire;
use std::collections::VecDeque;
use std::io::{self, Read};

const NUM_KINDS: usize = 9;

/// Counts bytes consumed from the underlying reader without changing its
/// behavior — used to advance [`ReadHandle::offset`] and to maintain
/// per-kind byte totals for the stats the `ndlog-inspect` CLI reports.
struct CountingReader<'a, R: Read> {
    inner: &'a mut R,
    count: u64,
}

impl<'a, R: Read> CountingReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        CountingReader { inner, count: 0 }
    }
}

impl<'a, R: Read> Read for CountingReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[derive(Default, Clone, Copy)]
pub struct KindStats {
    pub count: u64,
    pub bytes: u64,
}

pub struct ReplayQueue {
    handle: ReadHandle,
    queue: VecDeque<LogEntry>,
    max_queue_len: usize,
    high_water_mark: usize,
    stats: [KindStats; NUM_KINDS],
    progress: ProgressReporter,
}

impl ReplayQueue {
    pub fn new(handle: ReadHandle, max_queue_len: usize, progress_granularity_percent: u64) -> Self {
        ReplayQueue {
            handle,
            queue: VecDeque::new(),
            max_queue_len,
            high_water_mark: 0,
            stats: [KindStats::default(); NUM_KINDS],
            progress: ProgressReporter::new(progress_granularity_percent),
        }
    }

    pub fn log_size(&self) -> u64 {
        self.handle.log_size
    }

    pub fn header_last_prog_point(&self) -> ProgramPoint {
        self.handle.last_prog_point
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn stats(&self) -> &[KindStats; NUM_KINDS] {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Reads entries until one of the four stop conditions in spec §4.3
    /// fires: end-of-file, the queue reaching `max_queue_len`, an
    /// `INTERRUPT_REQUEST` entry just appended, or a `SKIPPED_CALL` at
    /// `MAIN_LOOP_WAIT` just appended. Shells come from `pool`'s free list
    /// (spec §4.4) rather than being heap-allocated fresh every time.
    pub fn fill_queue(&mut self, pool: &mut EntryPool) -> io::Result<()> {
        loop {
            if self.handle.at_eof() {
                break;
            }
            let file_pos = self.handle.offset;
            let mut entry = pool.alloc_new_entry();
            let got = {
                let mut counting = CountingReader::new(self.handle.file_mut());
                let got = wire::read_entry_into(&mut counting, file_pos, &mut entry)?;
                self.handle.offset += counting.count;
                got
            };
            if !got {
                pool.recycle_entry(entry);
                break;
            }

            let idx = entry.kind as usize;
            self.stats[idx].count += 1;
            self.stats[idx].bytes += self.handle.offset - file_pos;
            self.progress.maybe_report(
                entry.point.guest_instr_count,
                self.handle.last_prog_point.guest_instr_count,
            );

            let is_interrupt = entry.kind == EventKind::InterruptRequest;
            let is_main_loop_skipped_call =
                entry.kind == EventKind::SkippedCall && entry.callsite == Callsite::MainLoopWait;

            self.queue.push_back(entry);
            if self.queue.len() > self.high_water_mark {
                self.high_water_mark = self.queue.len();
            }

            if self.queue.len() >= self.max_queue_len || is_interrupt || is_main_loop_skipped_call {
                break;
            }
        }
        Ok(())
    }

    fn consume_front(&mut self, history: &mut History) -> LogEntry {
        let entry = self.queue.pop_front().expect("caller checked non-empty");
        history.record(&entry);
        entry
    }

    /// The core consumption operation, spec §4.3. Returns `None` when the
    /// logged head is still in the guest's future (the caller should try
    /// again later), or when the head doesn't match `kind`/`callsite`.
    /// Aborts via [`fatal_divergence`] if the guest has already run past
    /// the logged head without consuming it.
    pub fn get_next(
        &mut self,
        kind: EventKind,
        callsite: Callsite,
        check_callsite: bool,
        collaborator: &dyn EmulatorCollaborator,
        pool: &mut EntryPool,
        history: &mut History,
    ) -> Option<LogEntry> {
        if self.queue.is_empty() {
            self.fill_queue(pool)
                .unwrap_or_else(|e| crate::error::fatal(&format!("I/O error refilling queue: {}", e)));
            if self.queue.is_empty() {
                return None;
            }
        }

        // Skip-drain leading DEBUG entries, except when the consumer kind
        // is one of the two "ambient" kinds that may legitimately precede
        // a checkpoint (spec §4.3 step 2, §9 open question).
        if !kind.is_ambient() {
            while matches!(self.queue.front(), Some(e) if e.kind == EventKind::Debug) {
                let entry = self.consume_front(history);
                pool.recycle_entry(entry);
            }
        }

        let front = self.queue.front()?;
        let current = collaborator.current_program_point();
        let ordering = collaborator.program_point_compare(current, front.point, front.kind);
        match classify_alignment(current, ordering) {
            Alignment::LoggedIsFuture => return None,
            Alignment::LoggedIsPast => {
                fatal_divergence("replayed past an unconsumed log entry", current, front.point, front.kind)
            }
            Alignment::Aligned => {}
        }

        if front.kind != kind {
            return None;
        }
        if check_callsite && front.callsite != callsite {
            return None;
        }

        let entry = self.consume_front(history);
        Some(entry)
    }

    /// `replay_interrupt_request`'s immediate post-consumption refill,
    /// spec §4.3: keeps the next interrupt-shaped stop point already
    /// queued.
    pub fn refill_after_interrupt(&mut self, pool: &mut EntryPool) {
        self.fill_queue(pool)
            .unwrap_or_else(|e| crate::error::fatal(&format!("I/O error refilling queue: {}", e)));
    }

    /// Advisory: pops and discards leading `DEBUG` entries whose
    /// `guest_instr_count` is at or before `current`. An entry strictly
    /// ahead is left in place (spec §4.3).
    pub fn replay_debug(&mut self, current: ProgramPoint, pool: &mut EntryPool, history: &mut History) {
        loop {
            match self.queue.front() {
                Some(e) if e.kind == EventKind::Debug && e.point.guest_instr_count <= current.guest_instr_count => {
                    let entry = self.consume_front(history);
                    pool.recycle_entry(entry);
                }
                _ => break,
            }
        }
    }

    /// True iff the file is drained and either the queue is empty or only
    /// the `LAST` sentinel remains, at or past its program point (spec §3
    /// invariant 2).
    pub fn replay_finished(&self, collaborator: &dyn EmulatorCollaborator) -> bool {
        match self.queue.front() {
            Some(front) if front.kind == EventKind::Last => {
                let current = collaborator.current_program_point();
                let ordering = collaborator.program_point_compare(current, front.point, front.kind);
                !matches!(classify_alignment(current, ordering), Alignment::LoggedIsFuture)
            }
            Some(_) => false,
            None => self.handle.at_eof(),
        }
    }

    pub fn close(self) {
        // Dropping self closes the underlying file (spec §4.1 "End replay").
    }
}

/// Dispatches a just-consumed `SKIPPED_CALL` entry's sub-kind back to the
/// emulator (spec §4.3 `replay_skipped_calls`).
pub fn dispatch_skipped_call(entry: &LogEntry, collaborator: &mut dyn EmulatorCollaborator) {
    let sc = match &entry.variant {
        EventVariant::SkippedCall(sc) => sc,
        _ => crate::error::fatal("dispatch_skipped_call called on a non-SKIPPED_CALL entry"),
    };
    match sc {
        SkippedCallVariant::CpuMemRw(v) => collaborator.apply_cpu_mem_rw(v.addr, &v.buf),
        SkippedCallVariant::CpuMemUnmap(v) => collaborator.apply_cpu_mem_unmap(v.addr, &v.buf),
        SkippedCallVariant::MemRegionChange(v) => {
            collaborator.apply_memory_region_change(v.start, v.size, v.mtype, &v.name, v.added)
        }
        SkippedCallVariant::HdTransfer(v) => {
            collaborator.apply_hd_transfer(v.transfer_type, v.src, v.dest, v.count)
        }
        SkippedCallVariant::NetTransfer(v) => {
            collaborator.apply_net_transfer(v.transfer_type, v.src, v.dest, v.count)
        }
        SkippedCallVariant::HandlePacket(v) => collaborator.apply_handle_packet(v.direction, &v.buf),
    }
}
