//! Mode/State controller and the `ReplayEngine` that ties every other
//! component together, spec §4.1 / §9. The reference implementation keeps
//! mode, the log handle, the queue, the free list, history, and counters
//! as file-scope globals; per spec §9's design note, this crate
//! encapsulates all of that in one `ReplayEngine` object instead, with
//! static lifetime left to whatever the embedder's instrumentation layer
//! needs (typically a thread-local or a context parameter it threads
//! through).

use crate::allocator::{EntryPool, History};
use crate::callsite::Callsite;
use crate::collab::{EmulatorCollaborator, SnapshotHost};
use crate::error::{fatal, NdlogError, Result};
use crate::flags::{log_path, snapshot_path, Config};
use crate::lifecycle::{ReadHandle, WriteHandle};
use crate::log::LogLevel::{LogError, LogInfo};
use crate::program_point::ProgramPoint;
use crate::reader::{dispatch_skipped_call, ReplayQueue};
use crate::writer::RecordWriter;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering as AtomicOrdering};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Mode {
    Off = 0,
    Record = 1,
    Replay = 2,
}

impl Mode {
    fn from_u8(v: u8) -> Mode {
        match v {
            0 => Mode::Off,
            1 => Mode::Record,
            2 => Mode::Replay,
            _ => unreachable!("mode word holds only values written by this module"),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum RecordRequested {
    None,
    Fresh,
    FromSnapshot,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EndReplayReason {
    Ok,
    Error,
}

/// Cross-thread request flags, spec §5: word-sized atomics written with
/// release ordering by the monitor thread or a signal handler, polled with
/// acquire ordering from the controller's safe points. No mutexes, since
/// there is no shared mutable state beyond these flags.
pub struct RequestFlags {
    record_requested: AtomicU8,
    end_record_requested: AtomicBool,
    end_replay_requested: AtomicBool,
}

impl RequestFlags {
    fn new() -> Self {
        RequestFlags {
            record_requested: AtomicU8::new(0),
            end_record_requested: AtomicBool::new(false),
            end_replay_requested: AtomicBool::new(false),
        }
    }

    pub fn request_record(&self, fresh: bool) {
        self.record_requested
            .store(if fresh { 1 } else { 2 }, AtomicOrdering::Release);
    }

    pub fn request_end_record(&self) {
        self.end_record_requested.store(true, AtomicOrdering::Release);
    }

    pub fn request_end_replay(&self) {
        self.end_replay_requested.store(true, AtomicOrdering::Release);
    }

    fn take_record_requested(&self) -> RecordRequested {
        match self.record_requested.swap(0, AtomicOrdering::Acquire) {
            1 => RecordRequested::Fresh,
            2 => RecordRequested::FromSnapshot,
            _ => RecordRequested::None,
        }
    }

    fn take_end_record_requested(&self) -> bool {
        self.end_record_requested.swap(false, AtomicOrdering::Acquire)
    }

    fn take_end_replay_requested(&self) -> bool {
        self.end_replay_requested.swap(false, AtomicOrdering::Acquire)
    }
}

/// The single process-wide object spec §9 recommends in place of file-scope
/// globals. Owns the writer, the reader/queue, the entry pool and history,
/// the mode word, and the request flags; calls out to the embedder through
/// [`EmulatorCollaborator`] and [`SnapshotHost`].
pub struct ReplayEngine {
    mode: AtomicU8,
    pub flags: RequestFlags,
    writer: Option<RecordWriter>,
    reader: Option<ReplayQueue>,
    pool: EntryPool,
    history: History,
    collaborator: Box<dyn EmulatorCollaborator>,
    snapshot_host: Box<dyn SnapshotHost>,
}

impl ReplayEngine {
    pub fn new(collaborator: Box<dyn EmulatorCollaborator>, snapshot_host: Box<dyn SnapshotHost>) -> Self {
        let config = Config::get();
        ReplayEngine {
            mode: AtomicU8::new(Mode::Off as u8),
            flags: RequestFlags::new(),
            writer: None,
            reader: None,
            pool: EntryPool::new(),
            history: History::new(config.hist_size),
            collaborator,
            snapshot_host,
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(AtomicOrdering::Acquire))
    }

    fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, AtomicOrdering::Release);
    }

    fn require_mode(&self, expected: Mode, what: &str) {
        if self.mode() != expected {
            fatal(&format!("{} called while not in {:?} (mode is {:?})", what, expected, self.mode()));
        }
    }

    // ---- Control surface, spec §4.1 / §6 -------------------------------------------------

    /// Begin record (fresh): take a VM snapshot, create the log file,
    /// reset internal flags, switch to RECORD.
    pub fn begin_record(&mut self, dir: &Path, name: &str) -> Result<()> {
        let snap_path = snapshot_path(dir, name);
        self.snapshot_host
            .save_snapshot(&snap_path)
            .map_err(|source| NdlogError::Create { path: snap_path, source })?;
        let log_file = log_path(dir, name);
        let handle = WriteHandle::create(&log_file)?;
        self.writer = Some(RecordWriter::new(handle));
        self.set_mode(Mode::Record);
        log!(LogInfo, "recording started: {:?}", log_file);
        Ok(())
    }

    /// Begin record from snapshot: load the named snapshot first, then
    /// proceed exactly as "begin record (fresh)".
    pub fn begin_record_from(&mut self, source_snapshot: &Path, dir: &Path, name: &str) -> Result<()> {
        self.snapshot_host
            .load_snapshot(source_snapshot)
            .map_err(|source| NdlogError::Open {
                path: source_snapshot.to_path_buf(),
                source,
            })?;
        self.begin_record(dir, name)
    }

    /// End record: write the `LAST` sentinel, rewind and rewrite the
    /// header with the final program point, close, free the entry pool.
    pub fn end_record(&mut self) {
        self.require_mode(Mode::Record, "end_record");
        let mut writer = self.writer.take().expect("mode invariant guarantees writer is present");
        let current = self.collaborator.current_program_point();
        writer
            .record_last(current, Callsite::Other)
            .unwrap_or_else(|e| fatal(&format!("write failure recording LAST entry: {}", e)));
        writer
            .close()
            .unwrap_or_else(|e| fatal(&format!("write failure closing log header: {}", e)));
        self.pool = EntryPool::new();
        self.set_mode(Mode::Off);
        log!(LogInfo, "recording ended at {:?}", current);
    }

    /// Begin replay: load the snapshot, open the log for read, reset the
    /// per-CPU counter (an embedder responsibility — see
    /// [`EmulatorCollaborator`]), switch to REPLAY, pre-fill the queue.
    pub fn begin_replay(&mut self, snapshot: &Path, log_file: &Path) -> Result<()> {
        self.snapshot_host
            .load_snapshot(snapshot)
            .map_err(|source| NdlogError::Open {
                path: snapshot.to_path_buf(),
                source,
            })?;
        let handle = ReadHandle::open(log_file)?;
        let config = Config::get();
        let mut queue = ReplayQueue::new(handle, config.max_queue_len, config.progress_granularity_percent);
        queue
            .fill_queue(&mut self.pool)
            .unwrap_or_else(|e| fatal(&format!("I/O error pre-filling replay queue: {}", e)));
        self.reader = Some(queue);
        self.set_mode(Mode::Replay);
        log!(LogInfo, "replay started: {:?}", log_file);
        Ok(())
    }

    /// End replay: report stats, free the queue and pool, close, switch to
    /// OFF. An error-flagged end aborts the process — there's no
    /// partial-replay recovery (spec §4.1, §7).
    pub fn end_replay(&mut self, reason: EndReplayReason) {
        self.require_mode(Mode::Replay, "end_replay");
        if let Some(queue) = self.reader.take() {
            for (idx, stat) in queue.stats().iter().enumerate() {
                if stat.count > 0 {
                    log!(
                        LogInfo,
                        "replay stats: kind {} — {} entries, {} bytes",
                        idx,
                        stat.count,
                        stat.bytes
                    );
                }
            }
            log!(LogInfo, "replay queue high-water mark: {}", queue.high_water_mark());
            queue.close();
        }
        self.pool = EntryPool::new();
        self.set_mode(Mode::Off);
        if reason == EndReplayReason::Error {
            log!(LogError, "replay ended with an error; aborting");
            process::abort();
        }
    }

    /// Cooperative cancellation: called at the controller's safe points
    /// (spec §5). Setting `end_record_requested`/`end_replay_requested`
    /// winds down the corresponding mode on the next visit.
    pub fn poll_requests(&mut self) {
        if self.flags.take_end_record_requested() && self.mode() == Mode::Record {
            self.end_record();
        }
        if self.flags.take_end_replay_requested() && self.mode() == Mode::Replay {
            self.end_replay(EndReplayReason::Ok);
        }
    }

    pub fn take_record_requested(&self) -> RecordRequested {
        self.flags.take_record_requested()
    }

    // ---- record_* entry points, spec §4.2 ------------------------------------------------

    fn writer_mut(&mut self, what: &str) -> &mut RecordWriter {
        self.require_mode(Mode::Record, what);
        self.writer.as_mut().expect("mode invariant guarantees writer is present")
    }

    fn current_point(&self) -> ProgramPoint {
        self.collaborator.current_program_point()
    }

    fn on_write_err(what: &str) -> impl FnOnce(std::io::Error) + '_ {
        move |e| fatal(&format!("write failure in {}: {}", what, e))
    }

    pub fn record_input_1(&mut self, callsite: Callsite, value: u8) {
        let point = self.current_point();
        self.writer_mut("record_input_1")
            .record_input_1(point, callsite, value)
            .unwrap_or_else(Self::on_write_err("record_input_1"));
    }

    pub fn record_input_2(&mut self, callsite: Callsite, value: u16) {
        let point = self.current_point();
        self.writer_mut("record_input_2")
            .record_input_2(point, callsite, value)
            .unwrap_or_else(Self::on_write_err("record_input_2"));
    }

    pub fn record_input_4(&mut self, callsite: Callsite, value: u32) {
        let point = self.current_point();
        self.writer_mut("record_input_4")
            .record_input_4(point, callsite, value)
            .unwrap_or_else(Self::on_write_err("record_input_4"));
    }

    pub fn record_input_8(&mut self, callsite: Callsite, value: u64) {
        let point = self.current_point();
        self.writer_mut("record_input_8")
            .record_input_8(point, callsite, value)
            .unwrap_or_else(Self::on_write_err("record_input_8"));
    }

    pub fn record_interrupt_request(&mut self, callsite: Callsite, value: u32) {
        let point = self.current_point();
        self.writer_mut("record_interrupt_request")
            .record_interrupt_request(point, callsite, value)
            .unwrap_or_else(Self::on_write_err("record_interrupt_request"));
    }

    pub fn record_exit_request(&mut self, callsite: Callsite, value: u32) {
        let point = self.current_point();
        self.writer_mut("record_exit_request")
            .record_exit_request(point, callsite, value)
            .unwrap_or_else(Self::on_write_err("record_exit_request"));
    }

    pub fn record_cpu_mem_rw(&mut self, callsite: Callsite, addr: u64, buf: &[u8]) {
        let point = self.current_point();
        self.writer_mut("record_cpu_mem_rw")
            .record_cpu_mem_rw(point, callsite, addr, buf)
            .unwrap_or_else(Self::on_write_err("record_cpu_mem_rw"));
    }

    pub fn record_cpu_mem_unmap(&mut self, callsite: Callsite, addr: u64, buf: &[u8]) {
        let point = self.current_point();
        self.writer_mut("record_cpu_mem_unmap")
            .record_cpu_mem_unmap(point, callsite, addr, buf)
            .unwrap_or_else(Self::on_write_err("record_cpu_mem_unmap"));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_memory_region_change(&mut self, callsite: Callsite, start: u64, size: u64, mtype: u32, added: bool, name: &[u8]) {
        let point = self.current_point();
        self.writer_mut("record_memory_region_change")
            .record_memory_region_change(point, callsite, start, size, mtype, added, name)
            .unwrap_or_else(Self::on_write_err("record_memory_region_change"));
    }

    pub fn record_hd_transfer(&mut self, callsite: Callsite, transfer_type: u32, src: u64, dest: u64, count: u64) {
        let point = self.current_point();
        self.writer_mut("record_hd_transfer")
            .record_hd_transfer(point, callsite, transfer_type, src, dest, count)
            .unwrap_or_else(Self::on_write_err("record_hd_transfer"));
    }

    pub fn record_net_transfer(&mut self, callsite: Callsite, transfer_type: u32, src: u64, dest: u64, count: u64) {
        let point = self.current_point();
        self.writer_mut("record_net_transfer")
            .record_net_transfer(point, callsite, transfer_type, src, dest, count)
            .unwrap_or_else(Self::on_write_err("record_net_transfer"));
    }

    pub fn record_handle_packet(&mut self, callsite: Callsite, direction: u32, buf: &[u8]) {
        let point = self.current_point();
        self.writer_mut("record_handle_packet")
            .record_handle_packet(point, callsite, direction, buf)
            .unwrap_or_else(Self::on_write_err("record_handle_packet"));
    }

    pub fn record_debug(&mut self, callsite: Callsite) {
        let point = self.current_point();
        self.writer_mut("record_debug")
            .record_debug(point, callsite)
            .unwrap_or_else(Self::on_write_err("record_debug"));
    }

    // ---- replay_* entry points, spec §4.3 ------------------------------------------------

    fn reader_mut(&mut self, what: &str) -> &mut ReplayQueue {
        self.require_mode(Mode::Replay, what);
        self.reader.as_mut().expect("mode invariant guarantees reader is present")
    }

    fn get_next(&mut self, kind: crate::event::EventKind, callsite: Callsite, check_callsite: bool) -> Option<crate::event::LogEntry> {
        let collaborator = self.collaborator.as_ref();
        let pool = &mut self.pool;
        let history = &mut self.history;
        self.reader
            .as_mut()
            .expect("mode invariant guarantees reader is present")
            .get_next(kind, callsite, check_callsite, collaborator, pool, history)
    }

    fn replay_input(&mut self, kind: crate::event::EventKind, callsite: Callsite, what: &str) -> Option<u64> {
        self.require_mode(Mode::Replay, what);
        let entry = self.get_next(kind, callsite, true)?;
        match entry.variant {
            crate::event::EventVariant::Input(v) => Some(v),
            _ => fatal("get_next returned an entry whose variant doesn't match its kind"),
        }
    }

    pub fn replay_input_1(&mut self, callsite: Callsite) -> Option<u8> {
        self.replay_input(crate::event::EventKind::Input1, callsite, "replay_input_1")
            .map(|v| v as u8)
    }

    pub fn replay_input_2(&mut self, callsite: Callsite) -> Option<u16> {
        self.replay_input(crate::event::EventKind::Input2, callsite, "replay_input_2")
            .map(|v| v as u16)
    }

    pub fn replay_input_4(&mut self, callsite: Callsite) -> Option<u32> {
        self.replay_input(crate::event::EventKind::Input4, callsite, "replay_input_4")
            .map(|v| v as u32)
    }

    pub fn replay_input_8(&mut self, callsite: Callsite) -> Option<u64> {
        self.replay_input(crate::event::EventKind::Input8, callsite, "replay_input_8")
    }

    /// Refills the queue immediately after consumption (spec §4.3): keeps
    /// the next interrupt-shaped stop point already queued.
    pub fn replay_interrupt_request(&mut self, callsite: Callsite) -> Option<u32> {
        self.require_mode(Mode::Replay, "replay_interrupt_request");
        let entry = self.get_next(crate::event::EventKind::InterruptRequest, callsite, true);
        {
            let pool = &mut self.pool;
            self.reader
                .as_mut()
                .expect("mode invariant guarantees reader is present")
                .refill_after_interrupt(pool);
        }
        match entry {
            Some(e) => match e.variant {
                crate::event::EventVariant::InterruptRequest(v) => Some(v),
                _ => fatal("get_next returned an entry whose variant doesn't match its kind"),
            },
            None => None,
        }
    }

    /// Returns zero when no matching entry is queued, since the writer
    /// elides zero exit codes (spec §4.2, §4.3).
    pub fn replay_exit_request(&mut self, callsite: Callsite) -> u32 {
        self.require_mode(Mode::Replay, "replay_exit_request");
        match self.get_next(crate::event::EventKind::ExitRequest, callsite, true) {
            Some(e) => match e.variant {
                crate::event::EventVariant::ExitRequest(v) => v,
                _ => fatal("get_next returned an entry whose variant doesn't match its kind"),
            },
            None => 0,
        }
    }

    pub fn replay_debug(&mut self) {
        self.require_mode(Mode::Replay, "replay_debug");
        let current = self.current_point();
        let pool = &mut self.pool;
        let history = &mut self.history;
        self.reader
            .as_mut()
            .expect("mode invariant guarantees reader is present")
            .replay_debug(current, pool, history);
    }

    /// Pumps entries of kind `SKIPPED_CALL` matching the current program
    /// point until none remain, dispatching each sub-kind to the embedder.
    /// Refills the queue if it empties while at `MAIN_LOOP_WAIT` (spec
    /// §4.3).
    pub fn replay_skipped_calls(&mut self, callsite: Callsite) {
        self.require_mode(Mode::Replay, "replay_skipped_calls");
        loop {
            let entry = match self.get_next(crate::event::EventKind::SkippedCall, callsite, true) {
                Some(e) => e,
                None => break,
            };
            dispatch_skipped_call(&entry, self.collaborator.as_mut());
            self.pool.recycle_entry(entry);
            if callsite == Callsite::MainLoopWait && self.reader_mut("replay_skipped_calls").is_empty() {
                let pool = &mut self.pool;
                self.reader
                    .as_mut()
                    .expect("mode invariant guarantees reader is present")
                    .refill_after_interrupt(pool);
            }
        }
    }

    pub fn replay_finished(&self) -> bool {
        match &self.reader {
            Some(queue) => queue.replay_finished(self.collaborator.as_ref()),
            None => true,
        }
    }
}
