//! External collaborators, spec §6. NDLog calls into these (upcalls) and
//! is called from instrumentation that the embedder owns; both boundaries
//! are Rust traits supplied by the embedding emulator, never implemented
//! inside this crate — VM snapshotting, the CPU loop, and the emulator's
//! own program-point bookkeeping stay out of scope (spec §1 Non-goals).

use crate::event::EventKind;
use crate::program_point::{Alignment, ProgramPoint};
use std::cmp::Ordering;
use std::path::Path;

/// The six upcalls spec §6 lists under "Callbacks consumed from the
/// emulator."
pub trait EmulatorCollaborator {
    /// Returns the current program point. Called on every record/replay
    /// step.
    fn current_program_point(&self) -> ProgramPoint;

    /// Kind-aware compare used for replay alignment (spec §3, §4.3).
    fn program_point_compare(
        &self,
        cur: ProgramPoint,
        logged: ProgramPoint,
        kind: EventKind,
    ) -> Ordering;

    /// Writes into guest physical memory during skipped-call replay.
    fn apply_cpu_mem_rw(&mut self, addr: u64, buf: &[u8]);

    /// Maps, copies, unmaps a guest region.
    fn apply_cpu_mem_unmap(&mut self, addr: u64, buf: &[u8]);

    /// Installs or removes an I/O memory region.
    fn apply_memory_region_change(&mut self, start: u64, size: u64, mtype: u32, name: &[u8], added: bool);

    /// Installs or removes a region affected by an HD/NET transfer.
    /// These two sub-kinds carry no trailing buffer; the embedder performs
    /// the transfer itself using the recorded addresses/byte count.
    fn apply_hd_transfer(&mut self, transfer_type: u32, src: u64, dest: u64, count: u64);
    fn apply_net_transfer(&mut self, transfer_type: u32, src: u64, dest: u64, count: u64);

    /// Delivers a replayed packet to the guest's network stack.
    fn apply_handle_packet(&mut self, direction: u32, buf: &[u8]);

    /// Escapes the emulator's inner loop after a fatal replay divergence.
    fn quit_cpu_loop(&mut self);
}

/// Turns an `EmulatorCollaborator::program_point_compare` result plus the
/// snapshot-flush grace rule (spec §4.3 step 3) into an [`Alignment`].
pub fn classify_alignment(cur: ProgramPoint, ordering: Ordering) -> Alignment {
    match ordering {
        Ordering::Less => Alignment::LoggedIsFuture,
        Ordering::Greater => {
            if cur.guest_instr_count == 0 {
                Alignment::Aligned
            } else {
                Alignment::LoggedIsPast
            }
        }
        Ordering::Equal => Alignment::Aligned,
    }
}

/// The VM snapshot subsystem, spec §4.1: "take VM snapshot" / "load named
/// snapshot" are external collaborator calls the controller sequences but
/// does not implement (snapshotting is a spec §1 Non-goal for this crate).
pub trait SnapshotHost {
    fn save_snapshot(&mut self, path: &Path) -> std::io::Result<()>;
    fn load_snapshot(&mut self, path: &Path) -> std::io::Result<()>;
}
