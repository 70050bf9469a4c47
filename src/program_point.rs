//! The deterministic program point, spec §3 / GLOSSARY: a triple
//! identifying a moment in the guest's execution. `guest_instr_count` is
//! the authoritative deterministic clock; `pc` and `secondary` are
//! advisory and carried through unchanged.

use static_assertions::const_assert_eq;
use std::mem::size_of;

#[derive(Copy, Clone, Eq, PartialEq, Default, Debug)]
pub struct ProgramPoint {
    pub guest_instr_count: u64,
    pub pc: u64,
    pub secondary: u64,
}

// Three u64 fields, no padding: this is the 24-byte on-disk header and the
// fixed prefix of every entry (spec §3, §6).
const_assert_eq!(size_of::<ProgramPoint>(), 24);

impl ProgramPoint {
    pub const fn new(guest_instr_count: u64, pc: u64, secondary: u64) -> Self {
        ProgramPoint {
            guest_instr_count,
            pc,
            secondary,
        }
    }

    pub const ZERO: ProgramPoint = ProgramPoint::new(0, 0, 0);

    /// Invariant 1 (spec §3): `guest_instr_count` is non-decreasing across
    /// entries written. This is the ordering used for that check and for
    /// monotonicity assertions; it intentionally does not compare `pc`/
    /// `secondary` — those are advisory and carried through unchanged, not
    /// load-bearing for ordering.
    pub fn instr_count_le(&self, other: &ProgramPoint) -> bool {
        self.guest_instr_count <= other.guest_instr_count
    }
}

/// The three-way outcome of comparing the current program point to a
/// logged one, from the perspective of replay alignment (spec §4.3).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Alignment {
    /// The logged entry is still ahead of where the guest has executed to;
    /// the caller should try again later.
    LoggedIsFuture,
    /// The logged entry matches (or, for the snapshot-flush grace case,
    /// `current.guest_instr_count == 0`).
    Aligned,
    /// The guest has already run past the logged entry without consuming
    /// it — a fatal divergence.
    LoggedIsPast,
}
