//! Callsite identifiers, spec §3 / GLOSSARY: a small enum naming *where in
//! the emulator's control flow* an event was recorded. spec.md names two
//! directly (`CPU_LOOP`, `MAIN_LOOP_WAIT`) and calls the rest "e.g." — not
//! exhaustive (see `SPEC_FULL.md` §3). Only `CpuLoop` and `MainLoopWait`
//! have spec-mandated behavior (the `fill_queue` stop conditions and the
//! `replay_skipped_calls` refill rule); the others are opaque labels
//! carried verbatim and checked only when a consumer asks for it.

#[repr(u32)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Callsite {
    CpuLoop = 0,
    MainLoopWait = 1,
    IoPortIo = 2,
    Mmio = 3,
    Init = 4,
    Other = 5,
}

impl Callsite {
    pub fn from_u32(v: u32) -> Option<Callsite> {
        Some(match v {
            0 => Callsite::CpuLoop,
            1 => Callsite::MainLoopWait,
            2 => Callsite::IoPortIo,
            3 => Callsite::Mmio,
            4 => Callsite::Init,
            5 => Callsite::Other,
            _ => return None,
        })
    }
}
