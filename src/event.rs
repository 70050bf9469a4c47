//! The event taxonomy, spec §3. Modeled as a sum type the way spec §9's
//! design notes ask for: one tagged union rather than a struct-with-tag
//! plus a C union, and the variable-length trailing buffer lives inside
//! the variant arm as an owning `Vec<u8>`, not a raw pointer + length.

use crate::callsite::Callsite;
use crate::program_point::ProgramPoint;

/// The event-kind tag. Values are the on-disk discriminant written as a
/// little-endian `u32` (spec §6).
#[repr(u32)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EventKind {
    Input1 = 0,
    Input2 = 1,
    Input4 = 2,
    Input8 = 3,
    InterruptRequest = 4,
    ExitRequest = 5,
    SkippedCall = 6,
    Debug = 7,
    Last = 8,
}

impl EventKind {
    pub fn from_u32(v: u32) -> Option<EventKind> {
        Some(match v {
            0 => EventKind::Input1,
            1 => EventKind::Input2,
            2 => EventKind::Input4,
            3 => EventKind::Input8,
            4 => EventKind::InterruptRequest,
            5 => EventKind::ExitRequest,
            6 => EventKind::SkippedCall,
            7 => EventKind::Debug,
            8 => EventKind::Last,
            _ => return None,
        })
    }

    /// The two "ambient" kinds that may legitimately precede a `DEBUG`
    /// checkpoint, per spec §4.3 step 2 and §9's open question on the
    /// skip-rule asymmetry.
    pub fn is_ambient(self) -> bool {
        matches!(self, EventKind::InterruptRequest | EventKind::SkippedCall)
    }
}

/// `SKIPPED_CALL`'s sub-kind discriminant, written first inside the
/// variant payload (spec §4.2).
#[repr(u32)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SkippedCallKind {
    CpuMemRw = 0,
    CpuMemUnmap = 1,
    MemRegionChange = 2,
    HdTransfer = 3,
    NetTransfer = 4,
    HandlePacket = 5,
}

impl SkippedCallKind {
    pub fn from_u32(v: u32) -> Option<SkippedCallKind> {
        Some(match v {
            0 => SkippedCallKind::CpuMemRw,
            1 => SkippedCallKind::CpuMemUnmap,
            2 => SkippedCallKind::MemRegionChange,
            3 => SkippedCallKind::HdTransfer,
            4 => SkippedCallKind::NetTransfer,
            5 => SkippedCallKind::HandlePacket,
            _ => return None,
        })
    }
}

/// Fixed-width integer payload for `INPUT_1/2/4/8`. The width is implied by
/// the `EventKind`, so the value is stored widened to `u64` and truncated
/// on write by the writer.
pub type InputValue = u64;

#[derive(Clone, Debug)]
pub struct MemRegionChange {
    pub start: u64,
    pub size: u64,
    pub mtype: u32,
    pub added: bool,
    pub name: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct HdTransfer {
    pub transfer_type: u32,
    pub src: u64,
    pub dest: u64,
    pub count: u64,
}

#[derive(Clone, Debug)]
pub struct NetTransfer {
    pub transfer_type: u32,
    pub src: u64,
    pub dest: u64,
    pub count: u64,
}

#[derive(Clone, Debug)]
pub struct HandlePacket {
    pub direction: u32,
    pub buf: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct CpuMemRw {
    pub addr: u64,
    pub buf: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct CpuMemUnmap {
    pub addr: u64,
    pub buf: Vec<u8>,
}

#[derive(Clone, Debug)]
pub enum SkippedCallVariant {
    CpuMemRw(CpuMemRw),
    CpuMemUnmap(CpuMemUnmap),
    MemRegionChange(MemRegionChange),
    HdTransfer(HdTransfer),
    NetTransfer(NetTransfer),
    HandlePacket(HandlePacket),
}

impl SkippedCallVariant {
    pub fn kind(&self) -> SkippedCallKind {
        match self {
            SkippedCallVariant::CpuMemRw(_) => SkippedCallKind::CpuMemRw,
            SkippedCallVariant::CpuMemUnmap(_) => SkippedCallKind::CpuMemUnmap,
            SkippedCallVariant::MemRegionChange(_) => SkippedCallKind::MemRegionChange,
            SkippedCallVariant::HdTransfer(_) => SkippedCallKind::HdTransfer,
            SkippedCallVariant::NetTransfer(_) => SkippedCallKind::NetTransfer,
            SkippedCallVariant::HandlePacket(_) => SkippedCallKind::HandlePacket,
        }
    }
}

/// The per-kind payload. `Debug` and `Last` carry no data.
#[derive(Clone, Debug)]
pub enum EventVariant {
    Input(InputValue),
    InterruptRequest(u32),
    ExitRequest(u32),
    SkippedCall(SkippedCallVariant),
    Debug,
    Last,
}

impl EventVariant {
    pub fn kind(&self, width_kind: EventKind) -> EventKind {
        match self {
            EventVariant::Input(_) => width_kind,
            EventVariant::InterruptRequest(_) => EventKind::InterruptRequest,
            EventVariant::ExitRequest(_) => EventKind::ExitRequest,
            EventVariant::SkippedCall(_) => EventKind::SkippedCall,
            EventVariant::Debug => EventKind::Debug,
            EventVariant::Last => EventKind::Last,
        }
    }
}

/// One entry in the log: header plus variant payload. `file_pos` is only
/// meaningful for entries that came from the reader — spec §9's open
/// question defines it as the byte offset of the entry's first header
/// byte; the writer leaves it at 0.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub point: ProgramPoint,
    pub kind: EventKind,
    pub callsite: Callsite,
    pub variant: EventVariant,
    pub file_pos: u64,
}

impl LogEntry {
    pub fn new(point: ProgramPoint, kind: EventKind, callsite: Callsite, variant: EventVariant) -> Self {
        LogEntry {
            point,
            kind,
            callsite,
            variant,
            file_pos: 0,
        }
    }

    /// A history-ring copy with any trailing buffer dropped, per spec §4.4:
    /// "history never owns buffers."
    pub fn history_copy(&self) -> LogEntry {
        let variant = match &self.variant {
            EventVariant::SkippedCall(sc) => EventVariant::SkippedCall(match sc {
                SkippedCallVariant::CpuMemRw(v) => SkippedCallVariant::CpuMemRw(CpuMemRw {
                    addr: v.addr,
                    buf: Vec::new(),
                }),
                SkippedCallVariant::CpuMemUnmap(v) => SkippedCallVariant::CpuMemUnmap(CpuMemUnmap {
                    addr: v.addr,
                    buf: Vec::new(),
                }),
                SkippedCallVariant::MemRegionChange(v) => {
                    SkippedCallVariant::MemRegionChange(MemRegionChange {
                        start: v.start,
                        size: v.size,
                        mtype: v.mtype,
                        added: v.added,
                        name: Vec::new(),
                    })
                }
                SkippedCallVariant::HdTransfer(v) => SkippedCallVariant::HdTransfer(v.clone()),
                SkippedCallVariant::NetTransfer(v) => SkippedCallVariant::NetTransfer(v.clone()),
                SkippedCallVariant::HandlePacket(v) => {
                    SkippedCallVariant::HandlePacket(HandlePacket {
                        direction: v.direction,
                        buf: Vec::new(),
                    })
                }
            }),
            other => other.clone(),
        };
        LogEntry {
            point: self.point,
            kind: self.kind,
            callsite: self.callsite,
            variant,
            file_pos: self.file_pos,
        }
    }
}
