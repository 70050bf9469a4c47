//! Binary framing: explicit little-endian encode/decode of the header
//! tuple and every variant payload (spec §4.2, §6). Deliberately not a
//! `#[repr(C)]` transmute — `byteorder` pins the wire format independent
//! of host struct layout, the same approach the pack's disk-backed buffer
//! and recovery-log crates take for their own on-disk formats.
//!
//! Per spec §9's open question on the buffer-pointer field: the reference
//! format reserves 8 bytes for a pointer that's meaningless on disk. This
//! implementation writes zero there and ignores it on read, as the spec
//! explicitly permits.

use crate::callsite::Callsite;
use crate::event::{
    CpuMemRw, CpuMemUnmap, EventKind, EventVariant, HandlePacket, HdTransfer, LogEntry,
    MemRegionChange, NetTransfer, SkippedCallKind, SkippedCallVariant,
};
use crate::program_point::ProgramPoint;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const HEADER_SIZE: u64 = 24;

pub fn write_program_point<W: Write>(w: &mut W, p: ProgramPoint) -> io::Result<()> {
    w.write_u64::<LittleEndian>(p.guest_instr_count)?;
    w.write_u64::<LittleEndian>(p.pc)?;
    w.write_u64::<LittleEndian>(p.secondary)?;
    Ok(())
}

pub fn read_program_point<R: Read>(r: &mut R) -> io::Result<ProgramPoint> {
    let guest_instr_count = r.read_u64::<LittleEndian>()?;
    let pc = r.read_u64::<LittleEndian>()?;
    let secondary = r.read_u64::<LittleEndian>()?;
    Ok(ProgramPoint::new(guest_instr_count, pc, secondary))
}

/// Writes the 24-byte on-disk header: the highest `guest_instr_count` seen
/// during record (spec §3, §4.5).
pub fn write_header<W: Write>(w: &mut W, last_prog_point: ProgramPoint) -> io::Result<()> {
    write_program_point(w, last_prog_point)
}

pub fn read_header<R: Read>(r: &mut R) -> io::Result<ProgramPoint> {
    read_program_point(r)
}

fn write_buf_ptr_placeholder<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_u64::<LittleEndian>(0)
}

fn skip_buf_ptr_placeholder<R: Read>(r: &mut R) -> io::Result<()> {
    let _ = r.read_u64::<LittleEndian>()?;
    Ok(())
}

/// Writes one entry: header-tuple, then variant payload (sub-kind tag
/// first for `SKIPPED_CALL`), then any trailing buffer (spec §4.2).
pub fn write_entry<W: Write>(
    w: &mut W,
    point: ProgramPoint,
    kind: EventKind,
    callsite: Callsite,
    variant: &EventVariant,
) -> io::Result<()> {
    write_program_point(w, point)?;
    w.write_u32::<LittleEndian>(kind as u32)?;
    w.write_u32::<LittleEndian>(callsite as u32)?;
    write_variant(w, kind, variant)
}

fn write_variant<W: Write>(w: &mut W, kind: EventKind, variant: &EventVariant) -> io::Result<()> {
    match variant {
        EventVariant::Input(v) => match kind {
            EventKind::Input1 => w.write_u8(*v as u8),
            EventKind::Input2 => w.write_u16::<LittleEndian>(*v as u16),
            EventKind::Input4 => w.write_u32::<LittleEndian>(*v as u32),
            EventKind::Input8 => w.write_u64::<LittleEndian>(*v),
            _ => unreachable!("Input variant paired with non-input kind"),
        },
        EventVariant::InterruptRequest(v) => w.write_u32::<LittleEndian>(*v),
        EventVariant::ExitRequest(v) => w.write_u32::<LittleEndian>(*v),
        EventVariant::Debug | EventVariant::Last => Ok(()),
        EventVariant::SkippedCall(sc) => {
            w.write_u32::<LittleEndian>(sc.kind() as u32)?;
            match sc {
                SkippedCallVariant::CpuMemRw(v) => {
                    w.write_u64::<LittleEndian>(v.addr)?;
                    w.write_u64::<LittleEndian>(v.buf.len() as u64)?;
                    write_buf_ptr_placeholder(w)?;
                    w.write_all(&v.buf)
                }
                SkippedCallVariant::CpuMemUnmap(v) => {
                    w.write_u64::<LittleEndian>(v.addr)?;
                    w.write_u64::<LittleEndian>(v.buf.len() as u64)?;
                    write_buf_ptr_placeholder(w)?;
                    w.write_all(&v.buf)
                }
                SkippedCallVariant::MemRegionChange(v) => {
                    w.write_u64::<LittleEndian>(v.start)?;
                    w.write_u64::<LittleEndian>(v.size)?;
                    w.write_u32::<LittleEndian>(v.mtype)?;
                    w.write_u8(v.added as u8)?;
                    w.write_u32::<LittleEndian>(v.name.len() as u32)?;
                    w.write_all(&v.name)
                }
                SkippedCallVariant::HdTransfer(v) => {
                    w.write_u32::<LittleEndian>(v.transfer_type)?;
                    w.write_u64::<LittleEndian>(v.src)?;
                    w.write_u64::<LittleEndian>(v.dest)?;
                    w.write_u64::<LittleEndian>(v.count)
                }
                SkippedCallVariant::NetTransfer(v) => {
                    w.write_u32::<LittleEndian>(v.transfer_type)?;
                    w.write_u64::<LittleEndian>(v.src)?;
                    w.write_u64::<LittleEndian>(v.dest)?;
                    w.write_u64::<LittleEndian>(v.count)
                }
                SkippedCallVariant::HandlePacket(v) => {
                    w.write_u32::<LittleEndian>(v.buf.len() as u32)?;
                    w.write_u32::<LittleEndian>(v.direction)?;
                    write_buf_ptr_placeholder(w)?;
                    w.write_all(&v.buf)
                }
            }
        }
    }
}

/// Reads one entry at `file_pos` (the byte offset of its first header
/// byte — spec §9's definition) into an existing shell, overwriting its
/// fields in place so callers can source the shell from the entry pool
/// (spec §4.4) instead of allocating a fresh `LogEntry` per read. Returns
/// `Ok(false)` only on a clean EOF before any bytes of a new entry were
/// read, leaving `entry` untouched; any other short read is an
/// `UnexpectedEof` error, which the caller treats as fatal per spec §7.
pub fn read_entry_into<R: Read>(r: &mut R, file_pos: u64, entry: &mut LogEntry) -> io::Result<bool> {
    let mut probe = [0u8; 8];
    let n = read_fill_or_eof(r, &mut probe)?;
    if n == 0 {
        return Ok(false);
    }
    if n < 8 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated entry header"));
    }
    let guest_instr_count = u64::from_le_bytes(probe);
    let pc = r.read_u64::<LittleEndian>()?;
    let secondary = r.read_u64::<LittleEndian>()?;
    let point = ProgramPoint::new(guest_instr_count, pc, secondary);
    let kind_raw = r.read_u32::<LittleEndian>()?;
    let kind = EventKind::from_u32(kind_raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown event kind"))?;
    let callsite_raw = r.read_u32::<LittleEndian>()?;
    let callsite = Callsite::from_u32(callsite_raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown callsite"))?;
    let variant = read_variant(r, kind)?;
    entry.point = point;
    entry.kind = kind;
    entry.callsite = callsite;
    entry.variant = variant;
    entry.file_pos = file_pos;
    Ok(true)
}

/// Reads one entry at `file_pos` into a freshly allocated `LogEntry`, for
/// callers with no entry pool to draw a shell from (the `ndlog-inspect`
/// CLI, which reads a whole log without replaying it).
pub fn read_entry<R: Read>(r: &mut R, file_pos: u64) -> io::Result<Option<LogEntry>> {
    let mut entry = LogEntry::new(ProgramPoint::ZERO, EventKind::Debug, Callsite::Other, EventVariant::Debug);
    if read_entry_into(r, file_pos, &mut entry)? {
        Ok(Some(entry))
    } else {
        Ok(None)
    }
}

fn read_fill_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

fn read_variant<R: Read>(r: &mut R, kind: EventKind) -> io::Result<EventVariant> {
    Ok(match kind {
        EventKind::Input1 => EventVariant::Input(r.read_u8()? as u64),
        EventKind::Input2 => EventVariant::Input(r.read_u16::<LittleEndian>()? as u64),
        EventKind::Input4 => EventVariant::Input(r.read_u32::<LittleEndian>()? as u64),
        EventKind::Input8 => EventVariant::Input(r.read_u64::<LittleEndian>()?),
        EventKind::InterruptRequest => EventVariant::InterruptRequest(r.read_u32::<LittleEndian>()?),
        EventKind::ExitRequest => EventVariant::ExitRequest(r.read_u32::<LittleEndian>()?),
        EventKind::Debug => EventVariant::Debug,
        EventKind::Last => EventVariant::Last,
        EventKind::SkippedCall => {
            let sub_raw = r.read_u32::<LittleEndian>()?;
            let sub = SkippedCallKind::from_u32(sub_raw).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "unknown skipped-call sub-kind")
            })?;
            EventVariant::SkippedCall(match sub {
                SkippedCallKind::CpuMemRw => {
                    let addr = r.read_u64::<LittleEndian>()?;
                    let len = r.read_u64::<LittleEndian>()? as usize;
                    skip_buf_ptr_placeholder(r)?;
                    let mut buf = vec![0u8; len];
                    r.read_exact(&mut buf)?;
                    SkippedCallVariant::CpuMemRw(CpuMemRw { addr, buf })
                }
                SkippedCallKind::CpuMemUnmap => {
                    let addr = r.read_u64::<LittleEndian>()?;
                    let len = r.read_u64::<LittleEndian>()? as usize;
                    skip_buf_ptr_placeholder(r)?;
                    let mut buf = vec![0u8; len];
                    r.read_exact(&mut buf)?;
                    SkippedCallVariant::CpuMemUnmap(CpuMemUnmap { addr, buf })
                }
                SkippedCallKind::MemRegionChange => {
                    let start = r.read_u64::<LittleEndian>()?;
                    let size = r.read_u64::<LittleEndian>()?;
                    let mtype = r.read_u32::<LittleEndian>()?;
                    let added = r.read_u8()? != 0;
                    let name_len = r.read_u32::<LittleEndian>()? as usize;
                    let mut name = vec![0u8; name_len];
                    r.read_exact(&mut name)?;
                    SkippedCallVariant::MemRegionChange(MemRegionChange {
                        start,
                        size,
                        mtype,
                        added,
                        name,
                    })
                }
                SkippedCallKind::HdTransfer => {
                    let transfer_type = r.read_u32::<LittleEndian>()?;
                    let src = r.read_u64::<LittleEndian>()?;
                    let dest = r.read_u64::<LittleEndian>()?;
                    let count = r.read_u64::<LittleEndian>()?;
                    SkippedCallVariant::HdTransfer(HdTransfer {
                        transfer_type,
                        src,
                        dest,
                        count,
                    })
                }
                SkippedCallKind::NetTransfer => {
                    let transfer_type = r.read_u32::<LittleEndian>()?;
                    let src = r.read_u64::<LittleEndian>()?;
                    let dest = r.read_u64::<LittleEndian>()?;
                    let count = r.read_u64::<LittleEndian>()?;
                    SkippedCallVariant::NetTransfer(NetTransfer {
                        transfer_type,
                        src,
                        dest,
                        count,
                    })
                }
                SkippedCallKind::HandlePacket => {
                    let size = r.read_u32::<LittleEndian>()? as usize;
                    let direction = r.read_u32::<LittleEndian>()?;
                    skip_buf_ptr_placeholder(r)?;
                    let mut buf = vec![0u8; size];
                    r.read_exact(&mut buf)?;
                    SkippedCallVariant::HandlePacket(HandlePacket { direction, buf })
                }
            })
        }
    })
}
