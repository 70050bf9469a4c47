//! Writer (RECORD path), spec §4.2: one typed entry point per event kind,
//! each of which stamps the current program point, fills the payload, and
//! serializes it — plus the interrupt- and exit-request filters that
//! compress the dominant fraction of events.
//!
//! Write failures are fatal per spec §7; this module stays a plain
//! `io::Result`-returning layer and leaves the abort policy to the
//! controller, which is the boundary spec §7 actually describes as fatal.

use crate::callsite::Callsite;
use crate::event::{
    CpuMemRw, CpuMemUnmap, EventKind, EventVariant, HandlePacket, HdTransfer, MemRegionChange,
    NetTransfer, SkippedCallVariant,
};
use crate::lifecycle::WriteHandle;
use crate::program_point::ProgramPoint;
use crate::wire;
use std::io;

pub struct RecordWriter {
    handle: WriteHandle,
    /// Updated after every write; rewritten over the file header on clean
    /// close (spec §4.2, invariant 4).
    last_prog_point: ProgramPoint,
    /// The interrupt-request compression filter's cached last-observed
    /// value (spec §4.2).
    last_interrupt_value: Option<u32>,
}

impl RecordWriter {
    pub fn new(handle: WriteHandle) -> Self {
        RecordWriter {
            handle,
            last_prog_point: ProgramPoint::ZERO,
            last_interrupt_value: None,
        }
    }

    pub fn last_prog_point(&self) -> ProgramPoint {
        self.last_prog_point
    }

    fn write(&mut self, point: ProgramPoint, kind: EventKind, callsite: Callsite, variant: &EventVariant) -> io::Result<()> {
        wire::write_entry(self.handle.file_mut(), point, kind, callsite, variant)?;
        // Invariant 1: guest_instr_count is non-decreasing across entries written.
        debug_assert!(self.last_prog_point.guest_instr_count <= point.guest_instr_count);
        // The header holds the final *data* entry's point (invariant 4); the
        // `LAST` sentinel's own point must not overwrite it.
        if kind != EventKind::Last {
            self.last_prog_point = point;
        }
        Ok(())
    }

    pub fn record_input_1(&mut self, point: ProgramPoint, callsite: Callsite, value: u8) -> io::Result<()> {
        self.write(point, EventKind::Input1, callsite, &EventVariant::Input(value as u64))
    }

    pub fn record_input_2(&mut self, point: ProgramPoint, callsite: Callsite, value: u16) -> io::Result<()> {
        self.write(point, EventKind::Input2, callsite, &EventVariant::Input(value as u64))
    }

    pub fn record_input_4(&mut self, point: ProgramPoint, callsite: Callsite, value: u32) -> io::Result<()> {
        self.write(point, EventKind::Input4, callsite, &EventVariant::Input(value as u64))
    }

    pub fn record_input_8(&mut self, point: ProgramPoint, callsite: Callsite, value: u64) -> io::Result<()> {
        self.write(point, EventKind::Input8, callsite, &EventVariant::Input(value))
    }

    /// Writes nothing when `value` equals the last-observed interrupt
    /// mask; only transitions are recorded (spec §3 invariant 5, §4.2).
    pub fn record_interrupt_request(&mut self, point: ProgramPoint, callsite: Callsite, value: u32) -> io::Result<()> {
        if self.last_interrupt_value == Some(value) {
            return Ok(());
        }
        self.last_interrupt_value = Some(value);
        self.write(point, EventKind::InterruptRequest, callsite, &EventVariant::InterruptRequest(value))
    }

    /// Writes nothing when `value` is zero (spec §4.2).
    pub fn record_exit_request(&mut self, point: ProgramPoint, callsite: Callsite, value: u32) -> io::Result<()> {
        if value == 0 {
            return Ok(());
        }
        self.write(point, EventKind::ExitRequest, callsite, &EventVariant::ExitRequest(value))
    }

    pub fn record_cpu_mem_rw(&mut self, point: ProgramPoint, callsite: Callsite, addr: u64, buf: &[u8]) -> io::Result<()> {
        self.write(
            point,
            EventKind::SkippedCall,
            callsite,
            &EventVariant::SkippedCall(SkippedCallVariant::CpuMemRw(CpuMemRw {
                addr,
                buf: buf.to_vec(),
            })),
        )
    }

    pub fn record_cpu_mem_unmap(&mut self, point: ProgramPoint, callsite: Callsite, addr: u64, buf: &[u8]) -> io::Result<()> {
        self.write(
            point,
            EventKind::SkippedCall,
            callsite,
            &EventVariant::SkippedCall(SkippedCallVariant::CpuMemUnmap(CpuMemUnmap {
                addr,
                buf: buf.to_vec(),
            })),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_memory_region_change(
        &mut self,
        point: ProgramPoint,
        callsite: Callsite,
        start: u64,
        size: u64,
        mtype: u32,
        added: bool,
        name: &[u8],
    ) -> io::Result<()> {
        self.write(
            point,
            EventKind::SkippedCall,
            callsite,
            &EventVariant::SkippedCall(SkippedCallVariant::MemRegionChange(MemRegionChange {
                start,
                size,
                mtype,
                added,
                name: name.to_vec(),
            })),
        )
    }

    pub fn record_hd_transfer(&mut self, point: ProgramPoint, callsite: Callsite, transfer_type: u32, src: u64, dest: u64, count: u64) -> io::Result<()> {
        self.write(
            point,
            EventKind::SkippedCall,
            callsite,
            &EventVariant::SkippedCall(SkippedCallVariant::HdTransfer(HdTransfer {
                transfer_type,
                src,
                dest,
                count,
            })),
        )
    }

    pub fn record_net_transfer(&mut self, point: ProgramPoint, callsite: Callsite, transfer_type: u32, src: u64, dest: u64, count: u64) -> io::Result<()> {
        self.write(
            point,
            EventKind::SkippedCall,
            callsite,
            &EventVariant::SkippedCall(SkippedCallVariant::NetTransfer(NetTransfer {
                transfer_type,
                src,
                dest,
                count,
            })),
        )
    }

    pub fn record_handle_packet(&mut self, point: ProgramPoint, callsite: Callsite, direction: u32, buf: &[u8]) -> io::Result<()> {
        self.write(
            point,
            EventKind::SkippedCall,
            callsite,
            &EventVariant::SkippedCall(SkippedCallVariant::HandlePacket(HandlePacket {
                direction,
                buf: buf.to_vec(),
            })),
        )
    }

    /// Internal: the end-of-log sentinel, always the final entry written
    /// (spec §3 invariant 2).
    pub fn record_last(&mut self, point: ProgramPoint, callsite: Callsite) -> io::Result<()> {
        self.write(point, EventKind::Last, callsite, &EventVariant::Last)
    }

    pub fn record_debug(&mut self, point: ProgramPoint, callsite: Callsite) -> io::Result<()> {
        self.write(point, EventKind::Debug, callsite, &EventVariant::Debug)
    }

    /// Closes the writer, rewriting the header with the final program
    /// point (spec §4.1 "End record", §4.5, invariant 4).
    pub fn close(self) -> Result<(), crate::error::NdlogError> {
        let last = self.last_prog_point;
        self.handle.close(last)
    }
}
