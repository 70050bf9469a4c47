//! `ndlog-inspect`: opens a log read-only and prints a JSON summary of its
//! header and per-kind entry counts, in the same shape as
//! `trace_info_command.rs`'s JSON dump (`serde` struct, `serde_json::to_writer_pretty`).

use crate::commands::Command;
use crate::event::EventKind;
use crate::lifecycle::ReadHandle;
use crate::wire;
use serde::Serialize;
use std::io;
use std::path::PathBuf;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgramPointDump {
    guest_instr_count: u64,
    pc: u64,
    secondary: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KindReport {
    kind: String,
    count: u64,
    bytes: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectReport {
    log_path: PathBuf,
    log_size: u64,
    header_last_prog_point: ProgramPointDump,
    total_entries: u64,
    kinds: Vec<KindReport>,
}

fn kind_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Input1 => "INPUT_1",
        EventKind::Input2 => "INPUT_2",
        EventKind::Input4 => "INPUT_4",
        EventKind::Input8 => "INPUT_8",
        EventKind::InterruptRequest => "INTERRUPT_REQUEST",
        EventKind::ExitRequest => "EXIT_REQUEST",
        EventKind::SkippedCall => "SKIPPED_CALL",
        EventKind::Debug => "DEBUG",
        EventKind::Last => "LAST",
    }
}

const ALL_KINDS: [EventKind; 9] = [
    EventKind::Input1,
    EventKind::Input2,
    EventKind::Input4,
    EventKind::Input8,
    EventKind::InterruptRequest,
    EventKind::ExitRequest,
    EventKind::SkippedCall,
    EventKind::Debug,
    EventKind::Last,
];

pub struct InspectCommand {
    log_path: PathBuf,
}

impl InspectCommand {
    pub fn new(log_path: PathBuf) -> InspectCommand {
        InspectCommand { log_path }
    }
}

impl Command for InspectCommand {
    /// Walks the whole file unconditionally — unlike `ReplayQueue::fill_queue`,
    /// this has no look-ahead bound and no interrupt/main-loop-wait stop
    /// condition, since it never drives replay and just wants every entry.
    fn run(&mut self) -> io::Result<()> {
        let mut handle = ReadHandle::open(&self.log_path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let mut counts = [0u64; 9];
        let mut bytes = [0u64; 9];
        let mut total_entries = 0u64;

        loop {
            let file_pos = handle.offset;
            let before = file_pos;
            let entry = wire::read_entry(handle.file_mut(), file_pos)?;
            let entry = match entry {
                None => break,
                Some(entry) => entry,
            };
            // read_entry doesn't report bytes consumed directly; recompute
            // from the stream position instead of wrapping in a counting
            // reader just for this one-shot walk.
            let after = {
                use std::io::{Seek, SeekFrom};
                handle.file_mut().seek(SeekFrom::Current(0))?
            };
            handle.offset = after;
            let idx = entry.kind as usize;
            counts[idx] += 1;
            bytes[idx] += after - before;
            total_entries += 1;
        }

        let kinds = ALL_KINDS
            .iter()
            .enumerate()
            .filter(|(idx, _)| counts[*idx] > 0)
            .map(|(idx, kind)| KindReport {
                kind: kind_name(*kind).to_string(),
                count: counts[idx],
                bytes: bytes[idx],
            })
            .collect();

        let report = InspectReport {
            log_path: self.log_path.clone(),
            log_size: handle.log_size,
            header_last_prog_point: ProgramPointDump {
                guest_instr_count: handle.last_prog_point.guest_instr_count,
                pc: handle.last_prog_point.pc,
                secondary: handle.last_prog_point.secondary,
            },
            total_entries,
            kinds,
        };

        serde_json::to_writer_pretty(io::stdout(), &report)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        println!();
        Ok(())
    }
}
