//! Log lifecycle, spec §4.5: create/open/close the log file, write and
//! re-write the 24-byte header, and report replay progress at 1%
//! granularity. Uses `nix::sys::stat::fstat` for the open-for-read size
//! probe, the same call the teacher's own `RecordSession` reaches for when
//! it needs a file's size.

use crate::error::NdlogError;
use crate::log::LogLevel::LogInfo;
use crate::program_point::ProgramPoint;
use crate::wire;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// A freshly created, write-mode log file with its placeholder header
/// already on disk.
pub struct WriteHandle {
    file: File,
    path: PathBuf,
}

impl WriteHandle {
    /// Creates the log file and writes a placeholder 24-byte header
    /// (all zero; rewritten on clean close with the final program point).
    pub fn create(path: &Path) -> Result<WriteHandle, NdlogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|source| NdlogError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        wire::write_header(&mut file, ProgramPoint::ZERO).map_err(|source| NdlogError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(WriteHandle {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Rewinds and rewrites the header with the final `last_prog_point`,
    /// then closes the file (spec §4.1 "End record").
    pub fn close(mut self, last_prog_point: ProgramPoint) -> Result<(), NdlogError> {
        self.file
            .flush()
            .map_err(|source| NdlogError::Create {
                path: self.path.clone(),
                source,
            })?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|source| NdlogError::Create {
                path: self.path.clone(),
                source,
            })?;
        wire::write_header(&mut self.file, last_prog_point).map_err(|source| NdlogError::Create {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// An open-for-read log file: the header value and the file's total size,
/// used to detect the `fill_queue` end-of-file stop condition.
pub struct ReadHandle {
    file: File,
    pub log_size: u64,
    pub last_prog_point: ProgramPoint,
    pub offset: u64,
}

impl ReadHandle {
    pub fn open(path: &Path) -> Result<ReadHandle, NdlogError> {
        let mut file = File::open(path).map_err(|source| NdlogError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let stat = nix::sys::stat::fstat(file.as_raw_fd()).map_err(|source| NdlogError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let log_size = stat.st_size as u64;
        let last_prog_point = wire::read_header(&mut file).map_err(|_| NdlogError::TruncatedHeader {
            path: path.to_path_buf(),
            got: log_size.min(wire::HEADER_SIZE) as usize,
            expected: wire::HEADER_SIZE as usize,
        })?;
        Ok(ReadHandle {
            file,
            log_size,
            last_prog_point,
            offset: wire::HEADER_SIZE,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn at_eof(&self) -> bool {
        self.offset >= self.log_size
    }
}

/// Progress reporting, spec §4.5: prints guest-instruction-count and ratio
/// against the header's `last_prog_point.guest_instr_count` at 1%
/// granularity. Called from `fill_queue` whenever the next threshold is
/// crossed.
pub struct ProgressReporter {
    last_reported_percent: u64,
    granularity: u64,
}

impl ProgressReporter {
    pub fn new(granularity: u64) -> Self {
        ProgressReporter {
            last_reported_percent: 0,
            granularity: granularity.max(1),
        }
    }

    pub fn maybe_report(&mut self, current_instr_count: u64, last_instr_count: u64) {
        if last_instr_count == 0 {
            return;
        }
        let percent = ((current_instr_count as u128 * 100) / last_instr_count as u128) as u64;
        let percent = percent.min(100);
        if percent >= self.last_reported_percent + self.granularity || (percent == 100 && self.last_reported_percent < 100) {
            self.last_reported_percent = percent - (percent % self.granularity);
            log!(
                LogInfo,
                "replay progress: {}/{} instructions ({}%)",
                current_instr_count,
                last_instr_count,
                percent
            );
        }
    }
}
