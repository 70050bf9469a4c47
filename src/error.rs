//! Error handling per spec §7: two tiers. Open-time and I/O setup failures
//! are an ordinary `Result`-propagated error; everything that happens once
//! record or replay is actually running is fatal by policy and goes
//! through [`fatal`] / the `fatal_divergence!` macro, in the same spirit as
//! `rd`'s `ed_assert!` — print a diagnostic, then abort. There is no
//! recovery path; spec.md is explicit that record/replay logs are not
//! crash-safe beyond what the OS provides.

use crate::event::EventKind;
use crate::log::LogLevel::LogError;
use crate::program_point::ProgramPoint;
use std::path::PathBuf;
use std::process;

#[derive(thiserror::Error, Debug)]
pub enum NdlogError {
    #[error("failed to create log file {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("log header in {path:?} is truncated ({got} of {expected} bytes)")]
    TruncatedHeader {
        path: PathBuf,
        got: usize,
        expected: usize,
    },
    #[error("could not stat log file {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
}

pub type Result<T> = std::result::Result<T, NdlogError>;

/// Prints a diagnostic and aborts the process. Used for every failure that
/// spec §7 classifies as fatal: a short write, an I/O error while actively
/// recording or replaying, a `SKIPPED_CALL` sub-kind the reader doesn't
/// recognize, or caller misuse (`record_*` outside RECORD, `replay_*`
/// outside REPLAY).
pub fn fatal(message: &str) -> ! {
    log!(LogError, "fatal: {}", message);
    process::abort();
}

/// Dumps the expected/actual program points and the offending kind, then
/// aborts. This is the one path spec §7 calls "fatal divergence."
pub fn fatal_divergence(
    what: &str,
    current: ProgramPoint,
    logged: ProgramPoint,
    kind: EventKind,
) -> ! {
    log!(
        LogError,
        "divergence: {} — current={:?} logged={:?} kind={:?}",
        what,
        current,
        logged,
        kind
    );
    process::abort();
}

#[macro_export]
macro_rules! ndlog_assert {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::error::fatal(&format!($($arg)*));
        }
    };
}
