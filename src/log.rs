//! A small hand-rolled logging facility, in the same spirit as `rd`'s own
//! `crate::log` module: a level enum plus a `log!` macro, no external
//! logging crate involved.

use std::cell::Cell;
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Debug)]
pub enum LogLevel {
    LogDebug,
    LogInfo,
    LogWarn,
    LogError,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::LogDebug => "DEBUG",
            LogLevel::LogInfo => "INFO",
            LogLevel::LogWarn => "WARN",
            LogLevel::LogError => "ERROR",
        };
        f.write_str(s)
    }
}

thread_local! {
    static MIN_LEVEL: Cell<LogLevel> = Cell::new(LogLevel::LogInfo);
}

/// Raises or lowers the level below which `log!` calls on this thread are
/// suppressed. Tests use this to quiet `LogDebug` chatter.
pub fn set_min_level(level: LogLevel) {
    MIN_LEVEL.with(|c| c.set(level));
}

#[doc(hidden)]
pub fn enabled(level: LogLevel) -> bool {
    MIN_LEVEL.with(|c| level >= c.get())
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            eprintln!("[ndlog {}] {}", $level, format_args!($($arg)*));
        }
    };
}
