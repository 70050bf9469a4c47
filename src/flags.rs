//! Process-wide configuration, in the same shape as `rd`'s own
//! `src/flags.rs`: a struct behind a `lazy_static!` singleton.
//!
//! Unlike `rd`'s flags (parsed from command-line arguments at startup),
//! NDLog's bounds are spec-mandated constants that rarely need overriding;
//! the singleton mainly exists so they're defined in one place, and tests
//! can still build an alternate `Config` without touching global state.

/// Bound on the look-ahead queue, per spec §4.3. `fill_queue` never grows
/// the queue past this plus the one entry that triggered the stop
/// condition.
pub const MAX_QUEUE_LEN: usize = 65536;

/// Size of the diagnostic-only history ring, per spec §4.4.
pub const HIST_SIZE: usize = 10;

/// Percent granularity at which `fill_queue` reports progress, per spec
/// §4.5.
pub const PROGRESS_GRANULARITY_PERCENT: u64 = 1;

#[derive(Clone, Debug)]
pub struct Config {
    pub max_queue_len: usize,
    pub hist_size: usize,
    pub progress_granularity_percent: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_queue_len: MAX_QUEUE_LEN,
            hist_size: HIST_SIZE,
            progress_granularity_percent: PROGRESS_GRANULARITY_PERCENT,
        }
    }
}

lazy_static! {
    static ref CONFIG: Config = Config::default();
}

impl Config {
    pub fn get() -> &'static Config {
        &CONFIG
    }
}

/// Builds the on-disk log path for a record name, per spec §6:
/// `DIR/NAME-rr-nondet.log`.
pub fn log_path(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}-rr-nondet.log", name))
}

/// Builds the companion snapshot path for a record name, per spec §6:
/// `DIR/NAME-rr-snp`. The snapshot itself is owned by the external
/// snapshot subsystem (see [`crate::collab::SnapshotHost`]); NDLog only
/// needs its name to hand to that collaborator.
pub fn snapshot_path(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}-rr-snp", name))
}
