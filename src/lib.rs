//! NDLog: the non-deterministic event log for a whole-system
//! record-and-replay facility. Records everything the deterministic guest
//! CPU loop can't reconstruct on its own — device inputs, interrupt and
//! exit requests, and side-effecting calls the replaying side skips and
//! instead replays from the log — as a compact append-only binary stream,
//! and replays it back aligned to the guest's own deterministic program
//! points.
//!
//! Module map:
//! - [`program_point`], [`callsite`], [`event`] — the data model (spec §3).
//! - [`wire`] — the on-disk binary format (spec §4.2/§6).
//! - [`writer`], [`reader`] — the two halves of the control surface
//!   (spec §4.2, §4.3).
//! - [`allocator`] — the entry-recycling pool and diagnostic history ring
//!   (spec §4.4).
//! - [`lifecycle`] — file open/create/close, header, progress reporting
//!   (spec §4.5).
//! - [`collab`] — the embedder-supplied traits NDLog calls into (spec §6).
//! - [`controller`] — `Mode`, request flags, and the `ReplayEngine` that
//!   owns everything above (spec §4.1, §5, §9).
//! - [`commands`] — the `ndlog-inspect` CLI.

#[macro_use]
pub mod log;
#[macro_use]
pub mod error;

pub mod allocator;
pub mod callsite;
pub mod collab;
pub mod commands;
pub mod controller;
pub mod event;
pub mod flags;
pub mod lifecycle;
pub mod program_point;
pub mod reader;
pub mod wire;
pub mod writer;

pub use callsite::Callsite;
pub use collab::{EmulatorCollaborator, SnapshotHost};
pub use controller::{EndReplayReason, Mode, ReplayEngine};
pub use error::NdlogError;
pub use event::{EventKind, EventVariant, LogEntry, SkippedCallKind, SkippedCallVariant};
pub use program_point::ProgramPoint;
