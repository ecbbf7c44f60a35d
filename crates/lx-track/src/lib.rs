//! Incremental rebuild planning over a file dependency graph
//!
//! Given compiled objects, their sources, and per-source header lists
//! discovered by a previous compiler run, decide which objects are stale
//! and must be recompiled, and re-derive header lists that are missing or
//! out of date.
//!
//! ## Model
//!
//! Every file on disk (object, source, dependency-list file, header)
//! becomes a [`FileEntry`](entry::FileEntry) in an owned
//! [`EntryGraph`](graph::EntryGraph), stat'ed exactly once. For a
//! registered pair, the object depends on its dependency-list file and
//! its source; the dependency-list file depends on the source and every
//! header it lists. Staleness is a memoized verdict over those edges:
//! missing, or strictly older than something it depends on.
//!
//! ## Driving it
//!
//! ```no_run
//! use camino::Utf8Path;
//! use lx_cc::CompilerConfig;
//! use lx_track::DependencyTracker;
//!
//! # fn main() -> Result<(), lx_track::TrackerError> {
//! let config = CompilerConfig::new("cl.exe");
//! let mut tracker = DependencyTracker::new("/project", "/project/out", config);
//!
//! tracker.register(Utf8Path::new("out/a.o"), Utf8Path::new("src/a.c"))?;
//!
//! // refresh header lists that are missing or out of date
//! let dep_list = tracker.registration(Utf8Path::new("out/a.o"))?.dep_list.clone();
//! if tracker.is_stale(&dep_list)? {
//!     tracker.rebuild_dependencies(Utf8Path::new("out/a.o"))?;
//! }
//!
//! if tracker.is_stale(Utf8Path::new("out/a.o"))? {
//!     // hand the object to the compile phase
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The tracker is single-threaded: register, re-derive, and query in one
//! sequential planning phase, then compile stale objects with whatever
//! parallelism the driver likes.

pub mod entry;
pub mod graph;
pub mod tracker;

mod fsio;

pub use tracker::{
    DEP_LIST_SUFFIX, DependencyTracker, Registration, TrackerError, format_rebuild_time,
};
