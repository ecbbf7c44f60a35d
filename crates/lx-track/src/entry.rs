//! File entries: a tracked path plus its stat-once metadata

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;

/// Filesystem facts about a path, captured exactly once.
///
/// Any error while statting (missing file, permission denied, transient
/// I/O) reads as "does not exist". A missing artifact gets rebuilt, so
/// that failure mode costs time, never correctness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMeta {
    pub exists: bool,
    pub mtime: Option<Timestamp>,
}

impl FileMeta {
    pub const MISSING: Self = Self {
        exists: false,
        mtime: None,
    };

    /// Stat the filesystem. The only I/O an entry ever performs.
    pub fn probe(path: &Utf8Path) -> Self {
        match std::fs::metadata(path.as_std_path()) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|time| Timestamp::try_from(time).ok());
                Self {
                    exists: true,
                    mtime,
                }
            }
            Err(_) => Self::MISSING,
        }
    }
}

/// Memoized staleness verdict for one entry.
///
/// Computed at most once per entry per tracker lifetime; entries are
/// never reused across build invocations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Staleness {
    #[default]
    NotComputed,
    Stale,
    Fresh,
}

/// How a path came to be tracked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Named in a registration: object, source, or dependency-list file
    Registered,
    /// Read out of a dependency-list file
    Discovered,
}

/// One tracked file
#[derive(Clone, Debug)]
pub struct FileEntry {
    /// Absolute, normalized path; the entry's identity
    pub path: Utf8PathBuf,
    pub exists: bool,
    /// Modification time, when the file exists and reports one
    pub mtime: Option<Timestamp>,
    pub(crate) origin: EntryOrigin,
    pub(crate) staleness: Staleness,
}

impl FileEntry {
    pub(crate) fn new(path: Utf8PathBuf, meta: FileMeta, origin: EntryOrigin) -> Self {
        Self {
            path,
            exists: meta.exists,
            mtime: meta.mtime,
            origin,
            staleness: Staleness::NotComputed,
        }
    }
}
