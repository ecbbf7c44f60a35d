//! The dependency tracker
//!
//! One tracker per build invocation. The driver registers every
//! (object, source) pair, re-derives dependency lists whose on-disk file
//! is missing or stale, then asks which objects are stale and compiles
//! only those, in whatever order or parallelism it chooses.
//!
//! The tracker is single-threaded and stateful: registration and
//! re-derivation belong to a sequential planning phase, and the first
//! staleness query seals it. Nothing here persists across invocations
//! except the dependency-list files themselves; the in-memory graph is
//! rebuilt from disk timestamps every run.
//!
//! ## Dependency-list files
//!
//! For a registered object, `<object>.dep` holds one project-local header
//! path per line, root-relative, sorted, as reported by the compiler's
//! last include scan. Absence is valid: it means "no known header
//! dependencies yet" and makes the dep-list entry stale, which drives the
//! driver to re-derive it.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use lx_cc::include_report;
use lx_cc::{CompilerConfig, IncludeScanner, ProcessScanner, ScanError};

use crate::entry::{EntryOrigin, FileMeta};
use crate::fsio;
use crate::graph::{EntryGraph, GraphError};

/// Suffix appended to an object path to name its dependency-list file
pub const DEP_LIST_SUFFIX: &str = ".dep";

/// Errors from the tracker's public surface.
///
/// Duplicate registrations, unknown paths, and sealed-phase registrations
/// are driver-logic faults and should abort the build; continuing would
/// leave the graph incoherent.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("already registered in dependency tracker: {path}")]
    DuplicateRegistration { path: Utf8PathBuf },

    #[error("path was never registered or discovered: {path}")]
    UnknownPath { path: Utf8PathBuf },

    #[error("registration of {object} after staleness queries began")]
    RegistrationSealed { object: Utf8PathBuf },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to read dependency list {path}: {source}")]
    DepListRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write dependency list {path}: {source}")]
    DepListWrite {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Scanner(#[from] ScanError),

    #[error("include scan for {source_file} reported nothing and exited with code {exit_code}:\n{stderr}")]
    DerivationFailed {
        source_file: Utf8PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to write tracker dump {path}: {source}")]
    DumpWrite {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The recorded halves of a registered object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Source file the object is compiled from
    pub source: Utf8PathBuf,
    /// On-disk header list from the last include scan
    pub dep_list: Utf8PathBuf,
}

/// Staleness oracle for one build invocation
pub struct DependencyTracker {
    /// Boundary for the include filter: headers outside it are system
    /// headers and are not tracked
    project_root: Utf8PathBuf,
    /// Build output directory, used to shorten paths in logs and the dump
    output_root: Utf8PathBuf,
    config: CompilerConfig,
    scanner: Box<dyn IncludeScanner>,
    graph: EntryGraph,
    registrations: HashMap<Utf8PathBuf, Registration>,
    rebuild_time: Duration,
    /// Set by the first staleness query; registration is refused after
    sealed: bool,
}

impl DependencyTracker {
    /// Tracker backed by the real compiler.
    ///
    /// Both roots are expected absolute; the driver owns them. Relative
    /// registered paths resolve against the project root.
    pub fn new(
        project_root: impl Into<Utf8PathBuf>,
        output_root: impl Into<Utf8PathBuf>,
        config: CompilerConfig,
    ) -> Self {
        Self::with_scanner(project_root, output_root, config, Box::new(ProcessScanner))
    }

    /// Tracker with an injected include scanner.
    pub fn with_scanner(
        project_root: impl Into<Utf8PathBuf>,
        output_root: impl Into<Utf8PathBuf>,
        config: CompilerConfig,
        scanner: Box<dyn IncludeScanner>,
    ) -> Self {
        Self {
            project_root: normalize(&project_root.into()),
            output_root: normalize(&output_root.into()),
            config,
            scanner,
            graph: EntryGraph::new(),
            registrations: HashMap::new(),
            rebuild_time: Duration::ZERO,
            sealed: false,
        }
    }

    /// Register one (object, source) work item.
    ///
    /// Canonicalizes both paths, derives the dependency-list path as
    /// `<object>.dep`, creates entries for all three, and wires
    /// object → dep-list, object → source, dep-list → source. If the
    /// dependency-list file exists on disk, every header it lists gets an
    /// entry (shared with other registrations that list it) and a
    /// dep-list → header edge.
    ///
    /// Each physical file is registered at most once per invocation. A
    /// source already known as another object's header is reused; a
    /// source registered twice is an error.
    pub fn register(&mut self, object: &Utf8Path, source: &Utf8Path) -> Result<(), TrackerError> {
        if self.sealed {
            return Err(TrackerError::RegistrationSealed {
                object: object.to_owned(),
            });
        }

        let object = self.absolutize(object);
        let source = self.absolutize(source);
        let dep_list = Utf8PathBuf::from(format!("{object}{DEP_LIST_SUFFIX}"));

        for path in [&object, &dep_list] {
            if self.graph.id_of(path).is_some() {
                return Err(TrackerError::DuplicateRegistration {
                    path: (*path).clone(),
                });
            }
        }
        if let Some(id) = self.graph.id_of(&source) {
            if self.graph.entry(id)?.origin == EntryOrigin::Registered {
                return Err(TrackerError::DuplicateRegistration { path: source });
            }
        }

        let object_id =
            self.graph
                .insert(object.clone(), FileMeta::probe(&object), EntryOrigin::Registered)?;
        let dep_meta = FileMeta::probe(&dep_list);
        let dep_id = self
            .graph
            .insert(dep_list.clone(), dep_meta, EntryOrigin::Registered)?;
        let source_id = match self.graph.id_of(&source) {
            Some(id) => {
                self.graph.mark_registered(id)?;
                id
            }
            None => self.graph.insert(
                source.clone(),
                FileMeta::probe(&source),
                EntryOrigin::Registered,
            )?,
        };

        self.graph.depends_on(object_id, dep_id)?;
        self.graph.depends_on(object_id, source_id)?;
        self.graph.depends_on(dep_id, source_id)?;

        let mut headers = 0usize;
        if dep_meta.exists {
            let contents =
                std::fs::read_to_string(&dep_list).map_err(|source| TrackerError::DepListRead {
                    path: dep_list.clone(),
                    source,
                })?;
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let header = self.absolutize(Utf8Path::new(line));
                let header_id = self.graph.get_or_insert_with(
                    header.clone(),
                    EntryOrigin::Discovered,
                    || FileMeta::probe(&header),
                );
                self.graph.depends_on(dep_id, header_id)?;
                headers += 1;
            }
        }

        debug!(
            object = %self.display_rel(&object),
            headers,
            dep_list_on_disk = dep_meta.exists,
            "registered"
        );

        self.registrations
            .insert(object, Registration { source, dep_list });
        Ok(())
    }

    /// Memoized staleness verdict for a tracked path.
    ///
    /// The path must have been registered or discovered this invocation;
    /// querying anything else is a driver fault. The first query seals
    /// registration.
    pub fn is_stale(&mut self, path: &Utf8Path) -> Result<bool, TrackerError> {
        let path = self.absolutize(path);
        let id = self
            .graph
            .id_of(&path)
            .ok_or(TrackerError::UnknownPath { path })?;

        self.sealed = true;
        Ok(self.graph.is_stale(id)?)
    }

    /// Re-derive the dependency-list file for a registered object.
    ///
    /// Runs the compiler in include-listing mode on the object's source,
    /// keeps the reported paths that lie under the project root (system
    /// headers rarely change; tracking them would make every rebuild look
    /// stale), and atomically rewrites `<object>.dep` with the sorted,
    /// deduplicated, root-relative list.
    ///
    /// The in-memory graph is not refreshed: entries are stat-once
    /// snapshots, and a dep-list that needed re-deriving was already
    /// stale, so this run's verdicts stay conservative. The rewritten
    /// file feeds the next invocation.
    ///
    /// A report with no include lines combined with a non-zero exit
    /// status is a failed scan, not an empty dependency list.
    pub fn rebuild_dependencies(&mut self, object: &Utf8Path) -> Result<(), TrackerError> {
        let object = self.absolutize(object);
        let registration = self
            .registrations
            .get(&object)
            .cloned()
            .ok_or_else(|| TrackerError::UnknownPath {
                path: object.clone(),
            })?;

        info!(object = %self.display_rel(&object), "re-deriving dependency list");
        let started = Instant::now();

        let invocation = self.config.scan_invocation(&registration.source);
        let output = self.scanner.scan(&invocation)?;

        let reported = include_report::included_files(output.report_lines());
        if reported.is_empty() && !output.success() {
            return Err(TrackerError::DerivationFailed {
                source_file: registration.source.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.clone(),
            });
        }

        let mut headers = BTreeSet::new();
        for path in &reported {
            let absolute = self.absolutize(Utf8Path::new(path));
            if let Ok(relative) = absolute.strip_prefix(&self.project_root) {
                headers.insert(relative.to_string());
            }
        }

        let mut contents = String::new();
        for header in &headers {
            contents.push_str(header);
            contents.push('\n');
        }
        fsio::atomic_write(&registration.dep_list, contents.as_bytes()).map_err(|source| {
            TrackerError::DepListWrite {
                path: registration.dep_list.clone(),
                source,
            }
        })?;

        let elapsed = started.elapsed();
        self.rebuild_time += elapsed;
        debug!(
            object = %self.display_rel(&object),
            reported = reported.len(),
            kept = headers.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "dependency list written"
        );
        Ok(())
    }

    /// The recorded (source, dep-list) pair for a registered object, so
    /// the driver can ask `is_stale` about the dep-list itself.
    pub fn registration(&self, object: &Utf8Path) -> Result<&Registration, TrackerError> {
        let object = self.absolutize(object);
        self.registrations
            .get(&object)
            .ok_or(TrackerError::UnknownPath { path: object })
    }

    /// Number of tracked entries, headers included.
    pub fn entry_count(&self) -> usize {
        self.graph.len()
    }

    /// Wall-clock time spent inside dependency re-derivation so far.
    pub fn cumulative_rebuild_time(&self) -> Duration {
        self.rebuild_time
    }

    /// The accumulated re-derivation time as `minutes:seconds`.
    pub fn report_rebuild_time(&self) -> String {
        format_rebuild_time(self.rebuild_time)
    }

    /// Write the full entry table to `<output_root>/dependency-tracker.log`,
    /// one line per entry sorted by path: `path :: mtime :: stale`.
    ///
    /// Computing the verdicts seals the planning phase like any other
    /// staleness query. Returns the log path.
    pub fn dump(&mut self) -> Result<Utf8PathBuf, TrackerError> {
        self.sealed = true;

        let mut rows: Vec<_> = self
            .graph
            .entries()
            .map(|(id, entry)| (entry.path.clone(), id))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut contents = String::new();
        for (path, id) in rows {
            let stale = self.graph.is_stale(id)?;
            let entry = self.graph.entry(id)?;
            let mtime = match entry.mtime {
                Some(time) => time.to_string(),
                None => "-".to_string(),
            };
            contents.push_str(&format!("{path} :: {mtime} :: {stale}\n"));
        }

        let log_path = self.output_root.join("dependency-tracker.log");
        fsio::atomic_write(&log_path, contents.as_bytes()).map_err(|source| {
            TrackerError::DumpWrite {
                path: log_path.clone(),
                source,
            }
        })?;
        Ok(log_path)
    }

    fn absolutize(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.project_root.join(path))
        }
    }

    fn display_rel<'a>(&self, path: &'a Utf8Path) -> &'a Utf8Path {
        path.strip_prefix(&self.output_root).unwrap_or(path)
    }
}

/// Render an accumulated duration as `minutes:seconds`.
pub fn format_rebuild_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}

/// Lexically normalize a path: collapse `.` and `..` without touching the
/// filesystem, so paths to files that do not exist yet (objects before
/// their first compile) still get a canonical spelling.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
