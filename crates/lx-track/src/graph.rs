//! The owned entry graph
//!
//! Entries live in an arena keyed by [`EntryId`]; edges point from
//! dependent to dependency (if A depends on B, there is an edge A → B).
//! Identity is the canonical path: asking to insert a path that already
//! has an entry is a loud error, never a silent merge, and discovered
//! headers are reused, never duplicated.
//!
//! Staleness is a memoized recursive verdict over the edges. The graph is
//! expected to be acyclic (object → dep-list → source/headers, and
//! headers are leaves); traversal still carries a visiting set so a wired
//! cycle surfaces as an error instead of unbounded recursion.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::entry::{EntryOrigin, FileEntry, FileMeta, Staleness};

/// Errors from graph construction and staleness queries
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("entry already present: {path}")]
    Duplicate { path: Utf8PathBuf },

    #[error("entry #{index} does not belong to this graph")]
    ForeignEntry { index: usize },

    #[error("dependency cycle detected at {path}")]
    Cycle { path: Utf8PathBuf },
}

/// Handle to an entry in one [`EntryGraph`].
///
/// Only the graph that issued an id can resolve it; using a handle from
/// another graph is caught by the bounds check and fails with
/// [`GraphError::ForeignEntry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(NodeIndex);

impl EntryId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Arena of file entries plus their dependency edges
pub struct EntryGraph {
    graph: DiGraph<FileEntry, ()>,
    by_path: HashMap<Utf8PathBuf, NodeIndex>,
    /// Verdicts computed rather than served from the memo
    computations: u64,
}

impl EntryGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            by_path: HashMap::new(),
            computations: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Insert a new entry. The path must not be tracked yet.
    pub fn insert(
        &mut self,
        path: Utf8PathBuf,
        meta: FileMeta,
        origin: EntryOrigin,
    ) -> Result<EntryId, GraphError> {
        if self.by_path.contains_key(&path) {
            return Err(GraphError::Duplicate { path });
        }

        let ix = self
            .graph
            .add_node(FileEntry::new(path.clone(), meta, origin));
        self.by_path.insert(path, ix);
        Ok(EntryId(ix))
    }

    /// Look up a path, inserting a fresh entry if it is unknown.
    ///
    /// `meta` is only evaluated on insert, so an existing entry keeps the
    /// metadata captured when it was first seen.
    pub fn get_or_insert_with(
        &mut self,
        path: Utf8PathBuf,
        origin: EntryOrigin,
        meta: impl FnOnce() -> FileMeta,
    ) -> EntryId {
        if let Some(&ix) = self.by_path.get(&path) {
            return EntryId(ix);
        }

        let ix = self
            .graph
            .add_node(FileEntry::new(path.clone(), meta(), origin));
        self.by_path.insert(path, ix);
        EntryId(ix)
    }

    pub fn id_of(&self, path: &Utf8Path) -> Option<EntryId> {
        self.by_path.get(path).copied().map(EntryId)
    }

    pub fn entry(&self, id: EntryId) -> Result<&FileEntry, GraphError> {
        self.graph
            .node_weight(id.0)
            .ok_or(GraphError::ForeignEntry { index: id.index() })
    }

    /// Promote a discovered entry to registered (a source that was first
    /// seen as another object's header).
    pub(crate) fn mark_registered(&mut self, id: EntryId) -> Result<(), GraphError> {
        let entry = self
            .graph
            .node_weight_mut(id.0)
            .ok_or(GraphError::ForeignEntry { index: id.index() })?;
        entry.origin = EntryOrigin::Registered;
        Ok(())
    }

    /// Record that `from` depends on `on`.
    ///
    /// Edges have set semantics: wiring the same pair twice leaves a
    /// single edge. Both handles must belong to this graph.
    pub fn depends_on(&mut self, from: EntryId, on: EntryId) -> Result<(), GraphError> {
        for id in [from, on] {
            if self.graph.node_weight(id.0).is_none() {
                return Err(GraphError::ForeignEntry { index: id.index() });
            }
        }

        self.graph.update_edge(from.0, on.0, ());
        Ok(())
    }

    /// Memoized staleness verdict for one entry.
    ///
    /// Stale iff the file does not exist, or it has at least one
    /// dependency and some dependency is stale or strictly newer than the
    /// entry itself. Equal modification times are fresh: ties favor
    /// reuse. An existing entry with no dependencies is a fresh leaf.
    pub fn is_stale(&mut self, id: EntryId) -> Result<bool, GraphError> {
        if self.graph.node_weight(id.0).is_none() {
            return Err(GraphError::ForeignEntry { index: id.index() });
        }

        let mut visiting = Vec::new();
        self.compute(id.0, &mut visiting)
    }

    fn compute(
        &mut self,
        ix: NodeIndex,
        visiting: &mut Vec<NodeIndex>,
    ) -> Result<bool, GraphError> {
        match self.graph[ix].staleness {
            Staleness::Stale => return Ok(true),
            Staleness::Fresh => return Ok(false),
            Staleness::NotComputed => {}
        }

        if visiting.contains(&ix) {
            return Err(GraphError::Cycle {
                path: self.graph[ix].path.clone(),
            });
        }
        visiting.push(ix);

        let deps: Vec<NodeIndex> = self.graph.neighbors(ix).collect();

        let mut stale = !self.graph[ix].exists;

        if !stale && !deps.is_empty() {
            let mut newest: Option<Timestamp> = None;
            for dep in deps {
                if self.compute(dep, visiting)? {
                    stale = true;
                    break;
                }
                newest = newest.max(self.graph[dep].mtime);
            }

            if !stale {
                // every dependency exists and is fresh; an entry that
                // exists but reports no mtime counts as infinitely old
                let own = self.graph[ix].mtime.unwrap_or(Timestamp::MIN);
                stale = newest.is_some_and(|t| t > own);
            }
        }

        visiting.pop();
        self.computations += 1;
        self.graph[ix].staleness = if stale {
            Staleness::Stale
        } else {
            Staleness::Fresh
        };
        Ok(stale)
    }

    /// Every entry, in arena order.
    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &FileEntry)> {
        self.graph
            .node_indices()
            .map(|ix| (EntryId(ix), &self.graph[ix]))
    }

    /// Verdicts computed so far, memo hits excluded. Diagnostic; lets
    /// tests observe that traversal happens once per entry.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

impl Default for EntryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(second: i64) -> Timestamp {
        Timestamp::from_second(second).unwrap()
    }

    fn present(second: i64) -> FileMeta {
        FileMeta {
            exists: true,
            mtime: Some(ts(second)),
        }
    }

    fn add(graph: &mut EntryGraph, path: &str, meta: FileMeta) -> EntryId {
        graph
            .insert(path.into(), meta, EntryOrigin::Registered)
            .unwrap()
    }

    #[test]
    fn leaf_staleness_equals_missing() {
        let mut graph = EntryGraph::new();
        let here = add(&mut graph, "/p/a.h", present(10));
        let gone = add(&mut graph, "/p/b.h", FileMeta::MISSING);

        assert!(!graph.is_stale(here).unwrap());
        assert!(graph.is_stale(gone).unwrap());
    }

    #[test]
    fn newer_dependency_is_stale() {
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(100));
        let src = add(&mut graph, "/p/a.c", present(200));
        graph.depends_on(obj, src).unwrap();

        assert!(graph.is_stale(obj).unwrap());
    }

    #[test]
    fn older_dependency_is_fresh() {
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(100));
        let src = add(&mut graph, "/p/a.c", present(50));
        graph.depends_on(obj, src).unwrap();

        assert!(!graph.is_stale(obj).unwrap());
    }

    #[test]
    fn equal_mtime_tie_favors_reuse() {
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(100));
        let src = add(&mut graph, "/p/a.c", present(100));
        graph.depends_on(obj, src).unwrap();

        assert!(!graph.is_stale(obj).unwrap());
    }

    #[test]
    fn missing_dependency_is_stale() {
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(100));
        let src = add(&mut graph, "/p/a.c", FileMeta::MISSING);
        graph.depends_on(obj, src).unwrap();

        assert!(graph.is_stale(obj).unwrap());
    }

    #[test]
    fn staleness_propagates_transitively() {
        // a.o -> a.o.dep -> x.h, where x.h is newer than the dep list
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(300));
        let dep = add(&mut graph, "/p/a.o.dep", present(100));
        let header = add(&mut graph, "/p/x.h", present(200));
        graph.depends_on(obj, dep).unwrap();
        graph.depends_on(dep, header).unwrap();

        assert!(graph.is_stale(dep).unwrap());
        assert!(graph.is_stale(obj).unwrap());
    }

    #[test]
    fn duplicate_insert_fails_loudly() {
        let mut graph = EntryGraph::new();
        add(&mut graph, "/p/a.o", present(1));

        let err = graph
            .insert("/p/a.o".into(), present(2), EntryOrigin::Registered)
            .unwrap_err();
        assert!(matches!(err, GraphError::Duplicate { .. }));
    }

    #[test]
    fn get_or_insert_reuses_and_skips_probe() {
        let mut graph = EntryGraph::new();
        let first = graph.get_or_insert_with("/p/x.h".into(), EntryOrigin::Discovered, || {
            present(10)
        });
        let second = graph.get_or_insert_with("/p/x.h".into(), EntryOrigin::Discovered, || {
            panic!("metadata must not be probed again")
        });

        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut small = EntryGraph::new();
        let mut big = EntryGraph::new();
        add(&mut big, "/p/a.o", present(1));
        let foreign = add(&mut big, "/p/b.o", present(1));

        let local = add(&mut small, "/p/a.o", present(1));

        assert!(matches!(
            small.entry(foreign),
            Err(GraphError::ForeignEntry { .. })
        ));
        assert!(matches!(
            small.depends_on(local, foreign),
            Err(GraphError::ForeignEntry { .. })
        ));
        assert!(matches!(
            small.is_stale(foreign),
            Err(GraphError::ForeignEntry { .. })
        ));
    }

    #[test]
    fn cycle_is_an_error_not_a_hang() {
        let mut graph = EntryGraph::new();
        let a = add(&mut graph, "/p/a", present(1));
        let b = add(&mut graph, "/p/b", present(1));
        graph.depends_on(a, b).unwrap();
        graph.depends_on(b, a).unwrap();

        assert!(matches!(graph.is_stale(a), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn verdicts_are_memoized() {
        // diamond: obj -> {dep, src}, dep -> hdr, src -> hdr
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(400));
        let dep = add(&mut graph, "/p/a.o.dep", present(300));
        let src = add(&mut graph, "/p/a.c", present(200));
        let hdr = add(&mut graph, "/p/x.h", present(100));
        graph.depends_on(obj, dep).unwrap();
        graph.depends_on(obj, src).unwrap();
        graph.depends_on(dep, hdr).unwrap();
        graph.depends_on(src, hdr).unwrap();

        assert!(!graph.is_stale(obj).unwrap());
        // four nodes, four computations: the shared leaf is not recomputed
        assert_eq!(graph.computations(), 4);

        assert!(!graph.is_stale(obj).unwrap());
        assert_eq!(graph.computations(), 4);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = EntryGraph::new();
        let obj = add(&mut graph, "/p/a.o", present(100));
        let src = add(&mut graph, "/p/a.c", present(50));
        graph.depends_on(obj, src).unwrap();
        graph.depends_on(obj, src).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert!(!graph.is_stale(obj).unwrap());
    }
}
