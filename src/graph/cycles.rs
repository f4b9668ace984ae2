//! Acyclicity checks for the parent relation.
//!
//! [`validate_parents`] is the write-path guard: it proves a proposed parent
//! list introduces no cycle before anything else runs. [`find_cycles`] is an
//! independent whole-graph scan (Tarjan's SCC) used for audits of stored
//! data and as the brute-force oracle in tests.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::error::CycleError;
use crate::graph::index::GraphIndex;
use crate::types::CategoryId;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A strongly connected component of the parent relation (an actual cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleInfo {
    /// Member ids, sorted.
    pub category_ids: Vec<CategoryId>,
    pub size: usize,
}

// ---------------------------------------------------------------------------
// validate_parents
// ---------------------------------------------------------------------------

/// Check that giving `category_id` the parents `proposed_parent_ids` keeps
/// the graph acyclic.
///
/// Walks the ancestors of every proposed parent breadth-first, branching on
/// *all* parents of every node, not only the primary one. A single visited
/// set bounds the walk, so it terminates even on a snapshot that already
/// contains a cycle. Identity is checked before presence: a dangling
/// reference to `category_id` still counts.
pub fn validate_parents<P>(
    category_id: &str,
    proposed_parent_ids: &[P],
    index: &GraphIndex,
) -> Result<(), CycleError>
where
    P: AsRef<str>,
{
    walk_ancestors(category_id, proposed_parent_ids, index).map(|_| ())
}

/// Same walk as [`validate_parents`], returning every id it visited.
///
/// The visited set is the read set of the validation; the cascade engine
/// records it as optimistic-concurrency preconditions.
pub(crate) fn walk_ancestors<P>(
    category_id: &str,
    proposed_parent_ids: &[P],
    index: &GraphIndex,
) -> Result<HashSet<CategoryId>, CycleError>
where
    P: AsRef<str>,
{
    let conflict = |via: &str| {
        warn!(category = %category_id, via = %via, "parent assignment rejected: cycle");
        CycleError {
            conflicting_category_id: category_id.to_string(),
            conflicting_category_name: index.name_of(category_id).to_string(),
            via_parent_id: via.to_string(),
        }
    };

    if proposed_parent_ids
        .iter()
        .any(|p| p.as_ref() == category_id)
    {
        return Err(conflict(category_id));
    }

    // queue holds (ancestor id, proposed parent it was reached through)
    let mut queue: VecDeque<(&str, &str)> = VecDeque::new();
    let mut visited: HashSet<CategoryId> = HashSet::new();

    for parent in proposed_parent_ids {
        let parent = parent.as_ref();
        if visited.insert(parent.to_string()) {
            queue.push_back((parent, parent));
        }
    }

    while let Some((current, via)) = queue.pop_front() {
        if current == category_id {
            return Err(conflict(via));
        }
        for grandparent in index.parent_ids(current) {
            if visited.insert(grandparent.clone()) {
                queue.push_back((grandparent.as_str(), via));
            }
        }
    }

    Ok(visited)
}

// ---------------------------------------------------------------------------
// find_cycles
// ---------------------------------------------------------------------------

/// Detect every cycle in the parent relation using Tarjan's SCC algorithm.
///
/// Returns components of size >= 2 plus single categories that list
/// themselves as a parent. Dangling references are ignored. An empty result
/// means the snapshot is a DAG.
pub fn find_cycles(index: &GraphIndex) -> Vec<CycleInfo> {
    let ids: Vec<&str> = index.iter_sorted().into_iter().map(|c| c.id.as_str()).collect();
    let position: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    // Edges run child -> parent.
    let adj: Vec<Vec<usize>> = ids
        .iter()
        .map(|id| {
            index
                .parent_ids(id)
                .iter()
                .filter_map(|p| position.get(p.as_str()).copied())
                .collect()
        })
        .collect();

    let mut state = Tarjan {
        adj: &adj,
        counter: 0,
        index: vec![None; ids.len()],
        lowlink: vec![0; ids.len()],
        on_stack: vec![false; ids.len()],
        stack: Vec::new(),
        sccs: Vec::new(),
    };
    for v in 0..ids.len() {
        if state.index[v].is_none() {
            state.strong_connect(v);
        }
    }

    let mut cycles: Vec<CycleInfo> = state
        .sccs
        .into_iter()
        .filter(|scc| scc.len() >= 2 || scc.iter().any(|&v| adj[v].contains(&v)))
        .map(|scc| {
            let mut category_ids: Vec<CategoryId> =
                scc.into_iter().map(|v| ids[v].to_string()).collect();
            category_ids.sort();
            let size = category_ids.len();
            CycleInfo { category_ids, size }
        })
        .collect();
    cycles.sort_by(|a, b| a.category_ids.cmp(&b.category_ids));
    cycles
}

/// Mutable Tarjan state; vertices are positions into the sorted id list.
struct Tarjan<'a> {
    adj: &'a [Vec<usize>],
    counter: u32,
    index: Vec<Option<u32>>,
    lowlink: Vec<u32>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    sccs: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.counter);
        self.lowlink[v] = self.counter;
        self.counter += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    /// Tarjan from `root` on an explicit frame stack of (vertex, next edge).
    fn strong_connect(&mut self, root: usize) {
        let adj = self.adj;
        self.visit(root);
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = frames.last_mut() {
            let (v, next) = *frame;
            if let Some(&w) = adj[v].get(next) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.visit(w);
                        frames.push((w, 0));
                    }
                    Some(w_idx) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_idx);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if Some(self.lowlink[v]) == self.index[v] {
                let mut scc = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                self.sccs.push(scc);
            }
            if let Some(&(caller, _)) = frames.last() {
                self.lowlink[caller] = self.lowlink[caller].min(self.lowlink[v]);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
