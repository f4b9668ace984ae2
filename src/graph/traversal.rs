//! Descendant and ancestor enumeration over a [`GraphIndex`].
//!
//! Every walk here is bounded by a visited set or an on-path set. The
//! acyclicity invariant is enforced on write, but a read may still see an
//! externally corrupted snapshot; in that case the walk returns a partial
//! result and logs the inconsistency instead of looping.

use std::collections::{BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use tracing::warn;

use crate::graph::index::GraphIndex;
use crate::types::CategoryId;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One step of a canonical breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub path: String,
}

// ---------------------------------------------------------------------------
// Descendants
// ---------------------------------------------------------------------------

/// All categories reachable from `category_id` through child edges.
///
/// The category itself is never included, and a category reachable through
/// several parent routes appears once.
pub fn collect_descendants(category_id: &str, index: &GraphIndex) -> BTreeSet<CategoryId> {
    let mut found: BTreeSet<CategoryId> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    queue.push_back(category_id);

    while let Some(current) = queue.pop_front() {
        for child in index.children_of(current) {
            if child == category_id {
                warn!(category = %category_id, "category is its own descendant: snapshot contains a cycle");
                continue;
            }
            if found.insert(child.clone()) {
                queue.push_back(child.as_str());
            }
        }
    }

    found
}

// ---------------------------------------------------------------------------
// Ancestors
// ---------------------------------------------------------------------------

/// Every root-to-node path through every parent, not just the primary one.
///
/// Paths are ordered by parent order at each step, so the first path is the
/// canonical one whenever every primary parent is present. A root yields a
/// single one-element path. Dangling parents are skipped; a category whose
/// parents are all dangling starts its own path. Unknown ids yield nothing.
pub fn all_ancestor_paths(category_id: &str, index: &GraphIndex) -> Vec<Vec<CategoryId>> {
    if !index.contains(category_id) {
        return Vec::new();
    }

    fn present_parents<'a>(id: &str, index: &'a GraphIndex) -> Vec<&'a str> {
        index
            .parent_ids(id)
            .iter()
            .map(String::as_str)
            .filter(|p| index.contains(p))
            .collect()
    }

    // Depth-first on an explicit stack; each frame is (id, present parents,
    // next parent to try). The frames from bottom to top are the suffix of
    // the path being built.
    let mut out = Vec::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    on_path.insert(category_id);
    let mut stack = vec![(category_id, present_parents(category_id, index), 0usize)];

    while let Some(top) = stack.last_mut() {
        let id = top.0;
        if top.1.is_empty() {
            out.push(stack.iter().rev().map(|(s, _, _)| s.to_string()).collect());
            on_path.remove(id);
            stack.pop();
            continue;
        }
        let Some(&parent) = top.1.get(top.2) else {
            on_path.remove(id);
            stack.pop();
            continue;
        };
        top.2 += 1;
        if !on_path.insert(parent) {
            warn!(category = %id, parent = %parent, "ancestor walk re-entered its own path: snapshot contains a cycle");
            continue;
        }
        stack.push((parent, present_parents(parent, index), 0));
    }
    out
}

/// The primary-parent chain from a root down to `category_id`, inclusive.
///
/// This is the chain behind the category's canonical `path`. Stops at the
/// first dangling primary parent.
pub fn canonical_ancestors(category_id: &str, index: &GraphIndex) -> Vec<CategoryId> {
    let mut chain: Vec<CategoryId> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = match index.get(category_id) {
        Some(c) => c,
        None => return chain,
    };

    loop {
        if !seen.insert(current.id.as_str()) {
            warn!(category = %category_id, "primary-parent chain loops: snapshot contains a cycle");
            break;
        }
        chain.push(current.id.clone());
        match current.primary_parent().and_then(|p| index.get(p)) {
            Some(parent) => current = parent,
            None => break,
        }
    }

    chain.reverse();
    chain
}

/// Canonical breadcrumb trail for SEO and navigation.
pub fn breadcrumbs(category_id: &str, index: &GraphIndex) -> Vec<Breadcrumb> {
    canonical_ancestors(category_id, index)
        .iter()
        .filter_map(|id| index.get(id))
        .map(|c| Breadcrumb {
            id: c.id.clone(),
            name: c.name.clone(),
            slug: c.slug.clone(),
            path: c.path.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
