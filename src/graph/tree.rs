//! Rooted, sorted tree projection of the category DAG for display.
//!
//! Each category appears exactly once, under its primary parent. A category
//! with several parents is therefore shown only in its canonical place; use
//! [`all_ancestor_paths`](crate::graph::traversal::all_ancestor_paths) when
//! the other placements matter.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::types::Category;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub level: u32,
    pub path: String,
    pub sort_order: i32,
    pub is_active: bool,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(cat: &Category) -> Self {
        Self {
            id: cat.id.clone(),
            name: cat.name.clone(),
            slug: cat.slug.clone(),
            level: cat.level,
            path: cat.path.clone(),
            sort_order: cat.sort_order,
            is_active: cat.is_active,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

// Deep chains would otherwise drop recursively, one frame per level.
impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Keep inactive categories. When false, an inactive category is dropped
    /// together with everything placed beneath it.
    pub include_inactive: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            include_inactive: true,
        }
    }
}

/// One row of a flattened tree, e.g. an indented option in a category picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatEntry {
    pub id: String,
    pub name: String,
    pub depth: usize,
    pub path: String,
}

impl FlatEntry {
    pub fn display_label(&self) -> String {
        format!("{}{}", "  ".repeat(self.depth), self.name)
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Project `categories` into trees with default options.
pub fn build_trees(categories: &[Category]) -> Vec<TreeNode> {
    build_trees_with(categories, &TreeOptions::default())
}

/// Project `categories` into trees.
///
/// A category whose primary parent is not in `categories` becomes a root.
/// Siblings are ordered by `(sort_order, name, id)` at every level.
pub fn build_trees_with(categories: &[Category], options: &TreeOptions) -> Vec<TreeNode> {
    let mut by_id: HashMap<&str, &Category> = HashMap::with_capacity(categories.len());
    for cat in categories {
        by_id.insert(cat.id.as_str(), cat);
    }

    let mut roots: Vec<&Category> = Vec::new();
    let mut children: HashMap<&str, Vec<&Category>> = HashMap::new();
    for &cat in by_id.values() {
        match cat.primary_parent() {
            Some(parent) if parent != cat.id && by_id.contains_key(parent) => {
                children.entry(parent).or_default().push(cat);
            }
            _ => roots.push(cat),
        }
    }

    let by_display_order =
        |a: &&Category, b: &&Category| (a.sort_order, &a.name, &a.id).cmp(&(b.sort_order, &b.name, &b.id));
    roots.sort_by(by_display_order);
    for siblings in children.values_mut() {
        siblings.sort_by(by_display_order);
    }

    let mut visited: HashSet<&str> = HashSet::with_capacity(by_id.len());
    let mut trees: Vec<TreeNode> = roots
        .into_iter()
        .filter_map(|root| attach(root, &children, &mut visited))
        .collect();

    if visited.len() < by_id.len() {
        let mut unplaced: Vec<&str> = by_id
            .keys()
            .copied()
            .filter(|id| !visited.contains(id))
            .collect();
        unplaced.sort_unstable();
        warn!(
            count = unplaced.len(),
            ids = ?unplaced,
            "categories unreachable from any root: primary-parent chain loops"
        );
    }

    if !options.include_inactive {
        prune_inactive(&mut trees);
    }
    trees
}

fn kids_of<'m, 'a>(
    children: &'m HashMap<&'a str, Vec<&'a Category>>,
    id: &str,
) -> &'m [&'a Category] {
    children.get(id).map(Vec::as_slice).unwrap_or(&[])
}

/// Build the subtree under `root` on an explicit stack of
/// (node, its sorted children, next child to place).
fn attach<'a>(
    root: &'a Category,
    children: &HashMap<&'a str, Vec<&'a Category>>,
    visited: &mut HashSet<&'a str>,
) -> Option<TreeNode> {
    if !visited.insert(root.id.as_str()) {
        return None;
    }
    let mut frames = vec![(TreeNode::leaf(root), kids_of(children, &root.id), 0usize)];

    loop {
        let top = frames.last_mut()?;
        if let Some(&kid) = top.1.get(top.2) {
            top.2 += 1;
            if visited.insert(kid.id.as_str()) {
                frames.push((TreeNode::leaf(kid), kids_of(children, &kid.id), 0));
            }
            continue;
        }
        let (node, _, _) = frames.pop()?;
        match frames.last_mut() {
            Some(parent) => parent.0.children.push(node),
            None => return Some(node),
        }
    }
}

fn prune_inactive(nodes: &mut Vec<TreeNode>) {
    nodes.retain(|n| n.is_active);
    for node in nodes {
        prune_inactive(&mut node.children);
    }
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// Depth-first pre-order listing of `trees`, roots at depth 0.
pub fn flatten_trees(trees: &[TreeNode]) -> Vec<FlatEntry> {
    let mut out = Vec::new();
    let mut stack: Vec<(&TreeNode, usize)> = trees.iter().rev().map(|t| (t, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        out.push(FlatEntry {
            id: node.id.clone(),
            name: node.name.clone(),
            depth,
            path: node.path.clone(),
        });
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
