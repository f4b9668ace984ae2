//! In-memory lookup structure over one category snapshot.
//!
//! Built once per operation and threaded by reference into every other
//! component. Dangling parent references are tolerated: the edge is simply
//! absent from the child adjacency, because the snapshot may be partial.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::types::{Category, CategoryId};

// ---------------------------------------------------------------------------
// GraphIndex
// ---------------------------------------------------------------------------

/// id → category map plus a derived child adjacency view.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    categories: HashMap<CategoryId, Category>,
    children: HashMap<CategoryId, Vec<CategoryId>>,
    dangling_refs: usize,
}

impl GraphIndex {
    /// Build the index from a flat snapshot in O(n).
    ///
    /// Duplicate parent ids inside one record are collapsed (first occurrence
    /// wins). If the snapshot holds two records with the same id, the later
    /// one replaces the earlier.
    pub fn build<I>(snapshot: I) -> Self
    where
        I: IntoIterator<Item = Category>,
    {
        let mut categories: HashMap<CategoryId, Category> = HashMap::new();
        for mut cat in snapshot {
            let mut seen: HashSet<CategoryId> = HashSet::with_capacity(cat.parent_ids.len());
            cat.parent_ids.retain(|p| seen.insert(p.clone()));
            if let Some(prev) = categories.insert(cat.id.clone(), cat) {
                warn!(id = %prev.id, "duplicate category id in snapshot, keeping the last record");
            }
        }

        let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
        let mut dangling_refs = 0usize;
        for cat in categories.values() {
            for parent in &cat.parent_ids {
                if categories.contains_key(parent) {
                    children.entry(parent.clone()).or_default().push(cat.id.clone());
                } else {
                    dangling_refs += 1;
                    debug!(id = %cat.id, parent = %parent, "dangling parent reference skipped");
                }
            }
        }

        for kids in children.values_mut() {
            kids.sort_by(|a, b| {
                let (ca, cb) = (&categories[a], &categories[b]);
                (ca.sort_order, &ca.name, &ca.id).cmp(&(cb.sort_order, &cb.name, &cb.id))
            });
        }

        debug!(
            categories = categories.len(),
            dangling = dangling_refs,
            "graph index built"
        );

        Self {
            categories,
            children,
            dangling_refs,
        }
    }

    /// Build from a borrowed slice, cloning each record.
    pub fn from_slice(snapshot: &[Category]) -> Self {
        Self::build(snapshot.iter().cloned())
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.categories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of `parent_ids` entries that point at no record.
    pub fn dangling_refs(&self) -> usize {
        self.dangling_refs
    }

    /// The (deduplicated) parent list of `id`, dangling entries included.
    pub fn parent_ids(&self, id: &str) -> &[CategoryId] {
        self.categories
            .get(id)
            .map(|c| c.parent_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Parents of `id` that are present in the snapshot, in parent order.
    pub fn parents_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Category> + 'a {
        self.parent_ids(id)
            .iter()
            .filter_map(move |p| self.categories.get(p))
    }

    /// Direct children of `id`, ordered by `(sort_order, name, id)`.
    pub fn children_of(&self, id: &str) -> &[CategoryId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories with an empty parent list, ordered by `(sort_order, name, id)`.
    pub fn roots(&self) -> Vec<&Category> {
        let mut roots: Vec<&Category> = self.categories.values().filter(|c| c.is_root()).collect();
        roots.sort_by(|a, b| (a.sort_order, &a.name, &a.id).cmp(&(b.sort_order, &b.name, &b.id)));
        roots
    }

    /// All categories in id order.
    pub fn iter_sorted(&self) -> Vec<&Category> {
        let mut all: Vec<&Category> = self.categories.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Display name of `id`, falling back to the id itself.
    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.categories.get(id).map(|c| c.name.as_str()).unwrap_or(id)
    }

    pub fn version_of(&self, id: &str) -> Option<u64> {
        self.categories.get(id).map(|c| c.version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: &str, parents: &[&str]) -> Category {
        Category::new(id, id.to_uppercase(), id).with_parents(parents.iter().copied())
    }

    #[test]
    fn builds_child_adjacency_from_parent_lists() {
        let index = GraphIndex::build(vec![
            cat("electronics", &[]),
            cat("audio", &["electronics"]),
            cat("headphones", &["audio", "accessories"]),
            cat("accessories", &[]),
        ]);

        assert_eq!(index.len(), 4);
        assert_eq!(index.children_of("electronics"), ["audio".to_string()]);
        assert_eq!(index.children_of("audio"), ["headphones".to_string()]);
        assert_eq!(index.children_of("accessories"), ["headphones".to_string()]);
        assert!(index.children_of("headphones").is_empty());
        assert_eq!(index.dangling_refs(), 0);
    }

    #[test]
    fn dangling_parent_is_an_absent_edge() {
        let index = GraphIndex::build(vec![cat("a", &["ghost", "b"]), cat("b", &[])]);

        assert_eq!(index.dangling_refs(), 1);
        assert_eq!(index.children_of("b"), ["a".to_string()]);
        assert!(index.children_of("ghost").is_empty());
        // The record itself keeps the reference; only adjacency drops it.
        assert_eq!(index.parent_ids("a").len(), 2);
        let parents: Vec<&str> = index.parents_of("a").map(|c| c.id.as_str()).collect();
        assert_eq!(parents, vec!["b"]);
    }

    #[test]
    fn duplicate_parent_entries_are_collapsed() {
        let index = GraphIndex::build(vec![cat("p", &[]), cat("c", &["p", "p"])]);
        assert_eq!(index.parent_ids("c"), ["p".to_string()]);
        assert_eq!(index.children_of("p").len(), 1);
    }

    #[test]
    fn children_are_ordered_by_sort_order_then_name() {
        let index = GraphIndex::build(vec![
            cat("root", &[]),
            cat("zeta", &["root"]).with_sort_order(1),
            cat("beta", &["root"]).with_sort_order(2),
            cat("alpha", &["root"]).with_sort_order(2),
        ]);
        assert_eq!(
            index.children_of("root"),
            ["zeta".to_string(), "alpha".to_string(), "beta".to_string()]
        );
    }

    #[test]
    fn roots_exclude_categories_with_dangling_parents() {
        let index = GraphIndex::build(vec![cat("a", &[]), cat("b", &["missing"])]);
        let roots: Vec<&str> = index.roots().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(roots, vec!["a"]);
    }

    #[test]
    fn unknown_ids_have_empty_views() {
        let index = GraphIndex::default();
        assert!(index.is_empty());
        assert!(index.parent_ids("nope").is_empty());
        assert!(index.children_of("nope").is_empty());
        assert_eq!(index.name_of("nope"), "nope");
        assert_eq!(index.version_of("nope"), None);
    }

    #[test]
    fn later_duplicate_record_wins() {
        let index = GraphIndex::build(vec![
            Category::new("a", "First", "a"),
            Category::new("a", "Second", "a"),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.name_of("a"), "Second");
    }
}
