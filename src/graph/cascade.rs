//! Cascading recomputation of derived fields after a graph mutation.
//!
//! Every planner here follows the same shape: reject malformed input at the
//! boundary, prove acyclicity once, then re-derive `level`/`path` for the
//! mutated categories and every affected descendant in topological order,
//! each exactly once, against parent values that are already fresh. The
//! result is a [`BatchUpdate`]; nothing is written here.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, TaxographError};
use crate::graph::cycles::walk_ancestors;
use crate::graph::index::GraphIndex;
use crate::graph::resolve::{resolve_level, resolve_path, slugify, ResolvedLookup};
use crate::graph::traversal::collect_descendants;
use crate::types::{
    BatchUpdate, Category, CategoryId, CounterUpdate, DeletePolicy, NewCategory, NodeUpdate,
};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What deleting a category would touch, for "delete affects N children"
/// warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImpact {
    pub category_id: CategoryId,
    pub direct_children: Vec<CategoryId>,
    pub descendants: BTreeSet<CategoryId>,
}

impl DeleteImpact {
    pub fn descendant_count(&self) -> usize {
        self.descendants.len()
    }
}

/// A planned delete: the impact report plus the batch that carries it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePlan {
    pub policy: DeletePolicy,
    pub impact: DeleteImpact,
    pub batch: BatchUpdate,
}

// ---------------------------------------------------------------------------
// Overlay: snapshot + pending edits + freshly computed values
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Edits {
    parents: HashMap<CategoryId, Vec<CategoryId>>,
    slugs: HashMap<CategoryId, String>,
    removed: HashSet<CategoryId>,
}

struct Overlay<'a> {
    index: &'a GraphIndex,
    edits: &'a Edits,
    fresh: HashMap<CategoryId, (u32, String)>,
}

impl<'a> Overlay<'a> {
    fn new(index: &'a GraphIndex, edits: &'a Edits) -> Self {
        Self {
            index,
            edits,
            fresh: HashMap::new(),
        }
    }

    fn parent_ids(&self, id: &str) -> &'a [CategoryId] {
        match self.edits.parents.get(id) {
            Some(p) => p.as_slice(),
            None => self.index.parent_ids(id),
        }
    }

    fn slug(&self, id: &str) -> &'a str {
        match self.edits.slugs.get(id) {
            Some(s) => s.as_str(),
            None => self.index.get(id).map(|c| c.slug.as_str()).unwrap_or(""),
        }
    }
}

impl ResolvedLookup for Overlay<'_> {
    fn resolved_level(&self, id: &str) -> Option<u32> {
        if self.edits.removed.contains(id) {
            return None;
        }
        match self.fresh.get(id) {
            Some((level, _)) => Some(*level),
            None => self.index.resolved_level(id),
        }
    }

    fn resolved_path(&self, id: &str) -> Option<&str> {
        if self.edits.removed.contains(id) {
            return None;
        }
        match self.fresh.get(id) {
            Some((_, path)) => Some(path.as_str()),
            None => self.index.resolved_path(id),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared machinery
// ---------------------------------------------------------------------------

/// Order `affected` so every category comes after its affected parents.
///
/// Kahn's algorithm over the post-edit parent lists restricted to the
/// affected set; ties break on snapshot level, then id. Members of a cycle
/// in a corrupted snapshot are appended last rather than dropped.
fn topo_order(affected: &BTreeSet<CategoryId>, overlay: &Overlay<'_>) -> Vec<CategoryId> {
    let level = |id: &str| overlay.index.get(id).map_or(0, |c| c.level);

    let mut indegree: HashMap<&str, usize> = HashMap::with_capacity(affected.len());
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for id in affected {
        let mut deg = 0;
        for parent in overlay.parent_ids(id) {
            if affected.contains(parent) {
                deg += 1;
                successors.entry(parent.as_str()).or_default().push(id.as_str());
            }
        }
        indegree.insert(id.as_str(), deg);
    }

    let mut ready: BTreeSet<(u32, &str)> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| (level(*id), *id))
        .collect();

    let mut order: Vec<CategoryId> = Vec::with_capacity(affected.len());
    while let Some((_, id)) = ready.pop_first() {
        order.push(id.to_string());
        if let Some(next) = successors.get(id) {
            for &child in next {
                if let Some(deg) = indegree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((level(child), child));
                    }
                }
            }
        }
    }

    if order.len() < affected.len() {
        let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut rest: Vec<&str> = affected
            .iter()
            .map(String::as_str)
            .filter(|id| !placed.contains(id))
            .collect();
        warn!(count = rest.len(), "cascade met a cycle in the snapshot; recomputing remaining categories best-effort");
        rest.sort_by_key(|id| (level(*id), *id));
        order.extend(rest.into_iter().map(str::to_string));
    }

    order
}

/// Recompute `level`/`path` for every affected category, in dependency order.
fn recompute(
    index: &GraphIndex,
    edits: &Edits,
    affected: &BTreeSet<CategoryId>,
    reads: &mut BTreeSet<CategoryId>,
) -> Vec<NodeUpdate> {
    let mut overlay = Overlay::new(index, edits);
    let order = topo_order(affected, &overlay);

    let mut updates = Vec::with_capacity(order.len());
    for id in order {
        let parents = overlay.parent_ids(&id);
        let level = resolve_level(parents, &overlay);
        let path = resolve_path(overlay.slug(&id), parents, &overlay);

        reads.insert(id.clone());
        reads.extend(parents.iter().cloned());

        overlay.fresh.insert(id.clone(), (level, path.clone()));
        updates.push(NodeUpdate {
            parent_ids: edits.parents.get(&id).cloned(),
            slug: edits.slugs.get(&id).cloned(),
            id,
            level,
            path,
        });
    }
    updates
}

/// One category's parent list before and after the edit (`None` = deleted).
type ParentChange<'a> = (&'a str, &'a [CategoryId], Option<&'a [CategoryId]>);

/// Child counters for every present parent whose child set changed.
fn counter_updates(
    index: &GraphIndex,
    changes: &[ParentChange<'_>],
    removed: &HashSet<CategoryId>,
) -> Vec<CounterUpdate> {
    let mut delta: BTreeMap<&str, i64> = BTreeMap::new();
    for (_, old, new) in changes {
        let new = new.unwrap_or(&[]);
        for p in old.iter().filter(|p| !new.contains(p)) {
            *delta.entry(p.as_str()).or_default() -= 1;
        }
        for p in new.iter().filter(|p| !old.contains(p)) {
            *delta.entry(p.as_str()).or_default() += 1;
        }
    }

    delta
        .into_iter()
        .filter(|(id, d)| *d != 0 && index.contains(id) && !removed.contains(*id))
        .map(|(id, d)| {
            let count = (index.children_of(id).len() as i64 + d).max(0) as u32;
            CounterUpdate {
                id: id.to_string(),
                child_count: count,
                has_children: count > 0,
            }
        })
        .collect()
}

fn preconditions(index: &GraphIndex, reads: &BTreeSet<CategoryId>) -> BTreeMap<CategoryId, u64> {
    reads
        .iter()
        .filter_map(|id| index.version_of(id).map(|v| (id.clone(), v)))
        .collect()
}

fn require_id(category_id: &str) -> Result<()> {
    if category_id.trim().is_empty() {
        return Err(TaxographError::InvalidArgument(
            "category id must not be empty".into(),
        ));
    }
    Ok(())
}

fn require_parent_list<P: AsRef<str>>(category_id: &str, parent_ids: &[P]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(parent_ids.len());
    for p in parent_ids {
        let p = p.as_ref();
        if p.trim().is_empty() {
            return Err(TaxographError::InvalidArgument(format!(
                "category '{category_id}': parent ids must not be empty"
            )));
        }
        if !seen.insert(p) {
            return Err(TaxographError::InvalidArgument(format!(
                "category '{category_id}': parent '{p}' listed more than once"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// reparent
// ---------------------------------------------------------------------------

/// Give `category_id` a new parent list and recompute everything beneath it.
///
/// Fails with [`TaxographError::Cycle`] and no output when the new parents
/// would make the category its own ancestor. Cycle detection is not re-run
/// for descendants: the only edge that changed has already been proved safe.
pub fn reparent<P: AsRef<str>>(
    category_id: &str,
    new_parent_ids: &[P],
    index: &GraphIndex,
) -> Result<BatchUpdate> {
    require_id(category_id)?;
    require_parent_list(category_id, new_parent_ids)?;
    let current = index
        .get(category_id)
        .ok_or_else(|| TaxographError::NotFound(category_id.to_string()))?;

    let mut reads: BTreeSet<CategoryId> = walk_ancestors(category_id, new_parent_ids, index)?
        .into_iter()
        .collect();
    reads.insert(category_id.to_string());
    reads.extend(current.parent_ids.iter().cloned());

    let new_parents: Vec<CategoryId> = new_parent_ids
        .iter()
        .map(|p| p.as_ref().to_string())
        .collect();

    let mut edits = Edits::default();
    edits
        .parents
        .insert(category_id.to_string(), new_parents.clone());

    let mut affected = collect_descendants(category_id, index);
    affected.insert(category_id.to_string());
    let updates = recompute(index, &edits, &affected, &mut reads);

    let counters = counter_updates(
        index,
        &[(
            category_id,
            current.parent_ids.as_slice(),
            Some(new_parents.as_slice()),
        )],
        &edits.removed,
    );

    let batch = BatchUpdate {
        updates,
        counters,
        inserts: Vec::new(),
        deletes: Vec::new(),
        preconditions: preconditions(index, &reads),
    };
    info!(
        category = %category_id,
        updates = batch.updates.len(),
        counters = batch.counters.len(),
        "reparent planned"
    );
    Ok(batch)
}

// ---------------------------------------------------------------------------
// change_slug
// ---------------------------------------------------------------------------

/// Change a category's slug and re-derive the canonical path of everything
/// that lives beneath it. Levels are unaffected but still reported.
pub fn change_slug(category_id: &str, new_slug: &str, index: &GraphIndex) -> Result<BatchUpdate> {
    require_id(category_id)?;
    if new_slug.trim().is_empty() || new_slug.contains('/') {
        return Err(TaxographError::InvalidArgument(format!(
            "category '{category_id}': slug must be non-empty and contain no '/'"
        )));
    }
    if !index.contains(category_id) {
        return Err(TaxographError::NotFound(category_id.to_string()));
    }

    let mut edits = Edits::default();
    edits
        .slugs
        .insert(category_id.to_string(), new_slug.to_string());

    let mut reads = BTreeSet::new();
    let mut affected = collect_descendants(category_id, index);
    affected.insert(category_id.to_string());
    let updates = recompute(index, &edits, &affected, &mut reads);

    debug!(category = %category_id, updates = updates.len(), "slug change planned");
    Ok(BatchUpdate {
        updates,
        preconditions: preconditions(index, &reads),
        ..Default::default()
    })
}

// ---------------------------------------------------------------------------
// plan_create
// ---------------------------------------------------------------------------

/// Validate a new category and compute its initial derived fields.
pub fn plan_create(new: NewCategory, index: &GraphIndex) -> Result<BatchUpdate> {
    require_id(&new.id)?;
    if new.name.trim().is_empty() {
        return Err(TaxographError::InvalidArgument(format!(
            "category '{}': name must not be empty",
            new.id
        )));
    }
    if index.contains(&new.id) {
        return Err(TaxographError::InvalidArgument(format!(
            "category '{}' already exists",
            new.id
        )));
    }
    require_parent_list(&new.id, &new.parent_ids)?;

    let slug = match new.slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => slugify(&new.name),
    };
    if slug.is_empty() || slug.contains('/') {
        return Err(TaxographError::InvalidArgument(format!(
            "category '{}': cannot derive a usable slug from '{}'",
            new.id, new.name
        )));
    }

    let mut reads: BTreeSet<CategoryId> = walk_ancestors(&new.id, &new.parent_ids, index)?
        .into_iter()
        .collect();
    reads.extend(new.parent_ids.iter().cloned());

    for p in new.parent_ids.iter().filter(|p| !index.contains(p)) {
        debug!(category = %new.id, parent = %p, "creating category under a parent outside the snapshot");
    }

    let level = resolve_level(&new.parent_ids, index);
    let path = resolve_path(&slug, &new.parent_ids, index);
    let counters = counter_updates(
        index,
        &[(new.id.as_str(), &[][..], Some(new.parent_ids.as_slice()))],
        &HashSet::new(),
    );

    let category = Category {
        id: new.id,
        name: new.name,
        slug,
        parent_ids: new.parent_ids,
        level,
        path,
        child_count: 0,
        has_children: false,
        product_count: 0,
        sort_order: new.sort_order,
        is_active: new.is_active,
        is_featured: new.is_featured,
        show_on_homepage: new.show_on_homepage,
        version: 0,
    };
    info!(category = %category.id, level, path = %category.path, "create planned");

    Ok(BatchUpdate {
        counters,
        inserts: vec![category],
        preconditions: preconditions(index, &reads),
        ..Default::default()
    })
}

// ---------------------------------------------------------------------------
// plan_delete
// ---------------------------------------------------------------------------

/// Enumerate what deleting `category_id` would touch, without planning it.
pub fn delete_impact(category_id: &str, index: &GraphIndex) -> Result<DeleteImpact> {
    require_id(category_id)?;
    if !index.contains(category_id) {
        return Err(TaxographError::NotFound(category_id.to_string()));
    }
    Ok(DeleteImpact {
        category_id: category_id.to_string(),
        direct_children: index.children_of(category_id).to_vec(),
        descendants: collect_descendants(category_id, index),
    })
}

/// Plan the deletion of `category_id` under `policy`.
///
/// - [`DeletePolicy::Refuse`] fails with [`TaxographError::HasDescendants`]
///   unless the category is a leaf.
/// - [`DeletePolicy::Cascade`] deletes every descendant whose present parents
///   are all being deleted; descendants that keep another parent survive,
///   drop the deleted parents and are recomputed.
/// - [`DeletePolicy::ReparentOrphans`] deletes only the category; in each
///   direct child's parent list the deleted id is replaced by the deleted
///   category's own parents, so the child's canonical path stays as close to
///   its old one as possible.
pub fn plan_delete(
    category_id: &str,
    policy: DeletePolicy,
    index: &GraphIndex,
) -> Result<DeletePlan> {
    let impact = delete_impact(category_id, index)?;
    let current = index
        .get(category_id)
        .ok_or_else(|| TaxographError::NotFound(category_id.to_string()))?;

    let mut reads: BTreeSet<CategoryId> = BTreeSet::new();
    reads.insert(category_id.to_string());
    reads.extend(current.parent_ids.iter().cloned());
    reads.extend(impact.descendants.iter().cloned());

    let mut edits = Edits::default();
    edits.removed.insert(category_id.to_string());

    match policy {
        DeletePolicy::Refuse => {
            if !impact.descendants.is_empty() {
                return Err(TaxographError::HasDescendants {
                    id: category_id.to_string(),
                    count: impact.descendant_count(),
                });
            }
        }
        DeletePolicy::Cascade => {
            // Parents precede children here, so a descendant's fate is
            // decided after all of its parents' fates.
            let order = topo_order(&impact.descendants, &Overlay::new(index, &edits));

            for id in order {
                let parents = index.parent_ids(&id);
                let present: Vec<&CategoryId> =
                    parents.iter().filter(|p| index.contains(p)).collect();
                if present.iter().all(|p| edits.removed.contains(*p)) {
                    edits.removed.insert(id);
                } else if parents.iter().any(|p| edits.removed.contains(p)) {
                    let kept: Vec<CategoryId> = parents
                        .iter()
                        .filter(|p| !edits.removed.contains(*p))
                        .cloned()
                        .collect();
                    edits.parents.insert(id, kept);
                }
            }
        }
        DeletePolicy::ReparentOrphans => {
            for child in &impact.direct_children {
                let mut spliced: Vec<CategoryId> = Vec::new();
                for p in index.parent_ids(child) {
                    if p == category_id {
                        for gp in &current.parent_ids {
                            if !spliced.contains(gp) && !index.parent_ids(child).contains(gp) {
                                spliced.push(gp.clone());
                            }
                        }
                    } else if !spliced.contains(p) {
                        spliced.push(p.clone());
                    }
                }
                edits.parents.insert(child.clone(), spliced);
            }
        }
    }

    let affected: BTreeSet<CategoryId> = impact
        .descendants
        .iter()
        .filter(|id| !edits.removed.contains(*id))
        .cloned()
        .collect();
    let updates = recompute(index, &edits, &affected, &mut reads);

    let mut changes: Vec<ParentChange<'_>> = Vec::new();
    for id in &edits.removed {
        changes.push((id.as_str(), index.parent_ids(id), None));
    }
    for (id, new) in &edits.parents {
        changes.push((id.as_str(), index.parent_ids(id), Some(new.as_slice())));
    }
    let counters = counter_updates(index, &changes, &edits.removed);

    let mut deletes: Vec<CategoryId> = edits.removed.iter().cloned().collect();
    deletes.sort();

    info!(
        category = %category_id,
        policy = %policy,
        deleted = deletes.len(),
        updates = updates.len(),
        "delete planned"
    );

    Ok(DeletePlan {
        policy,
        batch: BatchUpdate {
            updates,
            counters,
            inserts: Vec::new(),
            deletes,
            preconditions: preconditions(index, &reads),
        },
        impact,
    })
}

// ---------------------------------------------------------------------------
// recompute_all
// ---------------------------------------------------------------------------

/// Re-derive every category's `level`, `path` and child counters from
/// scratch and report only the rows whose stored values disagree.
///
/// Used after bulk imports, where records arrive without derived fields, and
/// to repair data written by other tools.
pub fn recompute_all(index: &GraphIndex) -> BatchUpdate {
    let edits = Edits::default();
    let affected: BTreeSet<CategoryId> = index.iter().map(|c| c.id.clone()).collect();
    let mut reads = BTreeSet::new();

    // Start from a blank slate so stale stored values never leak into the
    // result: every parent is recomputed before its children read it.
    let updates: Vec<NodeUpdate> = recompute(index, &edits, &affected, &mut reads)
        .into_iter()
        .filter(|u| {
            index
                .get(&u.id)
                .is_some_and(|c| c.level != u.level || c.path != u.path)
        })
        .collect();

    let mut counters: Vec<CounterUpdate> = index
        .iter()
        .filter_map(|c| {
            let count = index.children_of(&c.id).len() as u32;
            let has = count > 0;
            (c.child_count != count || c.has_children != has).then(|| CounterUpdate {
                id: c.id.clone(),
                child_count: count,
                has_children: has,
            })
        })
        .collect();
    counters.sort_by(|a, b| a.id.cmp(&b.id));

    info!(
        categories = index.len(),
        updates = updates.len(),
        counters = counters.len(),
        "full recompute planned"
    );

    BatchUpdate {
        updates,
        counters,
        inserts: Vec::new(),
        deletes: Vec::new(),
        preconditions: preconditions(index, &reads),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
