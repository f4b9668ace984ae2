//! Property-based tests for the category graph using proptest.
//!
//! Random DAGs are built, random re-parent requests are thrown at them, and
//! after every accepted mutation the whole graph is re-checked against
//! brute-force definitions of the invariants.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use proptest::sample::Index;

use taxograph::graph::cascade::{plan_create, plan_delete, recompute_all, reparent};
use taxograph::graph::cycles::find_cycles;
use taxograph::graph::index::GraphIndex;
use taxograph::graph::resolve::{resolve_level, resolve_path};
use taxograph::graph::traversal::{all_ancestor_paths, canonical_ancestors, collect_descendants};
use taxograph::graph::tree::build_trees;
use taxograph::types::{BatchUpdate, Category, CategoryId, DeletePolicy, NewCategory};
use taxograph::error::TaxographError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn id(i: usize) -> CategoryId {
    format!("c{i}")
}

/// Parent choices per node; node `i` may only pick parents `< i`, so the
/// result is always acyclic.
fn arb_dag() -> impl Strategy<Value = Vec<Vec<Index>>> {
    prop::collection::vec(prop::collection::vec(any::<Index>(), 0..3), 1..16)
}

/// Re-parent requests: (target, proposed parents) over any node.
fn arb_requests() -> impl Strategy<Value = Vec<(Index, Vec<Index>)>> {
    prop::collection::vec((any::<Index>(), prop::collection::vec(any::<Index>(), 0..3)), 1..12)
}

fn dedup(ids: Vec<CategoryId>) -> Vec<CategoryId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Build a consistent graph: parents first, then derived fields repaired.
fn build_graph(choices: &[Vec<Index>]) -> GraphIndex {
    let cats: Vec<Category> = choices
        .iter()
        .enumerate()
        .map(|(i, picks)| {
            let parents = if i == 0 {
                Vec::new()
            } else {
                dedup(picks.iter().map(|p| id(p.index(i))).collect())
            };
            Category::new(id(i), format!("Cat {i}"), id(i)).with_parents(parents)
        })
        .collect();
    let raw = GraphIndex::build(cats);
    let repair = recompute_all(&raw);
    apply(&raw, &repair)
}

/// Apply a batch to an in-memory snapshot, the way the store would.
fn apply(index: &GraphIndex, batch: &BatchUpdate) -> GraphIndex {
    let mut cats: HashMap<CategoryId, Category> =
        index.iter().map(|c| (c.id.clone(), c.clone())).collect();
    for id in &batch.deletes {
        cats.remove(id);
    }
    for c in &batch.inserts {
        cats.insert(c.id.clone(), c.clone());
    }
    for u in &batch.updates {
        let c = cats.get_mut(&u.id).expect("update targets an existing row");
        c.level = u.level;
        c.path = u.path.clone();
        if let Some(p) = &u.parent_ids {
            c.parent_ids = p.clone();
        }
        if let Some(s) = &u.slug {
            c.slug = s.clone();
        }
    }
    for k in &batch.counters {
        let c = cats.get_mut(&k.id).expect("counter targets an existing row");
        c.child_count = k.child_count;
        c.has_children = k.has_children;
    }
    GraphIndex::build(cats.into_values())
}

/// Every derived field agrees with a from-scratch computation.
fn check_consistent(index: &GraphIndex) -> Result<(), TestCaseError> {
    prop_assert!(find_cycles(index).is_empty(), "graph must stay acyclic");
    for c in index.iter() {
        prop_assert_eq!(c.level, resolve_level(&c.parent_ids, index), "level of {}", &c.id);
        prop_assert_eq!(&c.path, &resolve_path(&c.slug, &c.parent_ids, index), "path of {}", &c.id);
        prop_assert_eq!(c.level == 0, c.parent_ids.is_empty());
        for p in index.parents_of(&c.id) {
            prop_assert!(c.level > p.level, "{} must be deeper than parent {}", &c.id, &p.id);
        }
        prop_assert_eq!(c.child_count as usize, index.children_of(&c.id).len());
        prop_assert_eq!(c.has_children, c.child_count > 0);
    }
    Ok(())
}

/// Would giving `target` these parents close a cycle? Brute force.
fn edit_creates_cycle(index: &GraphIndex, target: &str, parents: &[CategoryId]) -> bool {
    let edited = index.iter().cloned().map(|mut c| {
        if c.id == target {
            c.parent_ids = parents.to_vec();
        }
        c
    });
    !find_cycles(&GraphIndex::build(edited)).is_empty()
}

// ---------------------------------------------------------------------------
// Mutation properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn generated_graphs_start_consistent(choices in arb_dag()) {
        let index = build_graph(&choices);
        check_consistent(&index)?;
    }

    #[test]
    fn accepted_reparents_keep_every_invariant(choices in arb_dag(), requests in arb_requests()) {
        let mut index = build_graph(&choices);
        let n = choices.len();

        for (target, picks) in requests {
            let target = id(target.index(n));
            let parents = dedup(picks.iter().map(|p| id(p.index(n))).collect());

            match reparent(&target, &parents, &index) {
                Ok(batch) => {
                    prop_assert!(!edit_creates_cycle(&index, &target, &parents));
                    // The mutated category and its whole subtree are reported.
                    let mut expected = collect_descendants(&target, &index);
                    expected.insert(target.clone());
                    let reported: HashSet<&str> = batch.updates.iter().map(|u| u.id.as_str()).collect();
                    for e in &expected {
                        prop_assert!(reported.contains(e.as_str()), "{} missing from cascade", e);
                    }
                    index = apply(&index, &batch);
                    check_consistent(&index)?;
                }
                Err(TaxographError::Cycle(_)) => {
                    prop_assert!(edit_creates_cycle(&index, &target, &parents),
                        "rejected {} -> {:?} but no cycle would form", target, parents);
                }
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }
    }

    #[test]
    fn secondary_parents_never_change_path(choices in arb_dag(), target in any::<Index>(), extra in any::<Index>()) {
        let index = build_graph(&choices);
        let n = choices.len();
        let target = id(target.index(n));
        let Some(primary) = index.get(&target).and_then(|c| c.primary_parent()).map(str::to_string) else {
            return Ok(());
        };
        let extra = id(extra.index(n));
        if extra == primary || extra == target {
            return Ok(());
        }

        let only_primary = reparent(&target, &[primary.clone()], &index);
        let with_extra = reparent(&target, &[primary, extra], &index);
        if let (Ok(a), Ok(b)) = (only_primary, with_extra) {
            let pa = &a.update_for(&target).unwrap().path;
            let pb = &b.update_for(&target).unwrap().path;
            prop_assert_eq!(pa, pb);
        }
    }
}

fn arb_policy() -> impl Strategy<Value = DeletePolicy> {
    prop_oneof![
        Just(DeletePolicy::Refuse),
        Just(DeletePolicy::Cascade),
        Just(DeletePolicy::ReparentOrphans),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn planned_creates_keep_every_invariant(choices in arb_dag(), picks in prop::collection::vec(any::<Index>(), 0..3)) {
        let index = build_graph(&choices);
        let n = choices.len();
        let parents = dedup(picks.iter().map(|p| id(p.index(n))).collect());

        let new = NewCategory {
            id: "fresh".to_string(),
            name: "Fresh Category".to_string(),
            parent_ids: parents.clone(),
            ..Default::default()
        };
        let batch = plan_create(new, &index).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let after = apply(&index, &batch);
        check_consistent(&after)?;

        let fresh = after.get("fresh").unwrap();
        prop_assert_eq!(&fresh.parent_ids, &parents);
        prop_assert_eq!(fresh.slug.as_str(), "fresh-category");
        prop_assert_eq!(after.len(), n + 1);
    }

    #[test]
    fn planned_deletes_keep_every_invariant(choices in arb_dag(), target in any::<Index>(), policy in arb_policy()) {
        let index = build_graph(&choices);
        let target = id(target.index(choices.len()));
        let has_children = !index.children_of(&target).is_empty();

        match plan_delete(&target, policy, &index) {
            Ok(plan) => {
                prop_assert!(!(policy == DeletePolicy::Refuse && has_children));
                prop_assert!(plan.batch.deletes.contains(&target));
                let after = apply(&index, &plan.batch);
                check_consistent(&after)?;

                prop_assert!(!after.contains(&target));
                prop_assert_eq!(after.len(), index.len() - plan.batch.deletes.len());
                // no survivor still points at a removed category
                for c in after.iter() {
                    for removed in &plan.batch.deletes {
                        prop_assert!(!c.parent_ids.contains(removed), "{} still under {}", &c.id, removed);
                    }
                }
                if policy != DeletePolicy::Cascade {
                    prop_assert_eq!(plan.batch.deletes.len(), 1);
                }
            }
            Err(TaxographError::HasDescendants { id, .. }) => {
                prop_assert_eq!(policy, DeletePolicy::Refuse);
                prop_assert!(has_children);
                prop_assert_eq!(id, target);
            }
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }
}

// ---------------------------------------------------------------------------
// Read-side properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn ancestor_paths_are_real_root_to_node_chains(choices in arb_dag(), target in any::<Index>()) {
        let index = build_graph(&choices);
        let target = id(target.index(choices.len()));
        let paths = all_ancestor_paths(&target, &index);
        prop_assert!(!paths.is_empty());

        for path in &paths {
            prop_assert!(index.get(&path[0]).unwrap().is_root());
            prop_assert_eq!(path.last().unwrap(), &target);
            for pair in path.windows(2) {
                prop_assert!(index.parent_ids(&pair[1]).contains(&pair[0]));
            }
        }
        let unique: HashSet<&Vec<CategoryId>> = paths.iter().collect();
        prop_assert_eq!(unique.len(), paths.len());
        prop_assert_eq!(&paths[0], &canonical_ancestors(&target, &index));
    }

    #[test]
    fn tree_places_every_category_exactly_once(choices in arb_dag()) {
        let index = build_graph(&choices);
        let snapshot: Vec<Category> = index.iter_sorted().into_iter().cloned().collect();
        let trees = build_trees(&snapshot);

        let mut seen = Vec::new();
        let mut stack: Vec<_> = trees.iter().collect();
        while let Some(node) = stack.pop() {
            seen.push(node.id.clone());
            for child in &node.children {
                prop_assert_eq!(index.get(&child.id).unwrap().primary_parent(), Some(node.id.as_str()));
                stack.push(child);
            }
        }
        seen.sort();
        let all: Vec<CategoryId> = snapshot.iter().map(|c| c.id.clone()).collect();
        prop_assert_eq!(seen, all);
    }
}
