//! Graph layer: snapshot index, cycle checks, derivation, cascade, read views
//! and the SQLite-backed store.

pub mod cascade;
pub mod cycles;
pub mod index;
pub mod resolve;
pub mod store;
pub mod traversal;
pub mod tree;

pub use cascade::{
    change_slug, delete_impact, plan_create, plan_delete, recompute_all, reparent, DeleteImpact,
    DeletePlan,
};
pub use cycles::{find_cycles, validate_parents, CycleInfo};
pub use index::GraphIndex;
pub use resolve::{resolve_level, resolve_path, slugify, ResolvedLookup};
pub use traversal::{all_ancestor_paths, breadcrumbs, canonical_ancestors, collect_descendants};
pub use tree::{build_trees, build_trees_with, flatten_trees, TreeNode, TreeOptions};
