//! Level and canonical path derivation.
//!
//! `level` answers "how deep can this be reached" and takes every parent
//! into account. `path` answers "where does it canonically live" and only
//! ever follows the primary parent, so a category has exactly one URL.

use std::sync::OnceLock;

use regex::Regex;

use crate::graph::index::GraphIndex;

// ---------------------------------------------------------------------------
// ResolvedLookup
// ---------------------------------------------------------------------------

/// Source of already-resolved `level`/`path` values for parent categories.
///
/// Implemented by [`GraphIndex`] for the snapshot values, and by the cascade
/// engine's overlay so descendants are recomputed against fresh parents.
pub trait ResolvedLookup {
    /// Level of `id`, or `None` when the category is not available.
    fn resolved_level(&self, id: &str) -> Option<u32>;
    /// Canonical path of `id`, or `None` when the category is not available.
    fn resolved_path(&self, id: &str) -> Option<&str>;
}

impl ResolvedLookup for GraphIndex {
    fn resolved_level(&self, id: &str) -> Option<u32> {
        self.get(id).map(|c| c.level)
    }

    fn resolved_path(&self, id: &str) -> Option<&str> {
        self.get(id).map(|c| c.path.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// `0` for a root, else one more than the deepest present parent.
///
/// Dangling parents are skipped rather than counted as level-0 phantoms, so
/// a category whose parents are all missing resolves to level 0.
pub fn resolve_level<S, P>(parent_ids: &[P], lookup: &S) -> u32
where
    S: ResolvedLookup + ?Sized,
    P: AsRef<str>,
{
    parent_ids
        .iter()
        .filter_map(|p| lookup.resolved_level(p.as_ref()))
        .max()
        .map_or(0, |deepest| deepest + 1)
}

/// `"/" + slug` for a root, else the primary parent's path plus `"/" + slug`.
///
/// Falls back to the root form when the primary parent is dangling.
pub fn resolve_path<S, P>(slug: &str, parent_ids: &[P], lookup: &S) -> String
where
    S: ResolvedLookup + ?Sized,
    P: AsRef<str>,
{
    match parent_ids
        .first()
        .and_then(|primary| lookup.resolved_path(primary.as_ref()))
    {
        Some(parent_path) => format!("{}/{}", parent_path.trim_end_matches('/'), slug),
        None => format!("/{slug}"),
    }
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static slug pattern is valid"))
}

/// Lowercase, hyphen-separated URL slug for a display name.
///
/// `"Home & Garden"` → `"home-garden"`. Letters outside ASCII are kept.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    non_word()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
