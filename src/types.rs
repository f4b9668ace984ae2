//! Core domain types for Taxograph.
//!
//! [`Category`] is the sole entity. Everything else here is either an input
//! shape crossing the persistence boundary ([`CategoryRecord`],
//! [`NewCategory`]) or an output the engine hands back to collaborators
//! ([`BatchUpdate`] and its parts).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TaxographError;

/// Opaque stable category identifier.
pub type CategoryId = String;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A node of the taxonomy DAG.
///
/// `level`, `path`, `child_count` and `has_children` are derived; callers
/// never set them directly, the engine computes them and the store persists
/// them. `parent_ids[0]` is the primary parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "CategoryRecord")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_ids: Vec<CategoryId>,
    pub level: u32,
    pub path: String,
    pub child_count: u32,
    pub has_children: bool,
    pub product_count: u32,
    pub sort_order: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub show_on_homepage: bool,
    /// Persistence version, bumped by the store on every write.
    pub version: u64,
}

impl Category {
    /// A root category with derived fields set as if it were freshly created.
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            id: id.into(),
            name: name.into(),
            path: format!("/{slug}"),
            slug,
            parent_ids: Vec::new(),
            level: 0,
            child_count: 0,
            has_children: false,
            product_count: 0,
            sort_order: 0,
            is_active: true,
            is_featured: false,
            show_on_homepage: false,
            version: 0,
        }
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CategoryId>,
    {
        self.parent_ids = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_level_path(mut self, level: u32, path: impl Into<String>) -> Self {
        self.level = level;
        self.path = path.into();
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn primary_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CategoryRecord: boundary adapter
// ---------------------------------------------------------------------------

/// The loosest shape a stored category may arrive in.
///
/// Older documents carry a singular `parentId`; newer ones carry
/// `parentIds`. Both are normalized into [`Category::parent_ids`] here so the
/// graph code never branches on field shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Absent → `None`, explicit `null` → `Some(None)`.
    #[serde(default, deserialize_with = "present", alias = "parent_ids")]
    pub parent_ids: Option<Option<Vec<String>>>,
    #[serde(default, alias = "parent_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub child_count: u32,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub product_count: u32,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub show_on_homepage: bool,
    #[serde(default)]
    pub version: u64,
}

fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
    true
}

impl TryFrom<CategoryRecord> for Category {
    type Error = TaxographError;

    fn try_from(rec: CategoryRecord) -> Result<Self, Self::Error> {
        if rec.id.trim().is_empty() {
            return Err(TaxographError::InvalidArgument(
                "category id must not be empty".into(),
            ));
        }

        let parent_ids = match rec.parent_ids {
            Some(Some(ids)) => ids,
            Some(None) => {
                return Err(TaxographError::InvalidArgument(format!(
                    "category '{}': parentIds must be a list, got null",
                    rec.id
                )))
            }
            None => rec
                .parent_id
                .filter(|p| !p.is_empty())
                .into_iter()
                .collect(),
        };
        if parent_ids.iter().any(|p| p.trim().is_empty()) {
            return Err(TaxographError::InvalidArgument(format!(
                "category '{}': parent ids must not be empty",
                rec.id
            )));
        }

        let slug = rec
            .slug
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| crate::graph::resolve::slugify(&rec.name));

        Ok(Self {
            path: rec.path.unwrap_or_else(|| format!("/{slug}")),
            id: rec.id,
            name: rec.name,
            slug,
            parent_ids,
            level: rec.level,
            child_count: rec.child_count,
            has_children: rec.has_children,
            product_count: rec.product_count,
            sort_order: rec.sort_order,
            is_active: rec.is_active,
            is_featured: rec.is_featured,
            show_on_homepage: rec.show_on_homepage,
            version: rec.version,
        })
    }
}

// ---------------------------------------------------------------------------
// NewCategory
// ---------------------------------------------------------------------------

/// Input for creating a category. Derived fields are computed by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub id: CategoryId,
    pub name: String,
    /// Generated from `name` when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_ids: Vec<CategoryId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub show_on_homepage: bool,
}

// ---------------------------------------------------------------------------
// DeletePolicy
// ---------------------------------------------------------------------------

/// What to do with descendants when a category is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// Reject the delete if the category has any descendant.
    #[default]
    Refuse,
    /// Delete every descendant left without a surviving parent.
    Cascade,
    /// Hand direct children over to the deleted category's parents.
    ReparentOrphans,
}

impl DeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refuse => "refuse",
            Self::Cascade => "cascade",
            Self::ReparentOrphans => "reparent-orphans",
        }
    }

    /// Parse from a loose string (case-insensitive, underscores accepted).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "refuse" | "reject" => Some(Self::Refuse),
            "cascade" => Some(Self::Cascade),
            "reparent-orphans" | "reparent_orphans" | "reparent" => Some(Self::ReparentOrphans),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BatchUpdate
// ---------------------------------------------------------------------------

/// New derived values for one existing category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub id: CategoryId,
    pub level: u32,
    pub path: String,
    /// Set only when the category's parent list itself changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ids: Option<Vec<CategoryId>>,
    /// Set only when the category's slug itself changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// New child counters for a parent whose child set changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterUpdate {
    pub id: CategoryId,
    pub child_count: u32,
    pub has_children: bool,
}

/// Everything one mutation writes, to be applied atomically or not at all.
///
/// `preconditions` maps every record the plan read to the version it had in
/// the snapshot; the store refuses the batch if any of them moved on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    pub updates: Vec<NodeUpdate>,
    pub counters: Vec<CounterUpdate>,
    pub inserts: Vec<Category>,
    pub deletes: Vec<CategoryId>,
    pub preconditions: BTreeMap<CategoryId, u64>,
}

impl BatchUpdate {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
            && self.counters.is_empty()
            && self.inserts.is_empty()
            && self.deletes.is_empty()
    }

    /// Number of rows this batch writes.
    pub fn len(&self) -> usize {
        self.updates.len() + self.counters.len() + self.inserts.len() + self.deletes.len()
    }

    pub fn update_for(&self, id: &str) -> Option<&NodeUpdate> {
        self.updates.iter().find(|u| u.id == id)
    }

    pub fn counter_for(&self, id: &str) -> Option<&CounterUpdate> {
        self.counters.iter().find(|c| c.id == id)
    }

    /// Replay this batch over an in-memory snapshot, in the same order the
    /// store applies it. Updates aimed at absent rows are skipped.
    pub fn apply_to<I>(&self, snapshot: I) -> Vec<Category>
    where
        I: IntoIterator<Item = Category>,
    {
        let mut rows: BTreeMap<CategoryId, Category> =
            snapshot.into_iter().map(|c| (c.id.clone(), c)).collect();
        for id in &self.deletes {
            rows.remove(id);
        }
        for cat in &self.inserts {
            rows.insert(cat.id.clone(), cat.clone());
        }
        for update in &self.updates {
            if let Some(row) = rows.get_mut(&update.id) {
                row.level = update.level;
                row.path.clone_from(&update.path);
                if let Some(parents) = &update.parent_ids {
                    row.parent_ids.clone_from(parents);
                }
                if let Some(slug) = &update.slug {
                    row.slug.clone_from(slug);
                }
            }
        }
        for counter in &self.counters {
            if let Some(row) = rows.get_mut(&counter.id) {
                row.child_count = counter.child_count;
                row.has_children = counter.has_children;
            }
        }
        rows.into_values().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
