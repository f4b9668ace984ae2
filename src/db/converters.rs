//! Row ↔ domain conversions for the `categories` table.

use rusqlite::types::Type;
use rusqlite::Row;

use crate::types::{Category, CategoryId};

/// Decode one `categories` row, normalizing legacy single-parent rows.
///
/// `parent_ids` wins when present. Otherwise a non-empty `parent_id`
/// becomes a one-element list, and a row with neither is a root.
pub fn row_to_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    let parent_ids_json: Option<String> = row.get("parent_ids")?;
    let legacy_parent: Option<String> = row.get("parent_id")?;
    let parent_ids = match parent_ids_json {
        Some(json) => parse_parent_ids(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?,
        None => legacy_parent
            .filter(|p| !p.trim().is_empty())
            .into_iter()
            .collect(),
    };

    let version: i64 = row.get("version")?;
    Ok(Category {
        id: row.get("id")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        parent_ids,
        level: row.get("level")?,
        path: row.get("path")?,
        child_count: row.get("child_count")?,
        has_children: row.get("has_children")?,
        product_count: row.get("product_count")?,
        sort_order: row.get("sort_order")?,
        is_active: row.get("is_active")?,
        is_featured: row.get("is_featured")?,
        show_on_homepage: row.get("show_on_homepage")?,
        version: version.max(0) as u64,
    })
}

pub fn parse_parent_ids(json: &str) -> serde_json::Result<Vec<CategoryId>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json)
}

pub fn parent_ids_to_json(parent_ids: &[CategoryId]) -> serde_json::Result<String> {
    serde_json::to_string(parent_ids)
}
