//! SQLite CRUD layer for categories.
//!
//! The store is the persistence collaborator of the graph engine: it loads
//! snapshots and applies [`BatchUpdate`]s atomically. Every statement goes
//! through [`Connection::prepare_cached`].

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::converters::{parent_ids_to_json, row_to_category};
use crate::db::schema::initialize_database;
use crate::error::{Result, TaxographError};
use crate::graph::index::GraphIndex;
use crate::types::{BatchUpdate, Category};

// ---------------------------------------------------------------------------
// CategoryStore
// ---------------------------------------------------------------------------

/// Typed wrapper around the category database.
pub struct CategoryStore {
    pub conn: Connection,
}

impl std::fmt::Debug for CategoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryStore").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

const UPSERT_CATEGORY_SQL: &str = "\
INSERT INTO categories (id, name, slug, parent_ids, parent_id, level, path, child_count, has_children, product_count, sort_order, is_active, is_featured, show_on_homepage, version, updated_at)
VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14)
ON CONFLICT(id) DO UPDATE SET
  name = excluded.name,
  slug = excluded.slug,
  parent_ids = excluded.parent_ids,
  parent_id = NULL,
  level = excluded.level,
  path = excluded.path,
  child_count = excluded.child_count,
  has_children = excluded.has_children,
  product_count = excluded.product_count,
  sort_order = excluded.sort_order,
  is_active = excluded.is_active,
  is_featured = excluded.is_featured,
  show_on_homepage = excluded.show_on_homepage,
  version = categories.version + 1,
  updated_at = excluded.updated_at";

const INSERT_CATEGORY_SQL: &str = "\
INSERT INTO categories (id, name, slug, parent_ids, parent_id, level, path, child_count, has_children, product_count, sort_order, is_active, is_featured, show_on_homepage, version, updated_at)
VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14)";

const UPDATE_DERIVED_SQL: &str = "\
UPDATE categories SET
  level = ?2,
  path = ?3,
  parent_ids = COALESCE(?4, parent_ids),
  parent_id = CASE WHEN ?4 IS NULL THEN parent_id ELSE NULL END,
  slug = COALESCE(?5, slug),
  version = version + 1,
  updated_at = ?6
WHERE id = ?1";

const UPDATE_COUNTERS_SQL: &str = "\
UPDATE categories SET
  child_count = ?2,
  has_children = ?3,
  version = version + 1,
  updated_at = ?4
WHERE id = ?1";

const SELECT_VERSION_SQL: &str = "SELECT version FROM categories WHERE id = ?1";

// ---------------------------------------------------------------------------
// Implementation
// ---------------------------------------------------------------------------

impl CategoryStore {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = initialize_database(db_path)?;
        Ok(Self { conn })
    }

    /// Wrap an already-open connection with the schema applied.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    // -------------------------------------------------------------------
    // Bulk import
    // -------------------------------------------------------------------

    /// Insert or replace many categories in one transaction.
    ///
    /// Derived fields are written as given; run
    /// [`recompute_all`](crate::graph::cascade::recompute_all) afterwards to
    /// bring them in line with the graph.
    pub fn insert_categories(&self, categories: &[Category]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_CATEGORY_SQL)?;
            for cat in categories {
                let parent_ids = parent_ids_to_json(&cat.parent_ids)?;
                stmt.execute(params![
                    cat.id,
                    cat.name,
                    cat.slug,
                    parent_ids,
                    cat.level,
                    cat.path,
                    cat.child_count,
                    cat.has_children,
                    cat.product_count,
                    cat.sort_order,
                    cat.is_active,
                    cat.is_featured,
                    cat.show_on_homepage,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = categories.len(), "categories imported");
        Ok(categories.len())
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    pub fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT * FROM categories WHERE id = ?1")?;
        let mut rows = stmt.query_and_then(params![id], row_to_category)?;
        match rows.next() {
            Some(Ok(cat)) => Ok(Some(cat)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Every category, ordered by id, with legacy rows normalized.
    pub fn load_snapshot(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT * FROM categories ORDER BY id")?;
        let rows = stmt.query_and_then([], row_to_category)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Load the full snapshot and index it.
    pub fn load_index(&self) -> Result<GraphIndex> {
        Ok(GraphIndex::build(self.load_snapshot()?))
    }

    pub fn count(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("SELECT count(*) FROM categories")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    // -------------------------------------------------------------------
    // Batch application
    // -------------------------------------------------------------------

    /// Apply `batch` as one transaction, or not at all.
    ///
    /// Every precondition is checked first; a row whose version moved on (or
    /// that disappeared) since the snapshot was read fails the whole batch
    /// with [`TaxographError::Conflict`]. Each written row has its version
    /// bumped. Returns the number of rows written.
    pub fn apply_batch(&self, batch: &BatchUpdate) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0usize;
        {
            let mut version_stmt = tx.prepare_cached(SELECT_VERSION_SQL)?;
            for (id, expected) in &batch.preconditions {
                let current: Option<i64> = version_stmt
                    .query_row(params![id], |row| row.get(0))
                    .optional()?;
                match current {
                    None => {
                        return Err(TaxographError::Conflict(format!(
                            "category '{id}' was removed since the snapshot was read"
                        )))
                    }
                    Some(v) if v != *expected as i64 => {
                        return Err(TaxographError::Conflict(format!(
                            "category '{id}' is at version {v}, expected {expected}"
                        )))
                    }
                    Some(_) => {}
                }
            }

            let mut delete_stmt = tx.prepare_cached("DELETE FROM categories WHERE id = ?1")?;
            for id in &batch.deletes {
                if delete_stmt.execute(params![id])? == 0 {
                    return Err(TaxographError::Conflict(format!(
                        "category '{id}' is already gone"
                    )));
                }
                written += 1;
            }

            let mut insert_stmt = tx.prepare_cached(INSERT_CATEGORY_SQL)?;
            for cat in &batch.inserts {
                let exists: Option<i64> = version_stmt
                    .query_row(params![cat.id], |row| row.get(0))
                    .optional()?;
                if exists.is_some() {
                    return Err(TaxographError::Conflict(format!(
                        "category '{}' was created concurrently",
                        cat.id
                    )));
                }
                let parent_ids = parent_ids_to_json(&cat.parent_ids)?;
                insert_stmt.execute(params![
                    cat.id,
                    cat.name,
                    cat.slug,
                    parent_ids,
                    cat.level,
                    cat.path,
                    cat.child_count,
                    cat.has_children,
                    cat.product_count,
                    cat.sort_order,
                    cat.is_active,
                    cat.is_featured,
                    cat.show_on_homepage,
                    now,
                ])?;
                written += 1;
            }

            let mut update_stmt = tx.prepare_cached(UPDATE_DERIVED_SQL)?;
            for update in &batch.updates {
                let parent_ids = update
                    .parent_ids
                    .as_deref()
                    .map(parent_ids_to_json)
                    .transpose()?;
                let changed = update_stmt.execute(params![
                    update.id,
                    update.level,
                    update.path,
                    parent_ids,
                    update.slug,
                    now,
                ])?;
                if changed == 0 {
                    return Err(TaxographError::Conflict(format!(
                        "category '{}' disappeared during the update",
                        update.id
                    )));
                }
                written += 1;
            }

            let mut counter_stmt = tx.prepare_cached(UPDATE_COUNTERS_SQL)?;
            for counter in &batch.counters {
                if counter_stmt.execute(params![
                    counter.id,
                    counter.child_count,
                    counter.has_children,
                    now,
                ])? == 0
                {
                    return Err(TaxographError::Conflict(format!(
                        "category '{}' disappeared during the update",
                        counter.id
                    )));
                }
                written += 1;
            }
        }
        tx.commit()?;

        info!(
            rows = written,
            updates = batch.updates.len(),
            counters = batch.counters.len(),
            inserts = batch.inserts.len(),
            deletes = batch.deletes.len(),
            "batch applied"
        );
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
