//! SQLite schema initialization for the category store.
//!
//! `parent_ids` holds the canonical ordered parent list as a JSON array.
//! `parent_id` is the single-parent column written by older tooling; it is
//! only read when `parent_ids` is NULL and is cleared whenever the engine
//! writes a parent list.

use rusqlite::Connection;

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

const CREATE_CATEGORIES: &str = "\
CREATE TABLE IF NOT EXISTS categories (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  slug TEXT NOT NULL,
  parent_ids TEXT,
  parent_id TEXT,
  level INTEGER NOT NULL DEFAULT 0,
  path TEXT NOT NULL DEFAULT '',
  child_count INTEGER NOT NULL DEFAULT 0,
  has_children INTEGER NOT NULL DEFAULT 0,
  product_count INTEGER NOT NULL DEFAULT 0,
  sort_order INTEGER NOT NULL DEFAULT 0,
  is_active INTEGER NOT NULL DEFAULT 1,
  is_featured INTEGER NOT NULL DEFAULT 0,
  show_on_homepage INTEGER NOT NULL DEFAULT 0,
  version INTEGER NOT NULL DEFAULT 1,
  updated_at TEXT
)";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_categories_path ON categories(path)",
    "CREATE INDEX IF NOT EXISTS idx_categories_legacy_parent ON categories(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_categories_sort ON categories(sort_order, name)",
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Open (or create) the SQLite database at `db_path` and apply the schema.
///
/// The returned connection has WAL mode and synchronous NORMAL configured.
/// `":memory:"` gives a private in-memory database, which tests rely on.
pub fn initialize_database(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(CREATE_CATEGORIES)?;
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }

    Ok(conn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
