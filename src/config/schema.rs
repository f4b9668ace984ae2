//! Configuration data structures for Taxograph.
//!
//! Every section and field has a serde default, so a YAML file only needs
//! to mention what it changes.

use serde::{Deserialize, Serialize};

use crate::types::DeletePolicy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration, merged from defaults, YAML, environment and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxographConfig {
    /// Config format version (currently "1.0").
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tree: TreeConfig,

    #[serde(default)]
    pub delete: DeleteConfig,
}

impl Default for TaxographConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            tree: TreeConfig::default(),
            delete: DeleteConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the categories table.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Show inactive categories (and their subtrees) in tree output.
    #[serde(default = "default_true")]
    pub include_inactive: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            include_inactive: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteConfig {
    /// Policy used by `delete` when no `--policy` flag is given.
    #[serde(default)]
    pub default_policy: DeletePolicy,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_version() -> String {
    "1.0".to_string()
}

fn default_db_path() -> String {
    "taxograph.db".to_string()
}

fn default_log_filter() -> String {
    "taxograph=info".to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
