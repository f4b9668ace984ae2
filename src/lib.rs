//! Taxograph: a multi-parent category hierarchy engine.
//!
//! Categories form a DAG: a category may have several parents, the first of
//! which is its primary parent. The engine keeps the parent relation
//! acyclic, derives `level` and canonical `path`, and cascades those derived
//! fields through every affected descendant after a mutation. Persistence is
//! a SQLite store that applies each mutation's batch atomically.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod observability;
pub mod types;
