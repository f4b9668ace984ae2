//! Error types for Taxograph.
//!
//! [`CycleError`] is the only domain error the graph engine raises. Every
//! other variant of [`TaxographError`] is either a boundary rejection
//! (malformed input) or a collaborator failure (database, config, I/O).

use serde::Serialize;
use thiserror::Error;

use crate::types::CategoryId;

/// A proposed parent assignment would make a category its own ancestor.
///
/// Carries enough information to render the user-facing message without the
/// caller re-deriving the conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error(
    "Circular reference detected: '{conflicting_category_name}' is already a child of this category"
)]
#[serde(rename_all = "camelCase")]
pub struct CycleError {
    /// The category encountered in the proposed ancestor chain.
    pub conflicting_category_id: CategoryId,
    /// Display name of that category (falls back to the id when unknown).
    pub conflicting_category_name: String,
    /// The proposed parent whose lineage closes the cycle.
    pub via_parent_id: CategoryId,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum TaxographError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("category not found: {0}")]
    NotFound(String),

    #[error("category '{id}' still has {count} descendant(s)")]
    HasDescendants { id: CategoryId, count: usize },

    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaxographError {
    /// The cycle details when this error is a rejected parent assignment.
    pub fn as_cycle(&self) -> Option<&CycleError> {
        match self {
            Self::Cycle(c) => Some(c),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaxographError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_renders_user_message() {
        let err = CycleError {
            conflicting_category_id: "electronics".into(),
            conflicting_category_name: "Electronics".into(),
            via_parent_id: "headphones".into(),
        };
        assert_eq!(
            err.to_string(),
            "Circular reference detected: 'Electronics' is already a child of this category"
        );
    }

    #[test]
    fn cycle_error_serializes_camel_case() {
        let err = CycleError {
            conflicting_category_id: "a".into(),
            conflicting_category_name: "A".into(),
            via_parent_id: "b".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["conflictingCategoryId"], "a");
        assert_eq!(json["conflictingCategoryName"], "A");
        assert_eq!(json["viaParentId"], "b");
    }

    #[test]
    fn cycle_converts_into_crate_error() {
        let err: TaxographError = CycleError {
            conflicting_category_id: "a".into(),
            conflicting_category_name: "A".into(),
            via_parent_id: "a".into(),
        }
        .into();
        assert!(err.as_cycle().is_some());
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn non_cycle_errors_have_no_cycle_details() {
        let err = TaxographError::InvalidArgument("empty id".into());
        assert!(err.as_cycle().is_none());
        assert_eq!(err.to_string(), "invalid argument: empty id");
    }
}
