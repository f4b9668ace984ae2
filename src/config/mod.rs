//! Configuration loading.
//!
//! Sources, lowest priority first: built-in defaults, a YAML file, then
//! `TAXOGRAPH_*` environment variables. CLI flags are applied by the caller
//! on top of the returned value.

pub mod schema;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::{Result, TaxographError};
use crate::types::DeletePolicy;

pub use schema::TaxographConfig;

pub const CONFIG_FILE_NAME: &str = "taxograph.yaml";

pub const ENV_DB_PATH: &str = "TAXOGRAPH_DB";
pub const ENV_LOG_FILTER: &str = "TAXOGRAPH_LOG";
pub const ENV_DELETE_POLICY: &str = "TAXOGRAPH_DELETE_POLICY";

/// Candidate config files in lookup order: `./taxograph.yaml`, then the
/// platform config directory.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dirs) = ProjectDirs::from("", "", "taxograph") {
        paths.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    paths
}

/// Load the merged configuration.
///
/// An explicit path must exist. Without one, the first existing file from
/// [`default_config_paths`] is used, or the defaults when there is none.
pub fn load_config(explicit: Option<&Path>) -> Result<TaxographConfig> {
    let file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_paths().into_iter().find(|p| p.is_file()),
    };

    let mut config = match file {
        Some(path) => {
            debug!(path = %path.display(), "loading config file");
            load_file(&path)?
        }
        None => TaxographConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Parse one YAML config file.
pub fn load_file(path: &Path) -> Result<TaxographConfig> {
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(TaxographConfig::default());
    }
    Ok(serde_yaml::from_str(&text)?)
}

/// Apply `TAXOGRAPH_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut TaxographConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
        config.database.path = path;
    }
    if let Some(filter) = lookup(ENV_LOG_FILTER).filter(|v| !v.trim().is_empty()) {
        config.logging.filter = filter;
    }
    if let Some(raw) = lookup(ENV_DELETE_POLICY) {
        config.delete.default_policy = DeletePolicy::from_str_loose(&raw).ok_or_else(|| {
            TaxographError::InvalidArgument(format!("{ENV_DELETE_POLICY}: unknown policy '{raw}'"))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "database:\n  path: shop.db\ntree:\n  include_inactive: false\n").unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.database.path, "shop.db");
        assert!(!config.tree.include_inactive);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, TaxographError::Io(_)));
    }

    #[test]
    fn empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(load_file(&path).unwrap(), TaxographConfig::default());
    }

    #[test]
    fn malformed_file_is_a_yaml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{{invalid yaml}}").unwrap();
        assert!(matches!(load_file(&path), Err(TaxographError::Yaml(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = TaxographConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_DB_PATH, "/tmp/other.db"),
                (ENV_LOG_FILTER, "taxograph=debug"),
                (ENV_DELETE_POLICY, "reparent_orphans"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database.path, "/tmp/other.db");
        assert_eq!(config.logging.filter, "taxograph=debug");
        assert_eq!(config.delete.default_policy, DeletePolicy::ReparentOrphans);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = TaxographConfig::default();
        apply_env_overrides(&mut config, env(&[(ENV_DB_PATH, "  ")])).unwrap();
        assert_eq!(config.database.path, "taxograph.db");
    }

    #[test]
    fn unknown_env_policy_is_rejected() {
        let mut config = TaxographConfig::default();
        let err = apply_env_overrides(&mut config, env(&[(ENV_DELETE_POLICY, "nuke")])).unwrap_err();
        assert!(matches!(err, TaxographError::InvalidArgument(_)));
    }
}
