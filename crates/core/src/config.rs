//! TOML-based configuration for pathmap.
//!
//! The configuration names the object store location and, per resource
//! type, which mapper variant translates its traversal segments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// File name of the SQLite store inside `store.data_dir`.
pub const DATABASE_FILE: &str = "pathmap.db";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Object store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Mapper selection keyed by resource name.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the database file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/pathmap")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Which mapper variant a resource uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MapperKind {
    /// Integer ids rendered in decimal.
    #[default]
    Id,
    /// UUIDs rendered as base64 slugs.
    Base64Uuid,
}

/// Mapper settings for one resource type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub mapper: MapperKind,

    /// Replaces the variant's default mapping attribute.
    #[serde(default)]
    pub mapping_attribute: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading & validating
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(resources = config.resources.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.data_dir".into(),
                detail: "data directory must not be empty".into(),
            });
        }
        if self.resources.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resources".into(),
                detail: "at least one resource must be configured".into(),
            });
        }
        for (name, resource) in &self.resources {
            if let Some(attr) = &resource.mapping_attribute {
                if attr.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: format!("resources.{}.mapping_attribute", name),
                        detail: "mapping attribute must not be empty".into(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Full path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.store.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[store]
data_dir = "/tmp/pathmap"

[resources.users]
mapper = "id"

[resources.groups]
mapper = "base64_uuid"
mapping_attribute = "uuid"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/pathmap"));
        assert_eq!(config.resources["users"].mapper, MapperKind::Id);
        assert_eq!(config.resources["groups"].mapper, MapperKind::Base64Uuid);
        assert_eq!(
            config.resources["groups"].mapping_attribute.as_deref(),
            Some("uuid")
        );
        assert_eq!(config.database_path(), PathBuf::from("/tmp/pathmap/pathmap.db"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.resources.len(), 2);
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/pathmap.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unknown_mapper_kind_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[resources.users]\nmapper = \"hex\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_requires_resources() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "resources"
        ));
    }

    #[test]
    fn test_validate_rejects_blank_attribute() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config
            .resources
            .get_mut("users")
            .unwrap()
            .mapping_attribute = Some("  ".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. })
                if field == "resources.users.mapping_attribute"
        ));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("[resources.users]\n").unwrap();
        assert_eq!(config.store.data_dir, PathBuf::from("/var/lib/pathmap"));
        assert_eq!(config.resources["users"].mapper, MapperKind::Id);
        assert!(config.resources["users"].mapping_attribute.is_none());
        assert!(config.validate().is_ok());
    }
}
