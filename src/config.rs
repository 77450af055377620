//! Enforcer configuration
//!
//! ```toml
//! auto_save = true
//!
//! [model]
//! config_type = "file"            # or "text"
//! config_file_path = "rbac_model.conf"
//!
//! [adapter]
//! kind = "sqlite"                 # "memory" | "file" | "sqlite"
//! path = "policy.db"
//! rules_table = "casbin_rule"
//!
//! [log]
//! enabled = false
//!
//! [cache]
//! enabled = true
//! capacity = 1000
//! ttl_secs = 0                    # 0 = no expiry
//! ```
//!
//! Relative paths in a file loaded with [`EnforcerConfig::from_file`] are
//! resolved against the directory holding that file.

use crate::adapter::{Adapter, FileAdapter, MemoryAdapter, SqliteAdapter};
use crate::error::{Error, Result};
use crate::model::Model;
use crate::validation::TableName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Where the model definition comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    #[default]
    File,
    Text,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ModelConfig {
    pub config_type: ModelSource,
    pub config_file_path: Option<PathBuf>,
    pub config_text: Option<String>,
}

/// Policy store kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AdapterConfig {
    pub kind: AdapterKind,
    /// Policy file or database path
    pub path: Option<PathBuf>,
    #[validate(length(min = 1, max = 63))]
    pub rules_table: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            kind: AdapterKind::Memory,
            path: None,
            rules_table: TableName::DEFAULT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LogConfig {
    /// Log every enforcement decision at info level
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub capacity: usize,
    /// Seconds before a cached decision expires; 0 keeps it until the next
    /// policy change
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: false,
            capacity: 1000,
            ttl_secs: 0,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EnforcerConfig {
    #[validate(nested)]
    pub model: ModelConfig,
    #[validate(nested)]
    pub adapter: AdapterConfig,
    #[validate(nested)]
    pub log: LogConfig,
    #[validate(nested)]
    pub cache: CacheConfig,
    /// Write mutations through to the store
    pub auto_save: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        EnforcerConfig {
            model: ModelConfig::default(),
            adapter: AdapterConfig::default(),
            log: LogConfig::default(),
            cache: CacheConfig::default(),
            auto_save: true,
        }
    }
}

impl EnforcerConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EnforcerConfig = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Field validation plus the cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        match self.model.config_type {
            ModelSource::File if self.model.config_file_path.is_none() => {
                return Err(Error::Config(
                    "model.config_file_path is required when config_type = \"file\"".to_string(),
                ))
            }
            ModelSource::Text if self.model.config_text.is_none() => {
                return Err(Error::Config(
                    "model.config_text is required when config_type = \"text\"".to_string(),
                ))
            }
            _ => {}
        }

        if self.adapter.kind != AdapterKind::Memory && self.adapter.path.is_none() {
            return Err(Error::Config(format!(
                "adapter.path is required for the {:?} adapter",
                self.adapter.kind
            )));
        }

        TableName::new(self.adapter.rules_table.as_str())?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut Option<PathBuf>| {
            if let Some(p) = path.as_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        };
        resolve(&mut self.model.config_file_path);
        resolve(&mut self.adapter.path);
    }

    /// Parse the configured model
    pub fn build_model(&self) -> Result<Model> {
        match self.model.config_type {
            ModelSource::File => {
                let path = self.model.config_file_path.as_ref().ok_or_else(|| {
                    Error::Config("model.config_file_path is not set".to_string())
                })?;
                Model::from_file(path)
            }
            ModelSource::Text => {
                let text = self
                    .model
                    .config_text
                    .as_deref()
                    .ok_or_else(|| Error::Config("model.config_text is not set".to_string()))?;
                Model::from_text(text)
            }
        }
    }

    /// Open the configured policy store
    pub fn build_adapter(&self) -> Result<Box<dyn Adapter>> {
        let path = || {
            self.adapter
                .path
                .as_ref()
                .ok_or_else(|| Error::Config("adapter.path is not set".to_string()))
        };

        Ok(match self.adapter.kind {
            AdapterKind::Memory => Box::new(MemoryAdapter::new()),
            AdapterKind::File => Box::new(FileAdapter::new(path()?)),
            AdapterKind::Sqlite => Box::new(SqliteAdapter::open(
                path()?,
                TableName::new(self.adapter.rules_table.as_str())?,
            )?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MODEL_TEXT: &str = "[request_definition]\nr = sub, obj, act\n\
                              [policy_definition]\np = sub, obj, act\n\
                              [policy_effect]\ne = some(where (p.eft == allow))\n\
                              [matchers]\nm = r.sub == p.sub && r.obj == p.obj && r.act == p.act\n";

    #[test]
    fn test_defaults() {
        let config = EnforcerConfig::default();
        assert!(config.auto_save);
        assert_eq!(config.adapter.kind, AdapterKind::Memory);
        assert_eq!(config.adapter.rules_table, "casbin_rule");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl(), None);
    }

    #[test]
    fn test_parse_full_config() {
        let config = EnforcerConfig::from_toml_str(
            r#"
            auto_save = false

            [model]
            config_type = "text"
            config_text = "x"

            [adapter]
            kind = "sqlite"
            path = "policy.db"
            rules_table = "rules"

            [log]
            enabled = true

            [cache]
            enabled = true
            capacity = 50
            ttl_secs = 30
            "#,
        )
        .unwrap();

        assert!(!config.auto_save);
        assert_eq!(config.model.config_type, ModelSource::Text);
        assert_eq!(config.adapter.kind, AdapterKind::Sqlite);
        assert_eq!(config.adapter.rules_table, "rules");
        assert!(config.log.enabled);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validation_errors() {
        let zero_capacity = r#"
            [model]
            config_type = "text"
            config_text = "x"
            [cache]
            capacity = 0
        "#;
        assert!(matches!(
            EnforcerConfig::from_toml_str(zero_capacity),
            Err(Error::Config(_))
        ));

        let bad_table = r#"
            [model]
            config_type = "text"
            config_text = "x"
            [adapter]
            rules_table = "casbin-rule"
        "#;
        assert!(matches!(EnforcerConfig::from_toml_str(bad_table), Err(Error::Config(_))));

        let missing_path = r#"
            [model]
            config_file_path = "model.conf"
            [adapter]
            kind = "file"
        "#;
        assert!(matches!(EnforcerConfig::from_toml_str(missing_path), Err(Error::Config(_))));

        assert!(matches!(
            EnforcerConfig::from_toml_str("[model]\nconfig_type = \"file\"\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EnforcerConfig::from_toml_str("auto_save = \"yes\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("model.conf"), MODEL_TEXT).unwrap();
        std::fs::write(
            dir.path().join("tollgate.toml"),
            "[model]\nconfig_file_path = \"model.conf\"\n[adapter]\nkind = \"file\"\npath = \"policy.csv\"\n",
        )
        .unwrap();

        let config = EnforcerConfig::from_file(dir.path().join("tollgate.toml")).unwrap();
        assert_eq!(config.adapter.path.as_deref(), Some(dir.path().join("policy.csv").as_path()));

        let model = config.build_model().unwrap();
        assert_eq!(model.arity("p"), Some(3));
        assert!(config.build_adapter().is_ok());
    }
}
