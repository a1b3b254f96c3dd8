//! RBAC Manager Configuration Module
//! Handles loading and validating rbac.config.json

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "rbac.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacConfig {
    pub version: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tables: TableConfig,
    /// Role names granted to every user. Kept as raw JSON so a malformed
    /// value surfaces as a manager error rather than a parse failure.
    #[serde(default = "default_roles")]
    pub default_roles: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Table names used by the SQLite storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_item_table")]
    pub item: String,
    #[serde(default = "default_item_child_table")]
    pub item_child: String,
    #[serde(default = "default_assignment_table")]
    pub assignment: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            item: default_item_table(),
            item_child: default_item_child_table(),
            assignment: default_assignment_table(),
        }
    }
}

impl TableConfig {
    /// Table names are spliced into SQL, so only identifiers are accepted
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.item, &self.item_child, &self.assignment] {
            let valid = !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ConfigError::InvalidTableName(name.clone()));
            }
        }
        Ok(())
    }
}

fn default_item_table() -> String {
    "auth_item".to_string()
}

fn default_item_child_table() -> String {
    "auth_item_child".to_string()
}

fn default_assignment_table() -> String {
    "auth_assignment".to_string()
}

fn default_roles() -> Value {
    Value::Array(vec![])
}

impl RbacConfig {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: RbacConfig = serde_json::from_str(&content)?;
        config.tables.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project() -> Self {
        Self {
            version: "0.1.0".to_string(),
            database: DatabaseConfig {
                path: PathBuf::from("./data/rbac.db"),
            },
            tables: TableConfig::default(),
            default_roles: default_roles(),
        }
    }

    /// Database path resolved against the project directory
    pub fn database_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.database.path)
    }
}
