//! Rolegate Configuration Module
//! Handles loading and validating rolegate.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::rbac::CodenameMap;

pub const CONFIG_FILE: &str = "rolegate.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

/// Action to codename templates used to project access masks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub codenames: CodenameMap,
}

fn default_port() -> u16 {
    54330
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.db_type != "sqlite" {
            return Err(ConfigError::Invalid(format!(
                "unsupported database type {:?}",
                self.database.db_type
            )));
        }
        self.permissions.codenames.validate().map_err(ConfigError::Invalid)
    }

    /// Database file, relative paths resolved against the project directory
    pub fn database_path(&self, project_dir: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            project_dir.join(&self.database.path)
        }
    }

    pub fn default_for_project(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            project: ProjectConfig {
                name: name.to_string(),
                id: format!("rolegate-{}", name),
            },
            database: DatabaseConfig {
                db_type: "sqlite".to_string(),
                path: PathBuf::from("./data/rolegate.db"),
            },
            api: ApiConfig {
                port: default_port(),
                host: default_host(),
            },
            permissions: PermissionsConfig::default(),
        }
    }
}
