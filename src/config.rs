//! Configuration Management
//!
//! Handles persistent configuration storage for kflat: the contexts to sync,
//! where the row snapshot lives, and engine tuning. JSON by default; files
//! ending in `.yaml` or `.yml` are read as YAML.

use crate::kube::client::DEFAULT_PAGE_SIZE;
use crate::sync::multiplexer::DEFAULT_MAX_CONCURRENCY;
use crate::sync::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One upstream context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub name: String,
    /// API server base URL
    pub server: String,
    /// Bearer token, stored inline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub contexts: Vec<ContextConfig>,
    /// Context for tables that are not synced per context
    #[serde(default)]
    pub default_context: Option<String>,
    /// Row snapshot file
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Root tables synced when none are given on the command line
    #[serde(default)]
    pub tables: Vec<String>,
}

impl Config {
    /// Directory for config, state and logs
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kflat"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Config file path for messages
    pub fn display_path() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "the config file".to_string())
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file gives the default config; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config = if is_yaml(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        };

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective state path (CLI > config > config dir)
    pub fn effective_state_path(&self, cli: Option<&Path>) -> Option<PathBuf> {
        cli.map(Path::to_path_buf)
            .or_else(|| self.state_path.clone())
            .or_else(|| Self::config_dir().map(|p| p.join("state.json")))
    }

    pub fn effective_page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    /// Get effective concurrency (CLI > config > default)
    pub fn effective_max_concurrency(&self, cli: Option<usize>) -> usize {
        cli.or(self.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1)
    }

    /// Get effective root tables (CLI > config > whole catalog)
    pub fn effective_tables(&self, cli: &[String], catalog: &[&str]) -> Vec<String> {
        if !cli.is_empty() {
            cli.to_vec()
        } else if !self.tables.is_empty() {
            self.tables.clone()
        } else {
            catalog.iter().map(|s| s.to_string()).collect()
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kflat-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_load_yaml() {
        let path = temp_file("config.yaml");
        std::fs::write(
            &path,
            "contexts:\n  - name: prod\n    server: https://prod.example.com\n    token_env: PROD_TOKEN\nmax_concurrency: 8\nretry:\n  max_attempts: 5\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.contexts.len(), 1);
        assert_eq!(config.contexts[0].token_env.as_deref(), Some("PROD_TOKEN"));
        assert_eq!(config.effective_max_concurrency(None), 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
    }

    #[test]
    fn test_json_round_trip() {
        let path = temp_file("config.json");
        let config = Config {
            contexts: vec![ContextConfig {
                name: "dev".into(),
                server: "http://localhost:8001".into(),
                token: None,
                token_env: None,
            }],
            tables: vec!["k8s_core_pods".into()],
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let path = temp_file("absent.json");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_effective_values() {
        let config = Config::default();
        assert_eq!(config.effective_page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(config.effective_max_concurrency(Some(0)), 1);
        assert_eq!(
            config.effective_tables(&[], &["a", "b"]),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            config.effective_tables(&["b".to_string()], &["a", "b"]),
            vec!["b".to_string()]
        );
        let cli = PathBuf::from("/tmp/state.json");
        assert_eq!(config.effective_state_path(Some(&cli)), Some(cli.clone()));
    }
}
