//! Contexts
//!
//! A context is one upstream environment (cluster) that rows are tagged with.

use crate::config::{Config, ContextConfig};
use crate::row::ContextId;
use anyhow::{anyhow, Context as _, Result};
use std::fmt;
use url::Url;

/// One upstream environment
#[derive(Clone, PartialEq, Eq)]
pub struct Context {
    pub id: ContextId,
    pub server: Url,
    pub token: Option<String>,
}

impl Context {
    pub fn new(name: &str, server: Url) -> Self {
        Self {
            id: ContextId::new(name),
            server,
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Build from a config entry, reading the token from the environment
    /// when `token_env` is set
    pub fn from_config(entry: &ContextConfig) -> Result<Self> {
        let server = Url::parse(&entry.server)
            .with_context(|| format!("Invalid server URL for context {}", entry.name))?;
        let mut context = Self::new(&entry.name, server);

        if let Some(token) = &entry.token {
            context.token = Some(token.clone());
        } else if let Some(var) = &entry.token_env {
            match std::env::var(var) {
                Ok(token) if !token.is_empty() => context.token = Some(token),
                _ => tracing::warn!(
                    "Token variable {} for context {} is not set",
                    var,
                    entry.name
                ),
            }
        }

        Ok(context)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("server", &self.server.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolve the configured contexts, keeping only `selected` when non-empty.
///
/// Order follows the configuration file, which is also the report order.
pub fn resolve_contexts(config: &Config, selected: &[String]) -> Result<Vec<Context>> {
    for name in selected {
        if !config.contexts.iter().any(|c| &c.name == name) {
            return Err(anyhow!("Unknown context: {}", name));
        }
    }

    let contexts = config
        .contexts
        .iter()
        .filter(|c| selected.is_empty() || selected.contains(&c.name))
        .map(Context::from_config)
        .collect::<Result<Vec<_>>>()?;

    if contexts.is_empty() {
        return Err(anyhow!(
            "No contexts configured. Add one to {}",
            Config::display_path()
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for context in &contexts {
        if !seen.insert(context.id.as_str()) {
            return Err(anyhow!("Context {} is configured twice", context.id));
        }
    }

    Ok(contexts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ContextConfig {
        ContextConfig {
            name: name.to_string(),
            server: format!("https://{}.example.com", name),
            token: None,
            token_env: None,
        }
    }

    fn config(names: &[&str]) -> Config {
        Config {
            contexts: names.iter().map(|n| entry(n)).collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_resolve_all_in_config_order() {
        let contexts = resolve_contexts(&config(&["prod", "dev"]), &[]).unwrap();
        let names: Vec<&str> = contexts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(names, vec!["prod", "dev"]);
    }

    #[test]
    fn test_resolve_selected() {
        let contexts =
            resolve_contexts(&config(&["prod", "dev"]), &["dev".to_string()]).unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].id.as_str(), "dev");
    }

    #[test]
    fn test_unknown_or_missing_contexts_fail() {
        assert!(resolve_contexts(&config(&["prod"]), &["qa".to_string()]).is_err());
        assert!(resolve_contexts(&config(&[]), &[]).is_err());
        assert!(resolve_contexts(&config(&["prod", "prod"]), &[]).is_err());
    }

    #[test]
    fn test_invalid_server_fails() {
        let mut bad = entry("prod");
        bad.server = "not a url".to_string();
        assert!(Context::from_config(&bad).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let context = Context::new("prod", Url::parse("https://prod.example.com").unwrap())
            .with_token("secret-token");
        let debug = format!("{:?}", context);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("redacted"));
    }
}
