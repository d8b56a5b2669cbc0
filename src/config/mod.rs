//! Assistant configuration: endpoint, API key and schema catalog.
//!
//! User-level config: `~/.policy-copilot/config.yaml`
//!
//! Resolution: config file → state store (values saved from the editor) →
//! env var fallback (`OPENAI_API_KEY`, `POLICY_COPILOT_API_URL`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::llm::OPENAI_CHAT_URL;
use crate::store::{self, KeyValueStore};
use crate::validate::{PolicySchema, SchemaError};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const API_URL_ENV: &str = "POLICY_COPILOT_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHomeDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Resolved assistant configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Chat completions URL. `None` means the public OpenAI endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom schema catalog (YAML). `None` means the built-in catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
}

/// Path to `~/.policy-copilot/`.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|p| PathBuf::from(p).join(".policy-copilot"))
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME")
            .ok()
            .map(|p| PathBuf::from(p).join(".policy-copilot"))
    }
}

impl AssistantConfig {
    /// Load the user config file, then layer the store and environment.
    /// A missing or unreadable file counts as empty.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut config = config_dir()
            .map(|dir| dir.join("config.yaml"))
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default();
        config.apply_store(store);
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load a config file. A missing file is an empty config.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Self::default()),
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Values saved in the store override the file.
    pub fn apply_store(&mut self, store: &dyn KeyValueStore) {
        if let Some(key) = store.get(store::API_KEY).filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = store.get(store::API_URL).filter(|u| !u.is_empty()) {
            self.api_url = Some(url);
        }
    }

    /// Environment variables fill whatever is still unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            if let Some(key) = lookup(API_KEY_ENV) {
                debug!("using API key from {API_KEY_ENV}");
                self.api_key = Some(key);
            }
        }
        if self.api_url.is_none() {
            self.api_url = lookup(API_URL_ENV);
        }
    }

    /// Save to `~/.policy-copilot/config.yaml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let dir = config_dir().ok_or(ConfigError::NoHomeDir)?;
        self.save_to(&dir.join("config.yaml"))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(io_err)
    }

    /// Endpoint URL, defaulting to the public OpenAI endpoint.
    pub fn endpoint(&self) -> &str {
        self.api_url.as_deref().unwrap_or(OPENAI_CHAT_URL)
    }

    /// The configured schema catalog, or the built-in one.
    pub fn policy_schema(&self) -> Result<PolicySchema, SchemaError> {
        match &self.schema {
            Some(path) => PolicySchema::load(path),
            None => Ok(PolicySchema::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn load_from_yaml_string() {
        let yaml = r#"
api_url: https://contoso.openai.azure.com/chat
api_key: azure-key
schema: /etc/policy-schema.yaml
"#;
        let config: AssistantConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint(), "https://contoso.openai.azure.com/chat");
        assert_eq!(config.api_key.as_deref(), Some("azure-key"));
        assert_eq!(config.schema, Some(PathBuf::from("/etc/policy-schema.yaml")));
    }

    #[test]
    fn default_endpoint_is_openai() {
        assert_eq!(AssistantConfig::default().endpoint(), OPENAI_CHAT_URL);
    }

    #[test]
    fn round_trip_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg").join("config.yaml");
        let config = AssistantConfig {
            api_key: Some("sk-test".into()),
            ..AssistantConfig::default()
        };
        config.save_to(&path).unwrap();
        let back = AssistantConfig::load_from(&path).unwrap();
        assert_eq!(back, config);
        // None fields are not written
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("api_url"));
    }

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AssistantConfig::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, AssistantConfig::default());
    }

    #[test]
    fn store_overrides_file() {
        let store = MemoryStore::new();
        store.set(store::API_KEY, "from-store").unwrap();
        store.set(store::API_URL, "http://localhost:1234").unwrap();
        let mut config = AssistantConfig {
            api_key: Some("from-file".into()),
            ..AssistantConfig::default()
        };
        config.apply_store(&store);
        assert_eq!(config.api_key.as_deref(), Some("from-store"));
        assert_eq!(config.endpoint(), "http://localhost:1234");
    }

    #[test]
    fn empty_store_values_are_ignored() {
        let store = MemoryStore::new();
        store.set(store::API_KEY, "").unwrap();
        let mut config = AssistantConfig::default();
        config.apply_store(&store);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn env_fills_gaps_only() {
        let env = |key: &str| match key {
            API_KEY_ENV => Some("sk-env".to_string()),
            API_URL_ENV => Some("http://env".to_string()),
            _ => None,
        };

        let mut empty = AssistantConfig::default();
        empty.apply_env(env);
        assert_eq!(empty.api_key.as_deref(), Some("sk-env"));
        assert_eq!(empty.endpoint(), "http://env");

        let mut set = AssistantConfig {
            api_key: Some("sk-file".into()),
            api_url: Some("http://file".into()),
            schema: None,
        };
        set.apply_env(env);
        assert_eq!(set.api_key.as_deref(), Some("sk-file"));
        assert_eq!(set.endpoint(), "http://file");
    }

    #[test]
    fn schema_defaults_to_builtin() {
        let schema = AssistantConfig::default().policy_schema().unwrap();
        assert!(schema.rule("set-header").is_some());
    }

    #[test]
    fn schema_from_configured_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(&path, "elements:\n  - name: custom\n    attributes: [a]\n").unwrap();
        let config = AssistantConfig {
            schema: Some(path),
            ..AssistantConfig::default()
        };
        let schema = config.policy_schema().unwrap();
        assert_eq!(schema.len(), 1);
        assert!(schema.allows("custom", "a"));
    }
}
