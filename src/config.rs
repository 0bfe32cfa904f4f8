//! Configuration management
//!
//! Agent endpoint configuration is layered: a shared `default.yaml`, an
//! agent-specific `<agent>.yaml`, then `AAC_`-prefixed environment variables,
//! all keyed by environment (`dev`, `staging`, `prod`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result};

/// Configuration for one AI agent endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name (filled in after loading, not part of the YAML)
    #[serde(default)]
    pub agent_name: String,
    /// Base URL of the agent service, e.g. `http://localhost:9007`
    pub base_url: String,
    /// Endpoint path appended to the base URL, e.g. `/agent/payroll-v1`
    pub endpoint_path: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Maximum retry attempts for connect-level failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial retry delay in seconds (doubles per attempt)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: f64,
    /// Extra request headers
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Authorization header value, e.g. `Bearer token123`
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Cookie header value
    #[serde(default)]
    pub cookie_header: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

impl AgentConfig {
    /// Full URL of the agent endpoint.
    pub fn endpoint_url(&self) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let full = format!("{}{}", base, self.endpoint_path);
        Url::parse(&full).map_err(|e| Error::Config(format!("Invalid agent URL '{full}': {e}")))
    }

    /// Healthcheck URL derived from the base URL.
    pub fn healthcheck_url(&self) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let full = format!("{base}/healthcheck");
        Url::parse(&full).map_err(|e| Error::Config(format!("Invalid agent URL '{full}': {e}")))
    }
}

/// Stub server bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StubConfig {
    /// Host to bind the stub listener to
    pub host: String,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Service name reported by `/health`
    pub service_name: String,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9876,
            service_name: "ai-answer-checker-stubs".to_string(),
        }
    }
}

/// Loader and cache for agent configurations.
pub struct AgentConfigStore {
    config_dir: PathBuf,
    cache: Mutex<HashMap<String, AgentConfig>>,
}

impl AgentConfigStore {
    /// Create a store rooted at the given config directory.
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get the configuration for an agent in an environment.
    ///
    /// Sources, lowest to highest priority: `default.yaml[env]`,
    /// `<agent>.yaml[env]`, `AAC_*` environment variables. The result is
    /// cached per `(agent, environment)`.
    pub fn get(&self, agent_name: &str, environment: &str) -> Result<AgentConfig> {
        let cache_key = format!("{agent_name}:{environment}");
        if let Some(cached) = self.cache.lock().get(&cache_key) {
            debug!(agent = %agent_name, environment = %environment, "Using cached agent config");
            return Ok(cached.clone());
        }

        let config = self.load(agent_name, environment)?;
        self.cache.lock().insert(cache_key, config.clone());
        info!(agent = %agent_name, environment = %environment, "Loaded agent config");
        Ok(config)
    }

    fn load(&self, agent_name: &str, environment: &str) -> Result<AgentConfig> {
        let default_file = self.config_dir.join("default.yaml");
        let agent_file = self.config_dir.join(format!("{agent_name}.yaml"));

        if !default_file.exists() && !agent_file.exists() {
            return Err(Error::Config(format!(
                "No configuration found for agent '{agent_name}'. Expected {} or {}",
                agent_file.display(),
                default_file.display()
            )));
        }

        let mut figment = Figment::new();
        if default_file.exists() {
            figment = figment.merge(Yaml::file(&default_file));
        }
        if agent_file.exists() {
            figment = figment.merge(Yaml::file(&agent_file));
        }

        let mut config: AgentConfig = figment
            .focus(environment)
            .merge(Env::prefixed("AAC_"))
            .extract()
            .map_err(|e| {
                Error::Config(format!(
                    "No usable configuration for agent '{agent_name}' in environment '{environment}': {e}"
                ))
            })?;

        config.agent_name = agent_name.to_string();
        config.endpoint_url()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_agent_config_for_environment() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("payroll.yaml"),
            "dev:\n  base_url: http://localhost:9007\n  endpoint_path: /agent/payroll-v1\n  timeout_seconds: 10\n",
        )
        .unwrap();

        let store = AgentConfigStore::new(tmp.path());
        let config = store.get("payroll", "dev").unwrap();
        assert_eq!(config.agent_name, "payroll");
        assert_eq!(config.base_url, "http://localhost:9007");
        assert_eq!(config.timeout_seconds, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "http://localhost:9007/agent/payroll-v1"
        );
    }

    #[test]
    fn agent_file_overrides_default_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("default.yaml"),
            "dev:\n  base_url: http://default:1\n  endpoint_path: /query\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("special.yaml"),
            "dev:\n  base_url: http://special:2\n",
        )
        .unwrap();

        let store = AgentConfigStore::new(tmp.path());
        let config = store.get("special", "dev").unwrap();
        assert_eq!(config.base_url, "http://special:2");
        assert_eq!(config.endpoint_path, "/query");
    }

    #[test]
    fn missing_environment_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("a.yaml"),
            "dev:\n  base_url: http://x:1\n  endpoint_path: /q\n",
        )
        .unwrap();

        let store = AgentConfigStore::new(tmp.path());
        assert!(store.get("a", "prod").is_err());
    }

    #[test]
    fn missing_files_are_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = AgentConfigStore::new(tmp.path());
        assert!(store.get("ghost", "dev").is_err());
    }
}
