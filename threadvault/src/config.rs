//! Gateway configuration
//!
//! Default config location: ./threadvault.toml (created with defaults when missing)

use crate::backend::health::HealthConfig;
use crate::backend::Endpoint;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub relational: RelationalConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Overall deadline for composite operations (user analysis)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            request_timeout_ms: default_request_timeout_ms(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search index endpoints in priority order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<Endpoint>,
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
    #[serde(default = "default_comment_index")]
    pub comment_index: String,
    #[serde(default = "default_submission_index")]
    pub submission_index: String,
}

fn default_endpoints() -> Vec<Endpoint> {
    vec![Endpoint::new("primary", "http://localhost:9200")]
}

fn default_per_call_timeout_ms() -> u64 {
    5_000
}

fn default_comment_index() -> String {
    "rc".to_string()
}

fn default_submission_index() -> String {
    "rs".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            comment_index: default_comment_index(),
            submission_index: default_submission_index(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthSettings {
    /// Consecutive failures that make an endpoint unavailable
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_probe_interval_ms() -> u64 {
    10_000
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationalConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./archive.db")
}

fn default_pool_size() -> usize {
    4
}

fn default_acquire_timeout_ms() -> u64 {
    1_000
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_db_path(),
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,threadvault=debug".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply ES_PRIMARY, ES_FALLBACK, DB_PATH and LOG_FORMAT from the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("ES_PRIMARY") {
            self.set_endpoint(0, "primary", url);
        }
        if let Some(url) = non_empty("ES_FALLBACK") {
            self.set_endpoint(1, "fallback", url);
        }
        if let Some(path) = non_empty("DB_PATH") {
            self.relational.path = PathBuf::from(path);
            self.relational.enabled = true;
        }
        if let Some(format) = non_empty("LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    fn set_endpoint(&mut self, index: usize, name: &str, url: String) {
        match self.search.endpoints.get_mut(index) {
            Some(endpoint) => endpoint.url = url,
            None => self.search.endpoints.push(Endpoint::new(name, url)),
        }
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.search.endpoints.is_empty() {
            bail!("search.endpoints must list at least one endpoint");
        }
        for (i, endpoint) in self.search.endpoints.iter().enumerate() {
            if endpoint.url.trim().is_empty() {
                bail!("search.endpoints[{}] ({}) has an empty url", i, endpoint.name);
            }
            if self.search.endpoints[..i]
                .iter()
                .any(|other| other.name == endpoint.name)
            {
                bail!("duplicate endpoint name '{}'", endpoint.name);
            }
        }
        if self.search.per_call_timeout_ms == 0 {
            bail!("search.per_call_timeout_ms must be greater than zero");
        }
        if self.health.failure_threshold == 0 {
            bail!("health.failure_threshold must be greater than zero");
        }
        if self.relational.enabled && self.relational.pool_size == 0 {
            bail!("relational.pool_size must be greater than zero");
        }
        if !matches!(self.observability.log_format.as_str(), "pretty" | "json") {
            bail!(
                "observability.log_format must be 'pretty' or 'json', got '{}'",
                self.observability.log_format
            );
        }
        Ok(())
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            failure_threshold: self.health.failure_threshold,
            cooldown: Duration::from_millis(self.health.cooldown_ms),
            probe_interval: Duration::from_millis(self.health.probe_interval_ms),
        }
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.search.per_call_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.relational.acquire_timeout_ms)
    }
}
