pub mod api;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod utils;
pub mod webhook;

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dispatch::Dispatcher;
use error::WebhookError;
use webhook::Action;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_SCRIPT_PATH: &str = "../app.bash";
pub const DEFAULT_INTERPRETER: &str = "bash";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebhookConfig {
    pub bind_address: String,
    pub log_dir: PathBuf,
    /// When set, requests must carry a valid `X-Hub-Signature-256` header.
    pub webhook_secret: Option<String>,
    pub script: ScriptConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            webhook_secret: None,
            script: ScriptConfig::default(),
        }
    }
}

/// How the deployment script is invoked
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScriptConfig {
    /// Resolved relative to `working_dir`, or the service's own directory
    pub path: PathBuf,
    /// Program used to run `path`; `None` executes `path` directly.
    pub interpreter: Option<String>,
    pub working_dir: Option<PathBuf>,
    /// No limit when unset
    pub timeout_secs: Option<u64>,
    pub action: Action,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SCRIPT_PATH),
            interpreter: Some(DEFAULT_INTERPRETER.to_string()),
            working_dir: None,
            timeout_secs: None,
            action: Action::Pull,
        }
    }
}

impl ScriptConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl WebhookConfig {
    /// Returns the configured secret if it is set and non-empty.
    pub fn secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, WebhookError> {
        self.bind_address.parse().map_err(|e| {
            WebhookError::ConfigError(format!(
                "Invalid bind address '{}': {}",
                self.bind_address, e
            ))
        })
    }

    /// Apply overrides from environment-style lookups (`BIND_ADDRESS`,
    /// `LOG_DIR`, `DEPLOY_SCRIPT`, `DEPLOY_TIMEOUT_SECS`, `WEBHOOK_SECRET`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), WebhookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(script) = lookup("DEPLOY_SCRIPT") {
            self.script.path = PathBuf::from(script);
        }
        if let Some(secs) = lookup("DEPLOY_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|e| {
                WebhookError::ConfigError(format!("Invalid DEPLOY_TIMEOUT_SECS '{}': {}", secs, e))
            })?;
            self.script.timeout_secs = Some(secs);
        }
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.webhook_secret = Some(secret);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WebhookError> {
        self.socket_addr()?;
        if self.script.path.as_os_str().is_empty() {
            return Err(WebhookError::ConfigError(
                "script.path must not be empty".to_string(),
            ));
        }
        if self.script.timeout_secs == Some(0) {
            return Err(WebhookError::ConfigError(
                "script.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the configuration file. A missing file yields the defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<WebhookConfig, WebhookError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(WebhookConfig::default());
    }

    let config_str = std::fs::read_to_string(path).map_err(|e| {
        WebhookError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    toml::from_str(&config_str).map_err(|e| {
        WebhookError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

pub struct AppState {
    pub config: WebhookConfig,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl AppState {
    pub fn new(config: WebhookConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { config, dispatcher }
    }
}

pub type SharedState = Arc<AppState>;
