use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParcellError, Result};

/// Top-level parcell configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub net: NetConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

/// Request scheduling and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// Base URL relative request paths are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// How long a request is held back before it is dispatched. Responses
    /// faster than this never show a busy state.
    #[serde(default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl NetConfig {
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            dispatch_delay_ms: default_dispatch_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/".to_string()
}
fn default_dispatch_delay_ms() -> u64 { 500 }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_user_agent() -> String {
    format!("parcell/{}", env!("CARGO_PKG_VERSION"))
}

/// Status surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    /// Log every status transition at info level.
    #[serde(default = "default_log_transitions")]
    pub log_transitions: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            log_transitions: default_log_transitions(),
        }
    }
}

fn default_bus_capacity() -> usize { 64 }
fn default_log_transitions() -> bool { true }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ParcellError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| ParcellError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ParcellError::ConfigNotFound(p)) => {
                tracing::debug!(path = %p, "No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.net.base_url.trim().is_empty() {
            return Err(ParcellError::Config("net.base_url must not be empty".into()));
        }
        if self.status.bus_capacity == 0 {
            return Err(ParcellError::Config(
                "status.bus_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
