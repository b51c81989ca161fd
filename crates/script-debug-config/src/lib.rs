//! Configuration for the script debugging bridge.
//!
//! A config file is plain TOML with two tables:
//!
//! ```toml
//! [debugger]
//! suspend_on_startup = true
//! suspend_on_script_load = false
//! show_dynamic_code = false
//! dedupe_queued_events = false
//! slow_handler_warn_ms = 250
//! resume_timeout_ms = 0
//!
//! [logging]
//! level = "info"
//! json = false
//! stderr = true
//! file = "/tmp/script-debug.log"
//! ```
//!
//! Every key is optional; missing keys fall back to the defaults documented on
//! each field. Unknown keys are rejected so typos surface early.

mod logging;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a snippet of the input; keep only the message.
        ConfigError::Toml(err.message().to_string())
    }
}

/// Top-level config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    #[serde(default)]
    pub debugger: DebuggerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DebugConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Behavior of a single debug session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Stop on the first line of the root script.
    #[serde(default)]
    pub suspend_on_startup: bool,

    /// Stop on the first line of every script that gets loaded, including
    /// included scripts. Implies `suspend_on_startup`.
    #[serde(default)]
    pub suspend_on_script_load: bool,

    /// Report frames of dynamically generated code (eval, injected snippets).
    #[serde(default)]
    pub show_dynamic_code: bool,

    /// Drop a submitted event when an equal event is still waiting in the
    /// dispatcher queue.
    #[serde(default)]
    pub dedupe_queued_events: bool,

    /// Dispatches slower than this are logged as warnings. `0` disables the check.
    #[serde(default = "DebuggerConfig::default_slow_handler_warn_ms")]
    pub slow_handler_warn_ms: u64,

    /// Upper bound for a paused interpreter thread waiting on a resume decision.
    /// `0` waits until the session resumes or ends.
    #[serde(default)]
    pub resume_timeout_ms: u64,
}

impl DebuggerConfig {
    fn default_slow_handler_warn_ms() -> u64 {
        250
    }

    pub fn slow_handler_threshold(&self) -> Option<Duration> {
        (self.slow_handler_warn_ms > 0).then(|| Duration::from_millis(self.slow_handler_warn_ms))
    }

    pub fn resume_timeout(&self) -> Option<Duration> {
        (self.resume_timeout_ms > 0).then(|| Duration::from_millis(self.resume_timeout_ms))
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            suspend_on_startup: false,
            suspend_on_script_load: false,
            show_dynamic_code: false,
            dedupe_queued_events: false,
            slow_handler_warn_ms: Self::default_slow_handler_warn_ms(),
            resume_timeout_ms: 0,
        }
    }
}
