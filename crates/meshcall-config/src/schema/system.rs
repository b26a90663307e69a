//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Extra `tracing_subscriber::EnvFilter` directives, e.g. `"meshcall_core=debug"`.
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Build an env-filter directive string scoped to `target`.
    pub fn directive_for(&self, target: &str) -> String {
        let mut parts = vec![format!("{target}={}", self.level.as_str())];
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }
}
