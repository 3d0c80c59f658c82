//! JSON configuration file loading.
//!
//! The server is configured from a single JSON file named on the command
//! line. `number_of_additional_threads` and the `listener` section are
//! mandatory; a missing field or a type mismatch aborts startup before any
//! socket is bound. The `logger` section is optional and falls back to
//! console-only logging at info level.

use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Worker threads added on top of the main runtime thread.
    pub number_of_additional_threads: usize,
    /// TCP endpoint settings.
    pub listener: ListenerConfig,
    /// Optional log-sink settings.
    #[serde(default)]
    pub logger: Option<LoggerConfig>,
}

/// Listening endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    /// Interface to bind, e.g. `"127.0.0.1"` or `"0.0.0.0"`.
    pub interface: String,
    /// TCP port. `0` picks an ephemeral port.
    pub port: u16,
    /// Accept backlog handed to `listen(2)`.
    pub max_queued_connections: u32,
}

/// Log-sink settings.
///
/// `pattern`, `register_by_default` and `flush_every` are accepted for
/// configuration-file compatibility; line formatting and flushing are owned
/// by the subscriber and its non-blocking writer.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    /// Directory that receives the log file.
    #[serde(default = "default_log_root")]
    pub root: PathBuf,
    /// Log-file extension.
    #[serde(default = "default_log_extension")]
    pub extension: String,
    /// Minimum level written to the sinks.
    #[serde(default)]
    pub level: LogLevel,
    /// Line pattern.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Whether new loggers register globally.
    #[serde(default = "default_true")]
    pub register_by_default: bool,
    /// Flush interval in seconds.
    #[serde(default)]
    pub flush_every: Option<u64>,
}

/// Log levels accepted in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-frame traces.
    Trace,
    /// Connection lifecycle details.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Suspicious but recoverable events.
    Warn,
    /// Failures.
    Error,
    /// Only failures that end a connection or the process.
    Critical,
    /// No output.
    None,
}

impl LogLevel {
    /// The equivalent `tracing` filter directive.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
            Self::None => "off",
        }
    }
}

fn default_log_root() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_extension() -> String {
    "log".to_owned()
}

fn default_true() -> bool {
    true
}

/// Errors produced while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file '{path}': {source}")]
    Io {
        /// Path given on the command line.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or violates the schema.
    #[error("config file is not valid: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Load and validate the configuration from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
