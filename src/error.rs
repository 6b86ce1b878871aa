//! Error hierarchy, with manual `Display`/`Error` impls rather than pulling
//! in `thiserror`.

use std::fmt;

#[derive(Debug, Clone)]
pub enum ConfigError {
    MissingKey(&'static str),
    Invalid { key: &'static str, reason: String },
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingKey(key) => write!(f, "missing required config key '{key}'"),
            ConfigError::Invalid { key, reason } => {
                write!(f, "invalid value for config key '{key}': {reason}")
            }
            ConfigError::Io(msg) => write!(f, "failed to read configuration file: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    QueryFailed(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::QueryFailed(msg) => write!(f, "query failed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

/// Top-level error type the controller propagates; distinguishes startup
/// failures from runtime failures for the process exit code.
#[derive(Debug)]
pub enum DaemonError {
    Config(ConfigError),
    Store(StoreError),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Config(e) => write!(f, "{e}"),
            DaemonError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DaemonError {}

impl From<ConfigError> for DaemonError {
    fn from(e: ConfigError) -> Self {
        DaemonError::Config(e)
    }
}

impl From<StoreError> for DaemonError {
    fn from(e: StoreError) -> Self {
        DaemonError::Store(e)
    }
}

impl DaemonError {
    /// 1 for startup/config failures, 2 for runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Config(_) => 1,
            DaemonError::Store(_) => 2,
        }
    }
}
