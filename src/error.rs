//! Error handling types and utilities.

use std::path::PathBuf;

/// A specialized Result type for the binary and other top-level call sites.
///
/// This is an alias for `anyhow::Result` with context added via `.context()` and
/// `.with_context()` methods at the edges of the crate.
pub type Result<T> = anyhow::Result<T>;

/// Error returned when loading settings fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file not found at the expected path.
    #[error("settings file not found at {}", path.display())]
    NotFound { path: PathBuf },
    /// Settings file could not be read.
    #[error("failed to read settings from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Settings file is not valid TOML or does not match the schema.
    #[error("failed to parse settings from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Error returned when a backend query document cannot be modelled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DslError {
    /// The top level of a formatted query must be a JSON object.
    #[error("expected a JSON object at {path}, found {found}")]
    NotAnObject { path: String, found: &'static str },
    /// A clause had a shape the typed model cannot hold.
    #[error("malformed clause at {path}: {reason}")]
    Malformed { path: String, reason: String },
}

/// Error returned when the extraction helper client cannot be set up.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to build extraction client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Short JSON type name used in error messages.
pub(crate) const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
