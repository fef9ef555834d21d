//! CLI error type.

use thiserror::Error;

/// Errors surfaced to the terminal with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// A streaming profile failed to load or validate.
    #[error("configuration error: {0}")]
    Config(#[from] terrastream::error::ConfigError),

    /// The async runtime could not start.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The metrics snapshot could not be serialized.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}
