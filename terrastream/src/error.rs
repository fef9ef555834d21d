//! Error types for the streaming core.
//!
//! Two error families exist:
//!
//! - [`ConfigError`]: a deployment profile could not be parsed or validated.
//!   These are surfaced at construction time and are the caller's problem.
//! - [`LoadError`]: a content load failed. Loads fail routinely (backend
//!   hiccups, parse errors in source data) and are never fatal to the
//!   scheduler; the orchestrator retries them or degrades to an empty
//!   resident record.

use thiserror::Error;

/// Error raised while loading or validating a [`StreamingConfig`].
///
/// [`StreamingConfig`]: crate::config::StreamingConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The profile file could not be read.
    #[error("failed to read config profile: {0}")]
    Io(#[from] std::io::Error),

    /// The profile file is not valid INI.
    #[error("failed to parse config profile: {0}")]
    Parse(#[from] ini::ParseError),

    /// A key holds a value that cannot be interpreted.
    #[error("invalid value for [{section}] {key}: {value}")]
    InvalidValue {
        /// INI section name.
        section: String,
        /// Key within the section.
        key: String,
        /// The offending raw value.
        value: String,
    },

    /// Tier distances are not monotonically ordered.
    #[error("tier distances must be ordered 0 <= near <= mid <= far <= horizon")]
    UnorderedTiers,

    /// A numeric knob is outside its permitted range.
    #[error("configuration out of range: {0}")]
    OutOfRange(String),
}

/// Error describing a failed content load.
///
/// Mirrors the distinction the scheduler cares about: transient failures
/// are eligible for retry with backoff, permanent ones are not.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LoadError {
    message: String,
    transient: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl LoadError {
    /// Creates a permanent load error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
            source: None,
        }
    }

    /// Creates a transient (retryable) load error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
            source: None,
        }
    }

    /// Attaches an underlying source error.
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns true if this failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_permanent() {
        let err = LoadError::new("region table corrupt");
        assert_eq!(err.message(), "region table corrupt");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_load_error_transient() {
        let err = LoadError::transient("backend busy");
        assert!(err.is_transient());
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::new("no height data");
        assert_eq!(format!("{}", err), "no height data");
    }

    #[test]
    fn test_load_error_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        let err = LoadError::transient("read timed out").with_source(io);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            section: "tiers".into(),
            key: "near_end".into(),
            value: "fast".into(),
        };
        assert_eq!(
            format!("{}", err),
            "invalid value for [tiers] near_end: fast"
        );
    }
}
