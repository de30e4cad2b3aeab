// src/error.rs
//
// Error taxonomy for the pacing simulator and trainer.
//
// - Configuration: missing / invalid athlete or plan fields, empty expanded plan,
//   invalid sweep spec.
// - InvalidAction: action label outside the fixed enumeration.
// - Persistence: malformed value-table or artifact file.
// - Io: filesystem failure while reading inputs or writing artifacts.
//
// A value-table lookup miss is NOT an error; see `rl::learner::LookupMissPolicy`.

use std::path::PathBuf;

/// Errors surfaced at the component boundaries of the crate.
#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    /// Invalid athlete profile, workout plan, terrain or sweep configuration.
    #[error("Configuration error in '{field}': {message}")]
    Configuration {
        /// Field (or input) that failed validation
        field: String,
        /// Human-readable reason
        message: String,
    },

    /// Action label outside {slow down, keep going, accelerate}.
    #[error("Invalid action '{0}'. Expected one of: slow down | keep going | accelerate")]
    InvalidAction(String),

    /// Malformed persisted artifact (value table, reward history).
    #[error("Persistence error for '{path}': {message}")]
    Persistence {
        /// Artifact path (or `<memory>` for in-memory parsing)
        path: String,
        /// Human-readable reason
        message: String,
    },

    /// Underlying I/O failure.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Source error
        source: std::io::Error,
    },
}

impl PacerError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        PacerError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<String>, message: impl Into<String>) -> Self {
        PacerError::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PacerError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised by input validation (used by the sweep to classify failures).
    pub fn is_configuration(&self) -> bool {
        matches!(self, PacerError::Configuration { .. })
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PacerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_field() {
        let err = PacerError::config("HR_max", "must be greater than HR_rest");
        let msg = err.to_string();
        assert!(msg.contains("HR_max"));
        assert!(msg.contains("greater than HR_rest"));
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_action_lists_expected_labels() {
        let err = PacerError::InvalidAction("sprint".to_string());
        assert!(err.to_string().contains("sprint"));
        assert!(err.to_string().contains("keep going"));
        assert!(!err.is_configuration());
    }
}
