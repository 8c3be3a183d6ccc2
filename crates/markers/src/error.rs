use std::path::PathBuf;

use thiserror::Error;

/// Result type used by the markers crate.
pub type Result<T> = std::result::Result<T, MarkerError>;

/// Errors produced by marker storage, formatting, timing and lifecycle code.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("formatter for saved content does not exist: {name}")]
    UnknownFormatter { name: String },
    #[error("a marker already exists at {seconds}s")]
    DuplicateMarker { seconds: f64 },
    #[error("no marker at {seconds}s")]
    MarkerNotFound { seconds: f64 },
    #[error("invalid marker time: {seconds}")]
    InvalidSeconds { seconds: f64 },
    #[error("invalid DHMS time: {value:?}")]
    InvalidTime { value: String },
    #[error("parse error ({context}): {value:?}")]
    Parse {
        context: &'static str,
        value: String,
    },
    #[error("page element not found: {element}")]
    MissingElement { element: &'static str },
    #[error("player diagnostics unavailable after {attempts} attempts")]
    DiagnosticsUnavailable { attempts: u32 },
    #[error("storage error ({context}): {reason}")]
    Storage {
        context: &'static str,
        reason: String,
    },
    #[error("{context}: {} ({source})", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide how a caller reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Persisted state cannot be interpreted; fatal for the session.
    Configuration,
    /// The page is not ready yet; retried locally, never shown to the user.
    Transient,
    /// Serialized or typed text did not parse.
    Parse,
    /// The store refused a mutation.
    Rejected,
    Other,
}

impl From<&MarkerError> for ErrorClass {
    fn from(value: &MarkerError) -> Self {
        match value {
            MarkerError::UnknownFormatter { .. } => Self::Configuration,
            MarkerError::MissingElement { .. } | MarkerError::DiagnosticsUnavailable { .. } => {
                Self::Transient
            }
            MarkerError::InvalidTime { .. } | MarkerError::Parse { .. } => Self::Parse,
            MarkerError::DuplicateMarker { .. }
            | MarkerError::MarkerNotFound { .. }
            | MarkerError::InvalidSeconds { .. } => Self::Rejected,
            MarkerError::Storage { .. } | MarkerError::Io { .. } | MarkerError::Json(_) => {
                Self::Other
            }
        }
    }
}

impl MarkerError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorClass, MarkerError};

    #[test]
    fn unknown_formatter_is_a_configuration_error() {
        let error = MarkerError::UnknownFormatter {
            name: String::from("yaml"),
        };
        assert_eq!(error.class(), ErrorClass::Configuration);
        assert!(error.to_string().contains("yaml"));
    }

    #[test]
    fn missing_diagnostics_are_transient() {
        let error = MarkerError::DiagnosticsUnavailable { attempts: 3 };
        assert_eq!(error.class(), ErrorClass::Transient);
    }
}
