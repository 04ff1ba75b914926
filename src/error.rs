//! Error types for the bridge and its remote transport.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::RecordId;

/// Field-path keyed validation messages (`"partner_id.name" -> ["required field"]`).
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors raised by a remote object service or the transport reaching it.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote service rejected or failed the call.
    #[error("remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[cfg(feature = "remote")]
    #[error("failed to reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The reply could not be decoded into the expected shape.
    #[error("unexpected reply from remote: {message}")]
    Protocol { message: String },

    #[error("authentication failed for user '{user}' on database '{database}'")]
    AuthenticationFailed { user: String, database: String },
}

impl RemoteError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        RemoteError::Protocol {
            message: message.into(),
        }
    }
}

/// Errors loading a JSON document for the CLI.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. } | Self::ReadError { .. } => 3,
            Self::InvalidJson { .. } => 2,
        }
    }
}

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Document did not match the synthesized schema. Never reaches the remote.
    #[error("validation failed with {} error(s)", errors.len())]
    Validation { errors: FieldErrors },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{model} record {id} not found")]
    NotFound { model: String, id: RecordId },

    #[error("malformed filter: {message}")]
    MalformedFilter { message: String },

    /// A search or count call failed. Remote detail is deliberately dropped.
    #[error("search on {model} failed")]
    SearchFailed { model: String },

    /// A document value cannot be mapped onto the remote field it targets.
    #[error("invalid document at {path}: {message}")]
    InvalidDocument { path: String, message: String },

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
}

impl BridgeError {
    pub(crate) fn invalid_document(path: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::InvalidDocument {
            path: path.into(),
            message: message.into(),
        }
    }

    /// HTTP status the boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Validation { .. }
            | BridgeError::MalformedFilter { .. }
            | BridgeError::SearchFailed { .. }
            | BridgeError::InvalidDocument { .. } => 422,
            BridgeError::NotFound { .. } => 404,
            BridgeError::Remote(_) | BridgeError::InvalidSchema { .. } => 500,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Validation { .. }
            | BridgeError::NotFound { .. }
            | BridgeError::InvalidDocument { .. } => 1,
            BridgeError::MalformedFilter { .. } | BridgeError::InvalidSchema { .. } => 2,
            BridgeError::Remote(_) | BridgeError::SearchFailed { .. } => 3,
        }
    }

    /// Per-field messages carried by the error, if any.
    pub fn field_errors(&self) -> FieldErrors {
        match self {
            BridgeError::Validation { errors } => errors.clone(),
            BridgeError::MalformedFilter { message } => {
                BTreeMap::from([("filter".to_string(), vec![message.clone()])])
            }
            BridgeError::InvalidDocument { path, message } => {
                BTreeMap::from([(path.clone(), vec![message.clone()])])
            }
            _ => FieldErrors::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let err = BridgeError::Validation {
            errors: FieldErrors::new(),
        };
        assert_eq!(err.status_code(), 422);

        let err = BridgeError::NotFound {
            model: "res.partner".into(),
            id: 3,
        };
        assert_eq!(err.status_code(), 404);

        let err = BridgeError::Remote(RemoteError::Fault {
            code: 1,
            message: "boom".into(),
        });
        assert_eq!(err.status_code(), 500);

        let err = BridgeError::SearchFailed {
            model: "res.partner".into(),
        };
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn exit_codes() {
        let err = BridgeError::MalformedFilter {
            message: "unexpected end".into(),
        };
        assert_eq!(err.exit_code(), 2);

        let err = BridgeError::Remote(RemoteError::protocol("no result"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn search_failure_hides_remote_detail() {
        let err = BridgeError::SearchFailed {
            model: "sale.order".into(),
        };
        assert_eq!(err.to_string(), "search on sale.order failed");
        assert!(err.field_errors().is_empty());
    }

    #[test]
    fn malformed_filter_reports_under_filter_key() {
        let err = BridgeError::MalformedFilter {
            message: "expected ']'".into(),
        };
        let errors = err.field_errors();
        assert_eq!(errors["filter"], vec!["expected ']'".to_string()]);
    }
}
