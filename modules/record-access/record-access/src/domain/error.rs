use recordkit_schema::{SchemaError, ValidationError};
use thiserror::Error;

/// Request-time failures of a record endpoint.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Query or body rejected by a compiled validator.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No security model granted the operation, or the record exists but is hidden.
    #[error("Access denied")]
    Forbidden,

    /// The record does not exist (or is invisible without leaking existence).
    #[error("Record not found")]
    NotFound,

    /// The persistence engine failed.
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccessError {
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Client-safe message; internal details stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(_) | Self::Forbidden | Self::NotFound => self.to_string(),
            Self::Store(_) | Self::Internal(_) => "Internal error".to_owned(),
        }
    }
}

/// Authenticator failures. Never surfaced by the chain; a failed
/// resolution only makes auth-requiring models non-matching.
#[derive(Error, Debug)]
pub enum AuthnError {
    /// Missing, invalid or unknown credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Wiring failures, fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("record type `{record_type}`: {source}")]
    Schema {
        record_type: String,
        #[source]
        source: SchemaError,
    },

    #[error("record type `{0}` is registered twice")]
    DuplicateRecordType(String),

    #[error("record type `{0}` is not registered")]
    UnknownRecordType(String),

    #[error("record type `{record_type}` is already mounted at `{path}`")]
    DuplicateMount { record_type: String, path: String },

    #[error("mount of `{record_type}` has no security models")]
    NoModels { record_type: String },

    #[error("record type `{record_type}` lacks the `{field}` field required for layer `{layer}`")]
    MissingLayerField {
        record_type: String,
        layer: String,
        field: String,
    },

    #[error("security model for `{model_record_type}` mounted on record type `{record_type}`")]
    ModelRecordTypeMismatch {
        record_type: String,
        model_record_type: String,
    },

    #[error("role membership layer `{layer}` is not on the mount path of `{record_type}`")]
    LayerNotOnPath { record_type: String, layer: String },

    #[error("ownership field `{field}` is missing from record type `{record_type}`")]
    MissingOwnerField { record_type: String, field: String },

    #[error("record type `{record_type}` must declare `{field}` to back role lookups")]
    MissingRoleMetadata { record_type: String, field: String },

    #[error("store failed to prepare `{record_type}`: {message}")]
    Store {
        record_type: String,
        message: String,
    },
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_public() {
        let err = AccessError::Store(anyhow::anyhow!("connection reset by peer"));
        assert_eq!(err.public_message(), "Internal error");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn validation_message_lists_issues() {
        let err = AccessError::from(ValidationError::single("limit", "expected an integer >= 1"));
        assert!(err.public_message().contains("limit: expected an integer >= 1"));
    }
}
