//! Error types for the persistence core.
//!
//! Every layer below the repository surfaces a [`StoreError`]. The snapshot
//! store absorbs errors on load, and the repository absorbs errors on save;
//! everything else is propagated to the caller unchanged.

use thiserror::Error;

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the secure persistence layers.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum StoreError {
    /// Secure storage refused access, or the key could not be created or read.
    #[error("key unavailable: {reason}")]
    KeyUnavailable {
        /// Description of the failure.
        reason: String,
    },

    /// The authentication tag did not verify (tampered blob, wrong key or
    /// mismatched associated data). Never retried.
    #[error("authentication failed: {context}")]
    AuthenticationFailed {
        /// What was being opened.
        context: String,
    },

    /// A blob or a domain entity does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Identifies the missing item.
        what: String,
    },

    /// Image or JSON encoding failed.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// The operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A logical path escapes the store root or is otherwise malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending logical path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An argument failed validation.
    #[error("invalid input '{parameter}': {reason}")]
    InvalidInput {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of the issue.
        reason: String,
    },
}

impl StoreError {
    /// Creates a key unavailable error.
    pub fn key_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::KeyUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates an authentication failure.
    pub fn authentication<S: Into<String>>(context: S) -> Self {
        Self::AuthenticationFailed {
            context: context.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an encode error.
    pub fn encode<S: Into<String>>(message: S) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates an I/O error with context.
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input<P: Into<String>, R: Into<String>>(parameter: P, reason: R) -> Self {
        Self::InvalidInput {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`StoreError::AuthenticationFailed`].
    #[must_use]
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::encode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::key_unavailable("device locked");
        assert_eq!(err.to_string(), "key unavailable: device locked");

        let err = StoreError::io(
            "reading 'db.json'",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("I/O error during reading 'db.json'"));

        let err = StoreError::invalid_path("../x", "parent traversal");
        assert!(err.to_string().contains("parent traversal"));
    }

    #[test]
    fn test_io_error_exposes_source() {
        use std::error::Error as _;

        let err = StoreError::io("writing", std::io::Error::other("disk full"));
        assert!(err.source().is_some());
        assert!(StoreError::not_found("x").source().is_none());
    }

    #[test]
    fn test_classification_helpers() {
        assert!(StoreError::not_found("blob").is_not_found());
        assert!(!StoreError::not_found("blob").is_authentication_failure());
        assert!(StoreError::authentication("blob").is_authentication_failure());
    }

    #[test]
    fn test_json_error_maps_to_encode() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Encode { .. }));
    }
}
