//! Error types for the registry synchronization engine
//!
//! Two layers: [`EppError`] classifies protocol failures raised by gateway
//! calls, and [`Error`] is the crate-wide type every component returns.
//! Retry policy lives in the synchronizer, which consults
//! [`Error::is_retryable`]; the gateway only reports what happened.

use thiserror::Error;

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, Error>;

/// EPP result code for "object does not exist" (RFC 5730).
///
/// Doubles as the absence signal: an `info` call failing with this code is
/// how the registry reports that a domain is gone.
pub const OBJECT_DOES_NOT_EXIST: u16 = 2303;

/// EPP result codes treated as transient and therefore eligible for retry:
/// 2400 command failed, 2500 command failed with connection close,
/// 2502 session limit exceeded.
pub const TRANSIENT_CODES: [u16; 3] = [2400, 2500, 2502];

/// Protocol-level failure raised by a gateway call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EppError {
    /// Remote registry returned a structured failure; the code drives retry policy
    #[error("registry response failed (code {code}): {message}")]
    ResponseFailed {
        /// EPP result code from the registry
        code: u16,
        /// Human-readable message from the registry
        message: String,
    },

    /// Malformed or unparseable reply; never retried automatically
    #[error("bad registry response: {0}")]
    BadResponse(String),

    /// Operation rejected by business rules on the remote side; not retried
    #[error("registry command failed: {0}")]
    CommandFailed(String),

    /// Locally-detected malformed request that was never sent
    #[error("invalid command: {0}")]
    CommandInvalid(String),
}

impl EppError {
    /// Create a structured registry failure
    pub fn response_failed(code: u16, message: impl Into<String>) -> Self {
        Self::ResponseFailed {
            code,
            message: message.into(),
        }
    }

    /// Create a bad-response error
    pub fn bad_response(msg: impl Into<String>) -> Self {
        Self::BadResponse(msg.into())
    }

    /// Create a command-failed error
    pub fn command_failed(msg: impl Into<String>) -> Self {
        Self::CommandFailed(msg.into())
    }

    /// Create a command-invalid error
    pub fn command_invalid(msg: impl Into<String>) -> Self {
        Self::CommandInvalid(msg.into())
    }

    /// The canonical "object does not exist" failure
    pub fn object_does_not_exist(name: &str) -> Self {
        Self::ResponseFailed {
            code: OBJECT_DOES_NOT_EXIST,
            message: format!("object does not exist: {}", name),
        }
    }

    /// Whether this failure is transient and may be retried
    ///
    /// Only `ResponseFailed` with a code in [`TRANSIENT_CODES`] qualifies.
    /// Everything else either indicates a permanent condition or a bug.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ResponseFailed { code, .. } if TRANSIENT_CODES.contains(code))
    }

    /// Whether this failure means the queried object is absent from the registry
    pub fn is_object_missing(&self) -> bool {
        matches!(self, Self::ResponseFailed { code, .. } if *code == OBJECT_DOES_NOT_EXIST)
    }
}

/// Core error type for the synchronization engine
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol failure from the gateway
    #[error(transparent)]
    Epp(#[from] EppError),

    /// Domain name does not match any supported zone
    #[error("unsupported zone for domain: {domain}")]
    UnsupportedZone {
        /// The offending domain name
        domain: String,
    },

    /// Domain name failed validation
    #[error("invalid domain name '{domain}': {reason}")]
    InvalidDomainName {
        /// The offending domain name
        domain: String,
        /// Which rule it broke
        reason: String,
    },

    /// Remote registrant differs from the local owner and the caller did not
    /// authorize an ownership change
    #[error("ownership change denied for {domain}: local owner {current}, remote registrant {remote}")]
    OwnershipChangeDenied {
        /// Domain being synchronized
        domain: String,
        /// Current local owner email
        current: String,
        /// Owner email the registry reports
        remote: String,
    },

    /// Remote registrant has no local account and the caller did not
    /// authorize creating one
    #[error("no local account for owner {email} of {domain} and creation not authorized")]
    UnknownOwner {
        /// Domain being synchronized
        domain: String,
        /// Owner email the registry reports
        email: String,
    },

    /// Registry reported a different registry id than the one already assigned
    #[error("registry id mismatch for {domain}: local {local}, remote {remote}")]
    RegistryIdMismatch {
        /// Domain being synchronized
        domain: String,
        /// Registry id on the local row
        local: String,
        /// Registry id the registry reports
        remote: String,
    },

    /// Referenced renew row does not exist
    #[error("backend renew not found: {0}")]
    RenewNotFound(u64),

    /// Refused a local status write that would regress the lifecycle
    /// of a registered domain
    #[error("status regression refused for {domain}: {from} -> {to}")]
    StatusRegression {
        /// Domain whose status was being written
        domain: String,
        /// Status currently on the row
        from: String,
        /// Status the caller tried to write
        to: String,
    },

    /// Storage-related errors
    #[error("store error: {0}")]
    Store(String),

    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Bulk import errors
    #[error("import error: {0}")]
    Import(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything that does not fit the variants above
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an import error
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Whether the synchronizer may retry the failed remote call
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Epp(e) if e.is_transient())
    }

    /// Whether this condition indicates possible data-integrity risk
    ///
    /// Integrity errors propagate regardless of the caller's `raise_errors`
    /// flag: silently absorbing them could let a wrong account take
    /// ownership of a domain or write state for a name we should not touch.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedZone { .. }
                | Self::InvalidDomainName { .. }
                | Self::OwnershipChangeDenied { .. }
                | Self::UnknownOwner { .. }
                | Self::RegistryIdMismatch { .. }
        )
    }
}

/// Collapse an anyhow chain into a single `Other` message
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_are_retryable() {
        for code in TRANSIENT_CODES {
            let err = Error::from(EppError::response_failed(code, "busy"));
            assert!(err.is_retryable(), "code {} should be retryable", code);
        }
    }

    #[test]
    fn object_missing_is_not_retryable() {
        let epp = EppError::object_does_not_exist("example.com");
        assert!(epp.is_object_missing());
        assert!(!epp.is_transient());
        assert!(!Error::from(epp).is_retryable());
    }

    #[test]
    fn non_response_kinds_never_retry() {
        for epp in [
            EppError::bad_response("truncated"),
            EppError::command_failed("not eligible for renewal"),
            EppError::command_invalid("empty domain name"),
        ] {
            assert!(!epp.is_transient());
            assert!(!Error::from(epp).is_retryable());
        }
    }

    #[test]
    fn integrity_errors_are_flagged() {
        let err = Error::OwnershipChangeDenied {
            domain: "example.com".to_string(),
            current: "a@x.test".to_string(),
            remote: "b@x.test".to_string(),
        };
        assert!(err.is_integrity());
        assert!(!err.is_retryable());

        assert!(!Error::store("disk full").is_integrity());
    }
}
