//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::KeyMismatch`] → 409
/// - [`ServiceError::Rejected`] → 422
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: invalid JSON or a missing field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The input was well-formed but failed a trust-boundary check.
    ///
    /// `code` is a stable, machine-readable reason such as `"untrusted_url"`.
    #[error("{message}")]
    Rejected { code: String, message: String },

    /// A ciphertext was presented under a key id this service does not hold.
    #[error("key mismatch: {0}")]
    KeyMismatch(String),

    /// Encryption failed due to a crypto-layer error.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The data key is not yet resolved or is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Build a [`ServiceError::Rejected`] from a reason code and message.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::KeyMismatch(_) => 409,
            ServiceError::Rejected { .. } => 422,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
        }
    }

    /// Short machine-readable code placed in the error response body.
    pub fn code(&self) -> &str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Rejected { code, .. } => code,
            ServiceError::KeyMismatch(_) => "key_mismatch",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::Unavailable(_) => "service_unavailable",
        }
    }
}
