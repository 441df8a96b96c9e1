//! Request and response types exchanged with callers of the trust gate.
//!
//! These types are serialised as JSON over the HTTP API. [`EncryptedSecret`]
//! is also the at-rest shape persisted by the storage layer.

use serde::{Deserialize, Serialize};

use crate::ServiceError;

// ---------------------------------------------------------------------------
// Encrypted secret wire format
// ---------------------------------------------------------------------------

/// An AEAD-encrypted credential, as persisted and transported.
///
/// Every field is standard base64. `iv` decodes to 12 bytes and `authTag` to
/// 16 bytes. The key id is tracked alongside the record, not inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSecret {
    /// Encrypted payload, same length as the plaintext.
    pub ciphertext: String,
    /// 96-bit nonce, unique per encryption call.
    pub iv: String,
    /// 128-bit authentication tag produced by the cipher.
    pub auth_tag: String,
}

// ---------------------------------------------------------------------------
// Embed validation endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/embeds/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateEmbedRequest {
    /// Raw embed markup as delivered by the platform.
    pub html: String,
}

/// Successful response body for `POST /v1/embeds/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateEmbedResponse {
    /// The accepted markup, trimmed but otherwise unchanged.
    pub html: String,
}

// ---------------------------------------------------------------------------
// Token endpoints
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/tokens/encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptTokenRequest {
    pub plaintext: String,
}

/// Successful response body for `POST /v1/tokens/encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptTokenResponse {
    /// Identifier of the key the secret was sealed under. Callers persist it
    /// next to the secret and pass it back on decrypt.
    pub key_id: String,
    pub secret: EncryptedSecret,
}

/// Request body for `POST /v1/tokens/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptTokenRequest {
    pub secret: EncryptedSecret,
    /// Key id recorded when the secret was created, if known.
    #[serde(default)]
    pub key_id: Option<String>,
}

/// Successful response body for `POST /v1/tokens/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptTokenResponse {
    pub plaintext: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"untrusted_url"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the data key is currently resolved and cached.
    pub key_ready: bool,
    /// Identifier of the cached key, when ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}
