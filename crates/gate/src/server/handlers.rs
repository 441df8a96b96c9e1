//! Axum request handlers for all service endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    DecryptTokenRequest, DecryptTokenResponse, EncryptTokenRequest, EncryptTokenResponse,
    ErrorResponse, HealthResponse, ValidateEmbedRequest, ValidateEmbedResponse,
};
use common::ServiceError;
use tracing::warn;

use super::state::AppState;
use crate::crypto::{CipherError, TokenCipher};
use crate::embed::RejectionReason;
use crate::keys::KeyError;

/// Handler error: a [`ServiceError`] rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<RejectionReason> for ApiError {
    fn from(reason: RejectionReason) -> Self {
        Self(ServiceError::rejected(reason.code(), reason.to_string()))
    }
}

impl From<CipherError> for ApiError {
    fn from(err: CipherError) -> Self {
        Self(match err {
            CipherError::KeyMismatch { .. } => ServiceError::KeyMismatch(err.to_string()),
            CipherError::AuthenticationFailed => {
                ServiceError::rejected("authentication_failed", err.to_string())
            }
            CipherError::InvalidFormat => ServiceError::rejected("invalid_format", err.to_string()),
            CipherError::EncryptionFailed => ServiceError::EncryptionFailure(err.to_string()),
        })
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        warn!(error = %err, "data key unavailable");
        Self(ServiceError::Unavailable("data key unavailable".into()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

/// Unwrap a JSON body, keeping axum's 413 for oversized bodies.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            let err = ErrorResponse::new("payload_too_large", rejection.body_text());
            Err((StatusCode::PAYLOAD_TOO_LARGE, Json(err)).into_response())
        }
        Err(rejection) => Err(ApiError::from(rejection).into_response()),
    }
}

/// `POST /v1/embeds/validate`: accept or reject third-party embed markup.
///
/// Returns the trimmed markup on success, or `422` with the rejection reason
/// as the error code.
pub async fn validate_embed(
    State(state): State<AppState>,
    body: Result<Json<ValidateEmbedRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match state.embed.validate(&req.html) {
        Ok(html) => (StatusCode::OK, Json(ValidateEmbedResponse { html })).into_response(),
        Err(reason) => ApiError::from(reason).into_response(),
    }
}

/// `POST /v1/tokens/encrypt`: seal an OAuth token under the current data key.
///
/// Returns `503` if the data key cannot be resolved.
pub async fn encrypt_token(
    State(state): State<AppState>,
    body: Result<Json<EncryptTokenRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match seal(&state, &req.plaintext).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn seal(state: &AppState, plaintext: &str) -> Result<EncryptTokenResponse, ApiError> {
    let material = state.keys.resolve().await?;
    let cipher = TokenCipher::new(&material);
    let secret = cipher.encrypt(plaintext)?;
    Ok(EncryptTokenResponse {
        key_id: cipher.key_id().to_owned(),
        secret,
    })
}

/// `POST /v1/tokens/decrypt`: open a previously sealed token.
///
/// Returns `409` if `keyId` names a different key than the one held, and `422`
/// if the secret fails authentication or is malformed.
pub async fn decrypt_token(
    State(state): State<AppState>,
    body: Result<Json<DecryptTokenRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match open(&state, &req).await {
        Ok(plaintext) => (StatusCode::OK, Json(DecryptTokenResponse { plaintext })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn open(state: &AppState, req: &DecryptTokenRequest) -> Result<String, ApiError> {
    let material = state.keys.resolve().await?;
    let plaintext = TokenCipher::new(&material).decrypt(&req.secret, req.key_id.as_deref())?;
    Ok(plaintext)
}

/// `GET /health`: readiness check.
///
/// Returns `200 OK` when the data key is cached, `503 Service Unavailable`
/// otherwise. Never triggers key resolution.
pub async fn health(State(state): State<AppState>) -> Response {
    let cached = state.keys.cached();

    let (status_code, status_str) = if cached.is_some() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        key_ready: cached.is_some(),
        key_id: cached.map(|m| m.key_id().to_owned()),
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
