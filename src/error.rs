use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Service-wide error taxonomy.
///
/// The full variant is kept for logging and tests; the client-visible
/// response deliberately collapses the token-validation kinds into one
/// undifferentiated message so callers cannot probe which check failed.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("subject contains reserved delimiter")]
    MalformedSubject,
    #[error("malformed token")]
    MalformedToken,
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token expired")]
    TokenExpired,
    #[error("token kind mismatch")]
    KindMismatch,
    #[error("unknown or expired login state")]
    UnknownCorrelationState,
    #[error("provider code exchange failed: {0}")]
    ProviderExchangeFailed(String),
    #[error("provider profile invalid: {0}")]
    ProviderProfileInvalid(String),
    #[error("account is blocked")]
    AccountBlocked,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "request failed");

        let (status, error_message) = match self {
            AuthError::MalformedSubject
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::KindMismatch => (StatusCode::BAD_REQUEST, "invalid or expired token"),
            AuthError::UnknownCorrelationState => {
                (StatusCode::BAD_REQUEST, "unknown or expired login state")
            }
            AuthError::ProviderExchangeFailed(_) | AuthError::ProviderProfileInvalid(_) => {
                (StatusCode::BAD_GATEWAY, "identity provider error")
            }
            AuthError::AccountBlocked => {
                (StatusCode::INTERNAL_SERVER_ERROR, "account is blocked")
            }
            AuthError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad request"),
            AuthError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration error"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
