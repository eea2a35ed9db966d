//! HTTP responses for [`AuthError`].
//!
//! Errors render as `{"error": "<message>"}`. Credential failures share one
//! message so callers cannot tell which check failed; server-side failures
//! are logged and returned with a generic message.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

pub const INVALID_TOKEN_MESSAGE: &str = "invalid or missing authentication token";
pub const AUTHENTICATION_REQUIRED_MESSAGE: &str =
    "you must be authenticated to access this resource";
pub const ACTIVATION_REQUIRED_MESSAGE: &str =
    "your user account must be activated to access this resource";
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";
pub const IDENTITY_PROVIDER_MESSAGE: &str = "the identity provider could not be reached";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "invalid authentication credentials";

/// Builds a response with the `{"error": message}` envelope.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Request failed");
        } else {
            tracing::debug!(error = %self, category = %self.category(), "Request rejected");
        }

        let mut response = error_response(status, message);
        if self.is_token_error() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Returns the HTTP status and client-facing message for an error.
fn error_details(error: &AuthError) -> (StatusCode, String) {
    match error {
        AuthError::InvalidToken { .. }
        | AuthError::TokenExpired
        | AuthError::TokenRevoked
        | AuthError::InvalidAuthenticationToken { .. } => {
            (StatusCode::UNAUTHORIZED, INVALID_TOKEN_MESSAGE.to_string())
        }
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            INVALID_CREDENTIALS_MESSAGE.to_string(),
        ),
        AuthError::Validation { field, message } => {
            (StatusCode::UNPROCESSABLE_ENTITY, format!("{field} {message}"))
        }
        AuthError::Unauthorized { .. } => (
            StatusCode::UNAUTHORIZED,
            AUTHENTICATION_REQUIRED_MESSAGE.to_string(),
        ),
        AuthError::Forbidden { .. } => (
            StatusCode::FORBIDDEN,
            ACTIVATION_REQUIRED_MESSAGE.to_string(),
        ),
        AuthError::FederatedClaimsRejected { message } => {
            (StatusCode::UNAUTHORIZED, message.clone())
        }
        AuthError::IdentityProvider { .. } => (
            StatusCode::BAD_GATEWAY,
            IDENTITY_PROVIDER_MESSAGE.to_string(),
        ),
        AuthError::Storage { .. }
        | AuthError::CacheUnavailable { .. }
        | AuthError::Configuration { .. }
        | AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            SERVER_ERROR_MESSAGE.to_string(),
        ),
    }
}
