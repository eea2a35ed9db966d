use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use trakteer_auth::middleware::error_response;
use trakteer_auth::{AuthError, RequireActivated, RequireAuthenticated};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Ready once the token cache has loaded, and until it is declared too old.
pub async fn readyz(State(state): State<AppState>) -> Response {
    if !state.cache.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
            }),
        )
            .into_response();
    }

    let last_loaded_at = state
        .cache
        .last_loaded_at()
        .await
        .and_then(|t| t.format(&Rfc3339).ok());
    let body = json!({
        "status": "ready",
        "cached_tokens": state.cache.len().await,
        "last_loaded_at": last_loaded_at,
    });
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state
        .sessions
        .register(&request.email, &request.password, request.name.trim())
        .await
    {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.sessions.login(&request.email, &request.password).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    /// Google ID token.
    pub token: String,
}

pub async fn google_login(
    State(state): State<AppState>,
    payload: Result<Json<GoogleLoginRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    if request.token.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "token must be provided");
    }

    match state.sessions.federated_login(&request.token).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(AuthError::Configuration { .. }) if !state.sessions.federation_enabled() => {
            error_response(StatusCode::NOT_FOUND, "federated login is not enabled")
        }
        Err(e) => e.into_response(),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    RequireAuthenticated(user): RequireAuthenticated,
) -> Result<impl IntoResponse, AuthError> {
    state.sessions.end_session(&user.email).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "message": "you have been logged out" })),
    ))
}

pub async fn me(RequireActivated(user): RequireActivated) -> impl IntoResponse {
    Json(json!({ "user": user }))
}
