//! Identity resolution middleware and gate extractors.
//!
//! [`resolve_identity`] runs for every request. It resolves the caller from
//! the `Authorization` header and stores an [`Identity`] in the request
//! extensions:
//!
//! 1. No header, or an empty one: [`Identity::Anonymous`].
//! 2. A header that is not exactly `Bearer <token>`: rejected.
//! 3. The token must verify and carry a subject identity.
//! 4. The token must be the identity's live session, per the token cache or,
//!    on a cache miss, the token store.
//! 5. The identity must name an existing user.
//!
//! Handlers then gate on the identity with [`RequireAuthenticated`] or
//! [`RequireActivated`].
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use trakteer_auth::middleware::{AuthState, RequireActivated, resolve_identity};
//!
//! async fn me(RequireActivated(user): RequireActivated) -> String {
//!     user.email
//! }
//!
//! let app = Router::new()
//!     .route("/v1/me", get(me))
//!     .layer(middleware::from_fn_with_state(auth_state, resolve_identity));
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, VARY},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::types::Identity;
use crate::AuthResult;
use crate::cache::TokenCache;
use crate::error::AuthError;
use crate::storage::{TokenStorage, User, UserStorage};
use crate::token::SessionTokenService;

// =============================================================================
// Auth State
// =============================================================================

/// Collaborators needed to resolve request identities.
#[derive(Clone)]
pub struct AuthState {
    /// Session token verifier.
    pub tokens: Arc<SessionTokenService>,

    /// Live-session cache consulted on every authenticated request.
    pub cache: Arc<TokenCache>,

    /// Token store consulted on cache misses.
    pub token_storage: Arc<dyn TokenStorage>,

    /// User lookup.
    pub user_storage: Arc<dyn UserStorage>,
}

impl AuthState {
    /// Creates a new auth state.
    pub fn new(
        tokens: Arc<SessionTokenService>,
        cache: Arc<TokenCache>,
        token_storage: Arc<dyn TokenStorage>,
        user_storage: Arc<dyn UserStorage>,
    ) -> Self {
        Self {
            tokens,
            cache,
            token_storage,
            user_storage,
        }
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Resolves the caller and stores an [`Identity`] in the request extensions.
///
/// Requests with an unusable credential are rejected here; no downstream
/// handler runs for them. Every response varies on `Authorization`.
pub async fn resolve_identity(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let mut response = match resolve(&state, req.headers()).await {
        Ok(identity) => {
            if let Identity::User(user) = &identity {
                tracing::debug!(identity = %user.email, "Request authenticated");
            }
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.uri().path(), error = %e, "Identity resolution failed");
            e.into_response()
        }
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Resolves the identity for a set of request headers.
///
/// # Errors
///
/// Returns `InvalidAuthenticationToken` for a malformed header, a token error
/// for an unusable token, `TokenRevoked` if the token is not the identity's
/// live session, and `CacheUnavailable` if the cache has been declared
/// unusable.
pub async fn resolve(state: &AuthState, headers: &HeaderMap) -> AuthResult<Identity> {
    let header = match headers.get(AUTHORIZATION) {
        Some(header) if !header.is_empty() => header,
        _ => return Ok(Identity::Anonymous),
    };
    let token = bearer_token(
        header
            .to_str()
            .map_err(|_| AuthError::invalid_authentication_token("non-ASCII header"))?,
    )?;

    let identity = state.tokens.extract_identity(token)?;

    ensure_live_session(state, &identity, token).await?;

    let user = state
        .user_storage
        .find_by_email(&identity)
        .await?
        .ok_or_else(|| AuthError::invalid_token("token subject is not a known user"))?;

    Ok(Identity::User(user))
}

/// Parses `Bearer <token>`: the scheme and a non-empty token separated by a
/// single space.
fn bearer_token(header: &str) -> AuthResult<&str> {
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::invalid_authentication_token(
            "expected 'Bearer <token>'",
        )),
    }
}

async fn ensure_live_session(state: &AuthState, identity: &str, token: &str) -> AuthResult<()> {
    if !state.cache.is_ready() {
        return Err(AuthError::cache_unavailable(
            "token cache is not serving lookups",
        ));
    }
    if state.cache.matches(identity, token).await {
        return Ok(());
    }

    // Issued by another instance since the last reload, or revoked.
    let version = state.cache.version().await;
    match state.token_storage.fetch_one(identity).await? {
        Some(record) if record.token == token => {
            // A login or logout during the lookup makes the record stale.
            if !state.cache.add_if_unchanged(identity, token, version).await {
                tracing::debug!(identity = %identity, "Cache changed during store lookup, not caching");
            }
            Ok(())
        }
        _ => {
            tracing::debug!(identity = %identity, "Token is not the live session");
            Err(AuthError::TokenRevoked)
        }
    }
}

// =============================================================================
// Extractors
// =============================================================================

fn identity_from_parts(parts: &Parts) -> AuthResult<Identity> {
    parts
        .extensions
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| AuthError::internal("identity resolver is not installed"))
}

/// The resolved identity of the request, anonymous or not.
pub struct CurrentIdentity(pub Identity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts).map(CurrentIdentity)
    }
}

/// Gate: the request must carry a resolved user.
///
/// Rejects anonymous requests with `Unauthorized`.
pub struct RequireAuthenticated(pub User);

impl<S> FromRequestParts<S> for RequireAuthenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts)?
            .into_user()
            .map(RequireAuthenticated)
            .ok_or_else(|| AuthError::unauthorized("anonymous request"))
    }
}

/// Gate: the request must carry a resolved, activated user.
///
/// Rejects anonymous requests with `Unauthorized` and inactive users with
/// `Forbidden`.
pub struct RequireActivated(pub User);

impl<S> FromRequestParts<S> for RequireActivated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuthenticated(user) = RequireAuthenticated::from_request_parts(parts, state).await?;
        if !user.is_activated() {
            return Err(AuthError::forbidden(format!(
                "user {} is not activated",
                user.email
            )));
        }
        Ok(RequireActivated(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionService;
    use crate::storage::TokenRecord;
    use crate::testing::{MockTokenStorage, MockUserStorage};
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    struct Fixture {
        state: AuthState,
        token_storage: Arc<MockTokenStorage>,
    }

    async fn fixture(users: MockUserStorage) -> Fixture {
        let token_storage = Arc::new(MockTokenStorage::default());
        let cache = Arc::new(TokenCache::new(token_storage.clone()));
        cache.reload().await.unwrap();
        let state = AuthState::new(
            Arc::new(SessionTokenService::new(
                SECRET,
                "trakteer",
                Duration::from_secs(3600),
            )),
            cache,
            token_storage.clone(),
            Arc::new(users),
        );
        Fixture {
            state,
            token_storage,
        }
    }

    impl Fixture {
        /// Issues a token for `identity` and stores it without touching the cache.
        async fn store_token(&self, identity: &str) -> String {
            let issued = self.state.tokens.issue(identity, "user").unwrap();
            self.token_storage
                .upsert(TokenRecord {
                    identity: identity.to_string(),
                    token: issued.token.clone(),
                    role: "user".to_string(),
                    issued_at: issued.issued_at,
                    expires_at: issued.expires_at,
                })
                .await
                .unwrap();
            issued.token
        }

        async fn login(&self, identity: &str) -> String {
            let token = self.store_token(identity).await;
            self.state.cache.add(identity, &token).await;
            token
        }

        fn app(&self) -> Router {
            async fn whoami(CurrentIdentity(identity): CurrentIdentity) -> String {
                match identity {
                    Identity::Anonymous => "anonymous".to_string(),
                    Identity::User(user) => user.email,
                }
            }
            async fn authed(RequireAuthenticated(user): RequireAuthenticated) -> String {
                user.email
            }
            async fn activated(RequireActivated(user): RequireActivated) -> String {
                user.email
            }

            Router::new()
                .route("/whoami", get(whoami))
                .route("/authed", get(authed))
                .route("/activated", get(activated))
                .layer(axum::middleware::from_fn_with_state(
                    self.state.clone(),
                    resolve_identity,
                ))
        }

        async fn call(&self, path: &str, authorization: Option<&str>) -> (StatusCode, String) {
            let mut request = HttpRequest::builder().uri(path);
            if let Some(value) = authorization {
                request = request.header(AUTHORIZATION, value);
            }
            let response = self
                .app()
                .oneshot(request.body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.headers()[VARY], "Authorization");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8(bytes.to_vec()).unwrap())
        }
    }

    #[tokio::test]
    async fn test_no_header_is_anonymous() {
        let fx = fixture(MockUserStorage::default()).await;

        let (status, body) = fx.call("/whoami", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_malformed_headers_rejected() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let token = fx.login("a@b.com").await;

        for header in [
            format!("Basic {token}"),
            token.clone(),
            format!("Bearer {token} extra"),
            format!("Bearer  {token}"),
            format!("Bearer\t{token}"),
            "Bearer".to_string(),
            "Bearer ".to_string(),
            format!("bearer {token}"),
        ] {
            let (status, body) = fx.call("/whoami", Some(&header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header: {header}");
            assert!(body.contains("invalid or missing authentication token"));
        }
    }

    #[tokio::test]
    async fn test_empty_header_is_anonymous() {
        let fx = fixture(MockUserStorage::default()).await;

        let (status, body) = fx.call("/whoami", Some("")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_live_token_resolves_user() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let token = fx.login("a@b.com").await;

        let (status, body) = fx.call("/whoami", Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a@b.com");
        assert_eq!(fx.token_storage.fetch_one_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let fx = fixture(MockUserStorage::default()).await;

        let (status, _) = fx.call("/whoami", Some("Bearer not.a.jwt")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cache_miss_falls_back_to_store() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let token = fx.store_token("a@b.com").await;
        let header = format!("Bearer {token}");

        let (status, _) = fx.call("/whoami", Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.token_storage.fetch_one_calls.load(Ordering::SeqCst), 1);

        // The store hit was cached.
        assert!(fx.state.cache.matches("a@b.com", &token).await);
        let (status, _) = fx.call("/whoami", Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.token_storage.fetch_one_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_superseded_token_is_revoked() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let old = fx.login("a@b.com").await;
        let _new = fx.login("a@b.com").await;

        let (status, _) = fx.call("/whoami", Some(&format!("Bearer {old}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logged_out_token_is_revoked() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let token = fx.login("a@b.com").await;
        fx.token_storage.delete("a@b.com").await.unwrap();
        fx.state.cache.remove("a@b.com").await;

        let (status, _) = fx.call("/whoami", Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_during_store_lookup_stays_revoked() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let sessions = SessionService::new(
            fx.state.tokens.clone(),
            fx.state.cache.clone(),
            fx.state.token_storage.clone(),
            fx.state.user_storage.clone(),
        );
        let token = fx.store_token("a@b.com").await;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        fx.token_storage
            .gate_next_fetch_one(entered.clone(), release.clone());
        let in_flight = tokio::spawn({
            let state = fx.state.clone();
            let headers = headers.clone();
            async move { resolve(&state, &headers).await.map(|_| ()) }
        });

        // The lookup has read the live record; log out before it completes.
        entered.notified().await;
        assert!(sessions.end_session("a@b.com").await.unwrap());
        release.notify_one();
        in_flight.await.unwrap().unwrap();

        assert!(!fx.state.cache.contains("a@b.com").await);
        let err = resolve(&fx.state, &headers).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let fx = fixture(MockUserStorage::default()).await;
        let token = fx.login("ghost@b.com").await;

        let (status, _) = fx.call("/whoami", Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let token = fx.store_token("a@b.com").await;
        fx.token_storage.fail.store(true, Ordering::SeqCst);

        let (status, body) = fx.call("/whoami", Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("unreachable"));
    }

    #[tokio::test]
    async fn test_unavailable_cache_rejects_authenticated_requests() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", true)).await;
        let token = fx.login("a@b.com").await;
        fx.state.cache.mark_unavailable();

        let (status, _) = fx.call("/whoami", Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = fx.call("/whoami", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_require_authenticated_gate() {
        let fx = fixture(MockUserStorage::default().with_user("a@b.com", false)).await;
        let token = fx.login("a@b.com").await;

        let (status, body) = fx.call("/authed", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("you must be authenticated"));

        let (status, body) = fx.call("/authed", Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a@b.com");
    }

    #[tokio::test]
    async fn test_require_activated_gate() {
        let users = MockUserStorage::default()
            .with_user("active@b.com", true)
            .with_user("inactive@b.com", false);
        let fx = fixture(users).await;
        let active = fx.login("active@b.com").await;
        let inactive = fx.login("inactive@b.com").await;

        let (status, _) = fx.call("/activated", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = fx
            .call("/activated", Some(&format!("Bearer {inactive}")))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("must be activated"));

        let (status, body) = fx.call("/activated", Some(&format!("Bearer {active}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "active@b.com");
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_is_internal_error() {
        async fn authed(RequireAuthenticated(user): RequireAuthenticated) -> String {
            user.email
        }
        let app = Router::new().route("/authed", get(authed));

        let response = app
            .oneshot(HttpRequest::builder().uri("/authed").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert!(bearer_token("Bearer   abc").is_err());
        assert!(bearer_token("Bearer\tabc").is_err());
        assert!(bearer_token("Bearer ").is_err());
        assert!(bearer_token(" Bearer abc").is_err());
        assert!(bearer_token("Bearer").is_err());
        assert!(bearer_token("Token abc").is_err());
        assert!(bearer_token("Bearer a b").is_err());
        assert!(bearer_token("").is_err());
    }
}
