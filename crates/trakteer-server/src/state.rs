//! Shared application state.
//!
//! The composition root: builds the token service, token cache and session
//! service from configuration over the given stores. Every handler and the
//! identity middleware receive their collaborators from here.

use std::sync::Arc;

use trakteer_auth::{
    AuthConfig, AuthResult, AuthState, FederatedTokenValidator, HttpCertificateProvider,
    SessionService, SessionTokenService, TokenCache, TokenStorage, UserStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub sessions: Arc<SessionService>,
    pub cache: Arc<TokenCache>,
}

impl AppState {
    /// Wires the auth components over `token_storage` and `user_storage`.
    ///
    /// The cache is created empty; call [`TokenCache::init`] before serving.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the federation certificate endpoint is
    /// unusable.
    pub fn new(
        config: &AuthConfig,
        token_storage: Arc<dyn TokenStorage>,
        user_storage: Arc<dyn UserStorage>,
    ) -> AuthResult<Self> {
        let tokens = Arc::new(SessionTokenService::from_config(&config.session));
        let cache = Arc::new(TokenCache::new(token_storage.clone()));

        let mut sessions = SessionService::new(
            tokens.clone(),
            cache.clone(),
            token_storage.clone(),
            user_storage.clone(),
        )
        .with_default_role(&config.session.default_role);

        if config.federation.enabled {
            let certificates = HttpCertificateProvider::from_config(&config.federation)?;
            let validator =
                FederatedTokenValidator::from_config(Arc::new(certificates), &config.federation);
            sessions = sessions.with_federation(Arc::new(validator));
            tracing::info!(
                client_id = %config.federation.client_id,
                certs_url = %config.federation.certs_url,
                "Federated login enabled"
            );
        }

        Ok(Self {
            auth: AuthState::new(tokens, cache.clone(), token_storage, user_storage),
            sessions: Arc::new(sessions),
            cache,
        })
    }
}
