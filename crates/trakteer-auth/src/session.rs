//! Session lifecycle.
//!
//! [`SessionService`] ties the token issuer, the token store and the token
//! cache together: a login issues a token, persists it as the identity's live
//! session and makes it visible in the local cache; a logout deletes it from
//! both, after which the resolver rejects the old token as revoked.
//!
//! Users log in with an email and password ([`register`], [`login`]) or with
//! a federated identity token ([`federated_login`]). Both kinds of new user
//! start inactive with the default role.
//!
//! [`register`]: SessionService::register
//! [`login`]: SessionService::login
//! [`federated_login`]: SessionService::federated_login

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::cache::TokenCache;
use crate::credentials::{
    hash_password_blocking, validate_email, validate_new_password, validate_password,
    verify_password_blocking,
};
use crate::error::AuthError;
use crate::federation::FederatedTokenValidator;
use crate::storage::{NewUser, TokenRecord, TokenStorage, User, UserStorage};
use crate::token::SessionTokenService;

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    /// The session token to present as `Authorization: Bearer <token>`.
    pub token: String,

    /// When the token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// The logged-in user.
    pub user: User,
}

/// Starts and ends sessions.
pub struct SessionService {
    tokens: Arc<SessionTokenService>,
    cache: Arc<TokenCache>,
    token_storage: Arc<dyn TokenStorage>,
    user_storage: Arc<dyn UserStorage>,
    federation: Option<Arc<FederatedTokenValidator>>,
    default_role: String,
}

impl SessionService {
    /// Creates a session service without federated login.
    #[must_use]
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
            federation: None,
            default_role: String::new(),
        }
    }

    /// Enables federated login with `validator`.
    #[must_use]
    pub fn with_federation(mut self, validator: Arc<FederatedTokenValidator>) -> Self {
        self.federation = Some(validator);
        self
    }

    /// Sets the role given to newly registered and provisioned users.
    #[must_use]
    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = role.into();
        self
    }

    /// Returns `true` if federated login is enabled.
    #[must_use]
    pub fn federation_enabled(&self) -> bool {
        self.federation.is_some()
    }

    /// Issues a session token for `user` and records it as their live session.
    ///
    /// Any previous session of the same user stops resolving once the new
    /// token is stored.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if signing fails and `Storage` if the token cannot
    /// be persisted. Nothing is cached in either case.
    pub async fn start_session(&self, user: &User) -> AuthResult<IssuedSession> {
        let issued = self.tokens.issue(&user.email, &user.role)?;

        self.token_storage
            .upsert(TokenRecord {
                identity: user.email.clone(),
                token: issued.token.clone(),
                role: user.role.clone(),
                issued_at: issued.issued_at,
                expires_at: issued.expires_at,
            })
            .await?;
        self.cache.add(&user.email, &issued.token).await;

        tracing::info!(
            identity = %user.email,
            jti = %issued.claims.jti,
            "Session started"
        );

        Ok(IssuedSession {
            token: issued.token,
            expires_at: issued.expires_at,
            user: user.clone(),
        })
    }

    /// Creates a password account and starts its first session.
    ///
    /// The account is inactive and has the default role. `name` falls back to
    /// the email when empty.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed email, a password outside the
    /// accepted length, or an email that is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> AuthResult<IssuedSession> {
        validate_email(email)?;
        validate_new_password(password)?;

        if self.user_storage.find_by_email(email).await?.is_some() {
            return Err(email_taken());
        }

        let password_hash = hash_password_blocking(password.to_string()).await?;
        let new_user = NewUser {
            email: email.to_string(),
            name: if name.is_empty() { email } else { name }.to_string(),
            role: self.default_role.clone(),
            activated: false,
            password_hash: Some(password_hash),
        };

        let user = match self.user_storage.create(new_user).await {
            Ok(user) => user,
            // A concurrent registration may have taken the email.
            Err(e) => match self.user_storage.find_by_email(email).await? {
                Some(_) => return Err(email_taken()),
                None => return Err(e),
            },
        };
        tracing::info!(identity = %user.email, user_id = %user.id, "Registered user");

        self.start_session(&user).await
    }

    /// Logs in with an email and password.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed input and `InvalidCredentials` if
    /// the email is unknown, the account has no password, or the password
    /// does not match.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedSession> {
        validate_email(email)?;
        validate_password(password)?;

        let Some(user) = self.user_storage.find_by_email(email).await? else {
            tracing::debug!(identity = %email, "Login for unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.clone() else {
            tracing::debug!(identity = %email, "Login for user without a password");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password_blocking(password.to_string(), hash).await? {
            tracing::debug!(identity = %email, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        self.start_session(&user).await
    }

    /// Logs in with a federated identity token.
    ///
    /// The user is looked up by the token's email and provisioned, inactive
    /// and with the default role, if unknown.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if federated login is disabled,
    /// `FederatedClaimsRejected` if the token fails validation or has no
    /// email, and `IdentityProvider` if the provider's keys are unavailable.
    pub async fn federated_login(&self, id_token: &str) -> AuthResult<IssuedSession> {
        let validator = self
            .federation
            .as_ref()
            .ok_or_else(|| AuthError::configuration("federated login is not enabled"))?;

        let claims = validator.validate(id_token).await.map_err(|e| {
            tracing::debug!(error = %e, retryable = e.is_retryable(), "Federated token rejected");
            AuthError::from(e)
        })?;

        if validate_email(&claims.email).is_err() {
            return Err(AuthError::federated_claims_rejected(
                "federated token carries no valid email",
            ));
        }

        let user = match self.user_storage.find_by_email(&claims.email).await? {
            Some(user) => user,
            None => self.provision(&claims.email, &claims.name).await?,
        };

        self.start_session(&user).await
    }

    async fn provision(&self, email: &str, name: &str) -> AuthResult<User> {
        let new_user = NewUser {
            email: email.to_string(),
            name: if name.is_empty() { email } else { name }.to_string(),
            role: self.default_role.clone(),
            activated: false,
            password_hash: None,
        };

        match self.user_storage.create(new_user).await {
            Ok(user) => {
                tracing::info!(identity = %user.email, user_id = %user.id, "Provisioned user from federated login");
                Ok(user)
            }
            // A concurrent login may have created the same user.
            Err(e) => match self.user_storage.find_by_email(email).await? {
                Some(user) => Ok(user),
                None => Err(e),
            },
        }
    }

    /// Ends the live session of `identity`.
    ///
    /// Returns `true` if a stored session was removed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store delete fails; the cached token is kept
    /// in that case.
    pub async fn end_session(&self, identity: &str) -> AuthResult<bool> {
        let removed = self.token_storage.delete(identity).await?;
        self.cache.remove(identity).await;

        tracing::info!(identity = %identity, removed, "Session ended");
        Ok(removed)
    }
}

fn email_taken() -> AuthError {
    AuthError::validation("email", "a user with this email address already exists")
}
