//! Authentication configuration.
//!
//! Groups the settings consumed by the session token service, the federated
//! token validator and the token cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Minimum accepted length of the session signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.session]
/// secret = "change-me-change-me-change-me-change-me"
/// expires = "24h"
///
/// [auth.federation]
/// enabled = true
/// client_id = "1234.apps.googleusercontent.com"
///
/// [auth.cache]
/// refresh_period = "15m"
/// validity_threshold = "3h 30m"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session token issuing and verification.
    pub session: SessionConfig,

    /// Federated (Google) identity token validation.
    pub federation: FederationConfig,

    /// Token cache initialization and refresh.
    pub cache: TokenCacheConfig,
}

/// Session token configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shared secret used to sign and verify session tokens (HS256).
    pub secret: String,

    /// How long an issued session token stays valid.
    #[serde(with = "humantime_serde")]
    pub expires: Duration,

    /// Audience claim stamped into every session token and required on verification.
    pub audience: String,

    /// Role assigned to users provisioned through federated login.
    pub default_role: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expires: Duration::from_secs(24 * 3600),
            audience: "trakteer".to_string(),
            default_role: String::new(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("expires", &self.expires)
            .field("audience", &self.audience)
            .field("default_role", &self.default_role)
            .finish()
    }
}

/// Federated identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Enable federated login.
    pub enabled: bool,

    /// OAuth client identifier; federated tokens must carry it as audience.
    pub client_id: String,

    /// Accepted `iss` values.
    pub trusted_issuers: Vec<String>,

    /// Endpoint returning a JSON map of key id to PEM certificate.
    pub certs_url: String,

    /// Timeout for a single certificate fetch.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Allow a plain `http://` certificate endpoint. Testing only.
    pub allow_http: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: String::new(),
            trusted_issuers: vec![
                "accounts.google.com".to_string(),
                "https://accounts.google.com".to_string(),
            ],
            certs_url: "https://www.googleapis.com/oauth2/v1/certs".to_string(),
            request_timeout: Duration::from_secs(10),
            allow_http: false,
        }
    }
}

/// Token cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenCacheConfig {
    /// Number of full-reload attempts made by cache initialization.
    pub max_retries: u32,

    /// Base delay between initialization attempts (multiplied by the attempt number).
    #[serde(with = "humantime_serde")]
    pub retry_period: Duration,

    /// Interval between background reloads.
    #[serde(with = "humantime_serde")]
    pub refresh_period: Duration,

    /// Maximum age of the last successful reload before the cache is declared unusable.
    #[serde(with = "humantime_serde")]
    pub validity_threshold: Duration,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_period: Duration::from_millis(300),
            refresh_period: Duration::from_secs(15 * 60),
            validity_threshold: Duration::from_secs(3 * 3600 + 30 * 60),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is missing, out of range or inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.secret.is_empty() {
            return Err(ConfigError::Missing("session.secret".to_string()));
        }
        if session.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "session.secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if session.expires.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session.expires must be greater than zero".to_string(),
            ));
        }
        if session.audience.is_empty() {
            return Err(ConfigError::InvalidValue(
                "session.audience cannot be empty".to_string(),
            ));
        }

        let cache = &self.cache;
        if cache.max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.max_retries must be at least 1".to_string(),
            ));
        }
        if cache.refresh_period.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.refresh_period must be greater than zero".to_string(),
            ));
        }
        if cache.validity_threshold <= cache.refresh_period {
            return Err(ConfigError::InvalidValue(
                "cache.validity_threshold must be longer than cache.refresh_period".to_string(),
            ));
        }

        let federation = &self.federation;
        if federation.enabled {
            if federation.client_id.is_empty() {
                return Err(ConfigError::Missing("federation.client_id".to_string()));
            }
            if federation.trusted_issuers.is_empty() {
                return Err(ConfigError::Missing(
                    "federation.trusted_issuers".to_string(),
                ));
            }
            let url = Url::parse(&federation.certs_url).map_err(|e| {
                ConfigError::InvalidValue(format!("federation.certs_url: {e}"))
            })?;
            match url.scheme() {
                "https" => {}
                "http" if federation.allow_http => {}
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "federation.certs_url scheme '{other}' is not allowed"
                    )));
                }
            }
        }

        Ok(())
    }
}
