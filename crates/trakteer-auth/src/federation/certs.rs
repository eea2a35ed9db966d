//! Identity provider signing certificates.
//!
//! Federated tokens name their signing key in the `kid` header. The provider
//! publishes its current keys at a well-known endpoint, either as a JSON map
//! of key ID to PEM key material or as a JSON Web Key Set.
//!
//! [`HttpCertificateProvider`] fetches that document over HTTPS, keeps the
//! decoded keys, and refetches when asked for a key ID it has not seen.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use super::error::FederationError;
use crate::config::FederationConfig;

/// Source of provider verification keys, looked up by key ID.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    /// Returns the verification key for `kid`.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetch` if the endpoint cannot be read and `KeyNotFound`
    /// if it does not list `kid`.
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, FederationError>;
}

/// Shapes accepted from the certificate endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum CertificateDocument {
    Jwks(JwkSet),
    Pem(HashMap<String, String>),
}

/// Fetches provider keys from an HTTP endpoint.
pub struct HttpCertificateProvider {
    http_client: reqwest::Client,
    certs_url: Url,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl HttpCertificateProvider {
    /// Creates a provider for `certs_url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the URL does not parse or is plain HTTP
    /// while `allow_http` is false, and `KeyFetch` if the HTTP client cannot
    /// be built.
    pub fn new(
        certs_url: &str,
        request_timeout: Duration,
        allow_http: bool,
    ) -> Result<Self, FederationError> {
        let certs_url =
            Url::parse(certs_url).map_err(|e| FederationError::InvalidEndpoint(e.to_string()))?;
        match certs_url.scheme() {
            "https" => {}
            "http" if allow_http => {}
            scheme => {
                return Err(FederationError::InvalidEndpoint(format!(
                    "scheme '{scheme}' is not allowed"
                )));
            }
        }

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FederationError::KeyFetch(e.to_string()))?;

        Ok(Self {
            http_client,
            certs_url,
            keys: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a provider from the federation configuration.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_config(config: &FederationConfig) -> Result<Self, FederationError> {
        Self::new(&config.certs_url, config.request_timeout, config.allow_http)
    }

    /// Fetches the certificate document and replaces the known keys.
    ///
    /// Returns the number of usable keys.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetch` on network errors, non-success status codes or an
    /// unparseable body.
    pub async fn refresh(&self) -> Result<usize, FederationError> {
        tracing::debug!(url = %self.certs_url, "Fetching provider signing certificates");

        let response = self
            .http_client
            .get(self.certs_url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.certs_url, error = %e, "Failed to fetch certificates");
                FederationError::KeyFetch(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(FederationError::KeyFetch(format!(
                "HTTP status {}",
                response.status().as_u16()
            )));
        }

        let document: CertificateDocument = response
            .json()
            .await
            .map_err(|e| FederationError::KeyFetch(format!("unparseable body: {e}")))?;

        let keys = decode_document(document);
        let count = keys.len();
        *self.keys.write().await = keys;

        tracing::debug!(url = %self.certs_url, keys = count, "Provider certificates refreshed");
        Ok(count)
    }

    async fn cached(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }
}

#[async_trait]
impl CertificateProvider for HttpCertificateProvider {
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, FederationError> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        // Unknown kid: the provider may have rotated keys since the last fetch.
        self.refresh().await?;

        self.cached(kid)
            .await
            .ok_or_else(|| FederationError::KeyNotFound(kid.to_string()))
    }
}

fn decode_document(document: CertificateDocument) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::new();
    match document {
        CertificateDocument::Pem(entries) => {
            for (kid, pem) in entries {
                match DecodingKey::from_rsa_pem(pem.as_bytes()) {
                    Ok(key) => {
                        keys.insert(kid, key);
                    }
                    Err(e) => tracing::warn!(kid = %kid, error = %e, "Skipping unusable PEM key"),
                }
            }
        }
        CertificateDocument::Jwks(set) => {
            for jwk in &set.keys {
                let Some(kid) = jwk.common.key_id.clone() else {
                    continue;
                };
                match DecodingKey::from_jwk(jwk) {
                    Ok(key) => {
                        keys.insert(kid, key);
                    }
                    Err(e) => tracing::warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
                }
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::federation::test_keys;

    fn provider(server: &MockServer) -> HttpCertificateProvider {
        HttpCertificateProvider::new(
            &format!("{}/oauth2/v1/certs", server.uri()),
            Duration::from_secs(5),
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_http_unless_allowed() {
        let result =
            HttpCertificateProvider::new("http://127.0.0.1/certs", Duration::from_secs(1), false);
        assert!(matches!(result, Err(FederationError::InvalidEndpoint(_))));

        let result = HttpCertificateProvider::new("not a url", Duration::from_secs(1), true);
        assert!(matches!(result, Err(FederationError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_fetches_pem_map_and_finds_kid() {
        let server = MockServer::start().await;
        let keys = test_keys::primary();
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/certs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "kid-1": keys.public_pem })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert!(provider.decoding_key("kid-1").await.is_ok());
        // Second lookup is served from memory (the mock expects one request).
        assert!(provider.decoding_key("kid-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_kid_is_retryable_not_found() {
        let server = MockServer::start().await;
        let keys = test_keys::primary();
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/certs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "kid-1": keys.public_pem })),
            )
            .mount(&server)
            .await;

        let err = provider(&server).decoding_key("kid-9").await.unwrap_err();
        assert!(matches!(err, FederationError::KeyNotFound(ref kid) if kid == "kid-9"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/certs"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).decoding_key("kid-1").await.unwrap_err();
        assert!(matches!(err, FederationError::KeyFetch(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_key_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = provider(&server).refresh().await.unwrap_err();
        assert!(matches!(err, FederationError::KeyFetch(_)));
    }

    #[tokio::test]
    async fn test_invalid_pem_entries_are_skipped() {
        let server = MockServer::start().await;
        let keys = test_keys::primary();
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kid-1": keys.public_pem,
                "kid-broken": "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n",
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).refresh().await.unwrap(), 1);
    }
}
