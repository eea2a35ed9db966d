//! In-memory session token storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use trakteer_auth::{AuthError, AuthResult, TokenRecord, TokenStorage};

/// Token records keyed by identity.
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    records: DashMap<String, TokenRecord>,
    /// Number of upcoming `fetch_all` calls that fail.
    failing_fetches: AtomicUsize,
}

impl InMemoryTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `fetch_all` fail with a storage error.
    ///
    /// Lets callers exercise cache initialization and refresh failures.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn take_failure(&self) -> bool {
        self.failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TokenStorage for InMemoryTokenStorage {
    async fn fetch_all(&self) -> AuthResult<HashMap<String, String>> {
        if self.take_failure() {
            tracing::debug!("Injected token store failure");
            return Err(AuthError::storage("token store unavailable"));
        }
        Ok(self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().token.clone()))
            .collect())
    }

    async fn upsert(&self, record: TokenRecord) -> AuthResult<()> {
        self.records.insert(record.identity.clone(), record);
        Ok(())
    }

    async fn fetch_one(&self, identity: &str) -> AuthResult<Option<TokenRecord>> {
        Ok(self.records.get(identity).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, identity: &str) -> AuthResult<bool> {
        Ok(self.records.remove(identity).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use tokio_test::{assert_err, assert_ok};

    fn record(identity: &str, token: &str) -> TokenRecord {
        let now = OffsetDateTime::now_utc();
        TokenRecord {
            identity: identity.to_string(),
            token: token.to_string(),
            role: "user".to_string(),
            issued_at: now,
            expires_at: now + time::Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_identity() {
        let storage = InMemoryTokenStorage::new();
        assert_ok!(storage.upsert(record("a@b.com", "T1")).await);
        assert_ok!(storage.upsert(record("a@b.com", "T2")).await);
        assert_ok!(storage.upsert(record("c@d.com", "T3")).await);

        let all = assert_ok!(storage.fetch_all().await);
        assert_eq!(all.len(), 2);
        assert_eq!(all["a@b.com"], "T2");

        let one = assert_ok!(storage.fetch_one("a@b.com").await).unwrap();
        assert_eq!(one.token, "T2");
        assert!(assert_ok!(storage.fetch_one("x@y.com").await).is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let storage = InMemoryTokenStorage::new();
        assert_ok!(storage.upsert(record("a@b.com", "T1")).await);

        assert!(assert_ok!(storage.delete("a@b.com").await));
        assert!(!assert_ok!(storage.delete("a@b.com").await));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_injected_fetch_failures() {
        let storage = InMemoryTokenStorage::new();
        assert_ok!(storage.upsert(record("a@b.com", "T1")).await);
        storage.fail_next_fetches(2);

        assert_err!(storage.fetch_all().await);
        assert_err!(storage.fetch_all().await);
        assert_eq!(assert_ok!(storage.fetch_all().await).len(), 1);
        // Single-record reads are unaffected.
        assert!(assert_ok!(storage.fetch_one("a@b.com").await).is_some());
    }
}
