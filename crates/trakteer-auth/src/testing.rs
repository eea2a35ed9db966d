//! In-crate test doubles for the storage traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::AuthError;
use crate::AuthResult;
use crate::storage::{NewUser, TokenRecord, TokenStorage, User, UserStorage};

#[derive(Default)]
pub struct MockTokenStorage {
    pub records: Mutex<HashMap<String, TokenRecord>>,
    pub fetch_one_calls: AtomicUsize,
    pub fail: AtomicBool,
    fetch_one_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl MockTokenStorage {
    pub fn token_of(&self, identity: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(identity)
            .map(|r| r.token.clone())
    }

    /// The next `fetch_one` signals `entered` after reading, then waits for
    /// `release`.
    pub fn gate_next_fetch_one(&self, entered: Arc<Notify>, release: Arc<Notify>) {
        *self.fetch_one_gate.lock().unwrap() = Some((entered, release));
    }

    fn check(&self) -> AuthResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::storage("token store unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStorage for MockTokenStorage {
    async fn fetch_all(&self) -> AuthResult<HashMap<String, String>> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .map(|r| (r.identity.clone(), r.token.clone()))
            .collect())
    }

    async fn upsert(&self, record: TokenRecord) -> AuthResult<()> {
        self.check()?;
        self.records
            .lock()
            .unwrap()
            .insert(record.identity.clone(), record);
        Ok(())
    }

    async fn fetch_one(&self, identity: &str) -> AuthResult<Option<TokenRecord>> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let record = self.records.lock().unwrap().get(identity).cloned();
        let gate = self.fetch_one_gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }
        Ok(record)
    }

    async fn delete(&self, identity: &str) -> AuthResult<bool> {
        self.check()?;
        Ok(self.records.lock().unwrap().remove(identity).is_some())
    }
}

#[derive(Default)]
pub struct MockUserStorage {
    pub users: Mutex<HashMap<String, User>>,
}

impl MockUserStorage {
    pub fn with_user(self, email: &str, activated: bool) -> Self {
        let user = User::from_new(NewUser {
            email: email.to_string(),
            name: "Test User".to_string(),
            role: "user".to_string(),
            activated,
            password_hash: None,
        });
        self.users.lock().unwrap().insert(email.to_string(), user);
        self
    }

    pub fn get(&self, email: &str) -> Option<User> {
        self.users.lock().unwrap().get(email).cloned()
    }
}

#[async_trait]
impl UserStorage for MockUserStorage {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self.get(email))
    }

    async fn create(&self, new_user: NewUser) -> AuthResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&new_user.email) {
            return Err(AuthError::storage("duplicate email"));
        }
        let user = User::from_new(new_user);
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }
}
