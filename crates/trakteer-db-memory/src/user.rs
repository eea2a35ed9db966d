//! In-memory user storage.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use trakteer_auth::{AuthError, AuthResult, NewUser, User, UserStorage};

/// Users keyed by email.
#[derive(Debug, Default)]
pub struct InMemoryUserStorage {
    users: DashMap<String, User>,
}

impl InMemoryUserStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user record.
    pub fn put(&self, user: User) {
        self.users.insert(user.email.clone(), user);
    }

    /// Sets the activation flag of a user. Returns `false` if unknown.
    pub fn set_activated(&self, email: &str, activated: bool) -> bool {
        match self.users.get_mut(email) {
            Some(mut user) => {
                user.activated = activated;
                true
            }
            None => false,
        }
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if no users are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self.users.get(email).map(|entry| entry.value().clone()))
    }

    async fn create(&self, new_user: NewUser) -> AuthResult<User> {
        match self.users.entry(new_user.email.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "a user with email {} already exists",
                new_user.email
            ))),
            Entry::Vacant(slot) => {
                let user = User::from_new(new_user);
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "Ada".to_string(),
            role: "member".to_string(),
            activated: false,
            password_hash: Some("$argon2id$stub".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let storage = InMemoryUserStorage::new();

        let created = assert_ok!(storage.create(new_user("a@b.com")).await);
        let found = assert_ok!(storage.find_by_email("a@b.com").await).unwrap();
        assert_eq!(found.password_hash.as_deref(), Some("$argon2id$stub"));

        assert_eq!(found, created);
        assert!(!found.is_activated());
        assert!(assert_ok!(storage.find_by_email("x@y.com").await).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let storage = InMemoryUserStorage::new();
        assert_ok!(storage.create(new_user("a@b.com")).await);

        let err = assert_err!(storage.create(new_user("a@b.com")).await);
        assert!(matches!(err, AuthError::Storage { .. }));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_set_activated() {
        let storage = InMemoryUserStorage::new();
        assert_ok!(storage.create(new_user("a@b.com")).await);

        assert!(storage.set_activated("a@b.com", true));
        assert!(!storage.set_activated("x@y.com", true));

        let user = assert_ok!(storage.find_by_email("a@b.com").await).unwrap();
        assert!(user.is_activated());
    }
}
