//! User storage trait.
//!
//! Defines the user-lookup collaborator used by the authentication resolver
//! and by federated login.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;

// =============================================================================
// User Type
// =============================================================================

/// A user account.
///
/// Users are keyed by email address, which is also the subject of their
/// session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Email address. Unique across users.
    pub email: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Role stamped into session tokens.
    #[serde(default)]
    pub role: String,

    /// Whether the account has been activated.
    ///
    /// Inactive users can authenticate but are rejected by
    /// [`RequireActivated`](crate::middleware::RequireActivated).
    #[serde(default)]
    pub activated: bool,

    /// Argon2 PHC hash of the password. `None` for users provisioned by
    /// federated login, who cannot log in with a password.
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Creates a user record from a registration request.
    #[must_use]
    pub fn from_new(new_user: NewUser) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            role: new_user.role,
            activated: new_user.activated,
            password_hash: new_user.password_hash,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns `true` if the account has been activated.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.activated
    }
}

/// Fields required to register a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Initial role.
    pub role: String,
    /// Initial activation state.
    pub activated: bool,
    /// Password hash, for password registrations.
    pub password_hash: Option<String>,
}

// =============================================================================
// User Storage Trait
// =============================================================================

/// Storage operations for users.
///
/// # Example
///
/// ```ignore
/// use trakteer_auth::storage::UserStorage;
///
/// async fn example(storage: &dyn UserStorage) -> trakteer_auth::AuthResult<()> {
///     if let Some(user) = storage.find_by_email("a@b.com").await? {
///         println!("Found user: {}", user.name);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Find a user by email address.
    ///
    /// Returns `None` if no user has this email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a user with the same email already exists.
    async fn create(&self, new_user: NewUser) -> AuthResult<User>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User::from_new(NewUser {
            email: "a@b.com".to_string(),
            name: "Ada".to_string(),
            role: "member".to_string(),
            activated: true,
            password_hash: Some("$argon2id$secret".to_string()),
        });

        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains("secret"));
        assert_eq!(json["email"], "a@b.com");
    }
}
