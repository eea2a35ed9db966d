//! Password hashing and credential format checks.
//!
//! Passwords are hashed with Argon2id using default parameters and stored in
//! PHC string format. Hashing is CPU-bound; the async helpers run it on the
//! blocking pool.

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use regex::Regex;

use crate::AuthResult;
use crate::error::AuthError;

/// Minimum password length accepted at registration, in bytes.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum password length, in bytes.
pub const MAX_PASSWORD_LEN: usize = 72;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex should be valid")
});

/// Checks that `email` is present and looks like an email address.
///
/// # Errors
///
/// Returns a `Validation` error for the `email` field.
pub fn validate_email(email: &str) -> AuthResult<()> {
    if email.is_empty() {
        return Err(AuthError::validation("email", "must be provided"));
    }
    if !EMAIL_RX.is_match(email) {
        return Err(AuthError::validation("email", "must be a valid email address"));
    }
    Ok(())
}

/// Checks a password presented at login.
///
/// # Errors
///
/// Returns a `Validation` error for the `password` field.
pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::validation("password", "must be provided"));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AuthError::validation(
            "password",
            format!("must not be more than {MAX_PASSWORD_LEN} bytes long"),
        ));
    }
    Ok(())
}

/// Checks a password chosen at registration.
///
/// # Errors
///
/// Returns a `Validation` error for the `password` field.
pub fn validate_new_password(password: &str) -> AuthResult<()> {
    validate_password(password)?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} bytes long"),
        ));
    }
    Ok(())
}

/// Hashes a password for storage.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a password against a stored hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only for a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}

/// [`hash_password`] on the blocking pool.
pub(crate) async fn hash_password_blocking(password: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))
}

/// [`verify_password`] on the blocking pool.
pub(crate) async fn verify_password_blocking(password: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?
        .map_err(|e| AuthError::internal(format!("stored password hash is invalid: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("correct horse").unwrap();
        let second = hash_password("correct horse").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());

        for email in ["", "ada", "ada@", "@example.com", "ada@exa mple.com", "ada@-example.com"] {
            let err = validate_email(email).unwrap_err();
            assert!(matches!(err, AuthError::Validation { .. }), "email: {email:?}");
        }
    }

    #[test]
    fn test_password_length_limits() {
        assert!(validate_password("short").is_ok());
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("long enough").is_ok());
        assert!(validate_password("").is_err());

        let too_long = "x".repeat(MAX_PASSWORD_LEN + 1);
        assert!(validate_password(&too_long).is_err());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LEN)).is_ok());
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let hash = hash_password_blocking("correct horse".into()).await.unwrap();

        assert!(verify_password_blocking("correct horse".into(), hash.clone()).await.unwrap());
        assert!(!verify_password_blocking("wrong".into(), hash).await.unwrap());
    }
}
