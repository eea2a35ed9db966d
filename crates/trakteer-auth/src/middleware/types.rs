//! Request identity.

use crate::storage::User;

/// The caller of a single request, as resolved by
/// [`resolve_identity`](super::resolve_identity).
///
/// Created per request and stored in the request extensions; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No credential was presented.
    Anonymous,
    /// A credential resolved to this user.
    User(User),
}

impl Identity {
    /// Returns `true` for the anonymous identity.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns the resolved user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }

    /// Consumes the identity, returning the user if any.
    #[must_use]
    pub fn into_user(self) -> Option<User> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }
}
