//! Session-related types.
//!
//! The signed-in user record, its bearer token, and the partition key that
//! scopes the user's collections in device storage.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use kaptaze_core::{Email, UserId};

/// The signed-in user as returned by login or registration.
///
/// Only `id` and `email` matter to the store; every other profile field is
/// carried through untouched in `profile` so that it survives a round trip
/// through device storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    /// Backend user ID.
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    /// Login email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Contact phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Arbitrary profile extension fields.
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl UserSession {
    /// A session identified by email only.
    #[must_use]
    pub fn with_email(email: Email) -> Self {
        Self {
            email: Some(email),
            ..Self::default()
        }
    }

    /// A session identified by backend ID only.
    #[must_use]
    pub fn with_id(id: impl Into<UserId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The storage partition this user's collections live under.
    #[must_use]
    pub fn partition_key(&self) -> Option<PartitionKey> {
        PartitionKey::for_user(self)
    }
}

/// Per-user storage partition.
///
/// Derived in exactly one place, [`PartitionKey::for_user`]: the email when
/// present, otherwise the backend ID. Every read and write of favorites and
/// orders goes through this key, and records carry it as their `userId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Derive the partition key for a user.
    ///
    /// Returns `None` when the session has neither a non-empty email nor a
    /// non-empty ID, in which case nothing can be stored for it.
    #[must_use]
    pub fn for_user(user: &UserSession) -> Option<Self> {
        let email = user
            .email
            .as_ref()
            .map(Email::as_str)
            .filter(|e| !e.is_empty());
        let id = user
            .id
            .as_ref()
            .map(UserId::as_str)
            .filter(|id| !id.is_empty());

        email.or(id).map(|key| Self(key.to_owned()))
    }

    /// The key as it appears in storage key names.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer credential for authenticated API calls.
///
/// Persisted as a raw string (not JSON) for compatibility with installed
/// clients. `Debug` never prints the value.
#[derive(Clone)]
pub struct AuthToken(SecretString);

impl AuthToken {
    /// Wrap a raw bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for headers and persistence only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_prefers_email() {
        let user = UserSession {
            id: Some(UserId::new("u-1")),
            email: Some(Email::parse("a@x.com").unwrap()),
            ..UserSession::default()
        };
        assert_eq!(user.partition_key().unwrap().as_str(), "a@x.com");
    }

    #[test]
    fn test_partition_falls_back_to_id() {
        let user = UserSession::with_id("u-1");
        assert_eq!(user.partition_key().unwrap().as_str(), "u-1");
    }

    #[test]
    fn test_partition_ignores_empty_values() {
        let user = UserSession {
            id: Some(UserId::new("u-2")),
            email: serde_json::from_str("\"\"").unwrap(),
            ..UserSession::default()
        };
        assert_eq!(user.partition_key().unwrap().as_str(), "u-2");
        assert!(UserSession::default().partition_key().is_none());
    }

    #[test]
    fn test_session_keeps_profile_extensions() {
        let json = r#"{"_id":"u-9","email":"c@x.com","name":"Ceren","city":"Antalya"}"#;
        let user: UserSession = serde_json::from_str(json).unwrap();
        assert_eq!(user.id.as_ref().unwrap().as_str(), "u-9");
        assert_eq!(user.profile.get("city").unwrap(), "Antalya");

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["city"], "Antalya");
        assert_eq!(back["id"], "u-9");
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken::new("eyJhbGciOi.secret");
        assert!(!format!("{token:?}").contains("secret"));
        assert_eq!(token.expose(), "eyJhbGciOi.secret");
    }
}
