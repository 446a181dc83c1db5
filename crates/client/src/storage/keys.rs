//! Storage key naming.
//!
//! Global keys are `@kaptaze_<name>`; per-user keys append `_<partition>`.
//! These strings are read by already-installed app versions and must not
//! change.

use std::fmt;

use crate::models::PartitionKey;

/// Prefix shared by every key the app writes.
pub const KEY_PREFIX: &str = "@kaptaze_";

/// A key in device storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// The signed-in user record (JSON).
    CurrentUser,
    /// The bearer token (raw string).
    UserToken,
    /// One user's favorites (JSON array).
    Favorites(PartitionKey),
    /// One user's orders (JSON array).
    Orders(PartitionKey),
}

impl StorageKey {
    /// The keys holding one user's collections.
    #[must_use]
    pub fn partition(key: &PartitionKey) -> [Self; 2] {
        [Self::Favorites(key.clone()), Self::Orders(key.clone())]
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentUser => write!(f, "{KEY_PREFIX}current_user"),
            Self::UserToken => write!(f, "{KEY_PREFIX}user_token"),
            Self::Favorites(key) => write!(f, "{KEY_PREFIX}favorites_{key}"),
            Self::Orders(key) => write!(f, "{KEY_PREFIX}orders_{key}"),
        }
    }
}
