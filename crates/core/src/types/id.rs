//! Newtype IDs for type-safe entity references.
//!
//! Backend identifiers are opaque strings (`MongoDB` object ids, `ORD-...`
//! order numbers, or locally generated `order_...` values), so every ID wraps a
//! `String`. Use the `define_id!` macro to create wrappers that prevent
//! accidentally mixing IDs from different entity types.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use kaptaze_core::define_id;
/// define_id!(ReviewId);
/// define_id!(CourierId);
///
/// let review = ReviewId::new("r-1");
/// let courier = CourierId::new("r-1");
///
/// // These are different types, so this won't compile:
/// // let _: ReviewId = courier;
/// assert_eq!(review.as_str(), courier.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(UserId);
define_id!(RestaurantId);
define_id!(PackageId);
define_id!(OrderId);
define_id!(BackendOrderId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_inner() {
        let id = OrderId::new("order_1700000000000");
        assert_eq!(id.to_string(), "order_1700000000000");
        assert_eq!(id.as_str(), "order_1700000000000");
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = RestaurantId::new("64f1c0ffee");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"64f1c0ffee\"");

        let back: RestaurantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_conversions() {
        let id: BackendOrderId = "ORD-42".into();
        let raw: String = id.clone().into();
        assert_eq!(raw, "ORD-42");
        assert_eq!(id.into_inner(), "ORD-42");
    }
}
