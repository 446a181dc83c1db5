//! Restaurant and package snapshots.
//!
//! Favorites and orders embed a copy of the restaurant (and package) taken at
//! the time of the action, not a live reference. These are the canonical
//! shapes; remote variants are normalized into them in
//! [`crate::api::conversions`].

use serde::{Deserialize, Serialize};

use kaptaze_core::{Money, PackageId, RestaurantId};

/// Daily pickup window of a restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    /// Opening time, `HH:MM`.
    pub open: String,
    /// Closing time, `HH:MM`.
    pub close: String,
}

/// A restaurant as embedded in favorites and orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantSnapshot {
    pub id: RestaurantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_hours: Option<OperatingHours>,
}

impl RestaurantSnapshot {
    /// Minimal snapshot with just an ID and a name.
    #[must_use]
    pub fn new(id: impl Into<RestaurantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            address: None,
            phone: None,
            image_url: None,
            operating_hours: None,
        }
    }

    /// Attach operating hours.
    #[must_use]
    pub fn with_hours(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.operating_hours = Some(OperatingHours {
            open: open.into(),
            close: close.into(),
        });
        self
    }
}

/// A surprise bag offered by a restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSnapshot {
    pub id: PackageId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Shelf price of one bag.
    pub original_price: Money,
    /// Discounted price actually charged for one bag.
    pub sale_price: Money,
}

impl PackageSnapshot {
    /// Create a package snapshot.
    #[must_use]
    pub fn new(
        id: impl Into<PackageId>,
        name: impl Into<String>,
        original_price: Money,
        sale_price: Money,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            original_price,
            sale_price,
        }
    }
}

/// A catalog entry: a restaurant and the bags it currently offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantListing {
    pub restaurant: RestaurantSnapshot,
    pub packages: Vec<PackageSnapshot>,
}
