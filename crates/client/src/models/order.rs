//! Order records and the input used to create them.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use kaptaze_core::{BackendOrderId, Money, OrderId, OrderStatus, PaymentMethod};

use super::restaurant::{PackageSnapshot, RestaurantSnapshot};
use super::session::PartitionKey;

/// Pickup window used when the restaurant publishes no operating hours.
pub const FALLBACK_PICKUP_WINDOW: &str = "18:00-21:00";

/// Prefix of every locally generated pickup code.
pub const PICKUP_CODE_PREFIX: &str = "KB";

/// What the UI hands to [`crate::store::UserDataStore::add_order`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderInput {
    pub restaurant: RestaurantSnapshot,
    pub package: PackageSnapshot,
    pub quantity: u32,
    pub total_price: Money,
    pub original_price: Money,
    pub payment_method: PaymentMethod,
    /// Free-form note for the restaurant.
    pub notes: Option<String>,
}

impl OrderInput {
    /// Build an input for `quantity` bags, pricing it from the package.
    #[must_use]
    pub fn for_package(
        restaurant: RestaurantSnapshot,
        package: PackageSnapshot,
        quantity: u32,
        payment_method: PaymentMethod,
    ) -> Self {
        let total_price = package.sale_price * quantity;
        let original_price = package.original_price * quantity;
        Self {
            restaurant,
            package,
            quantity,
            total_price,
            original_price,
            payment_method,
            notes: None,
        }
    }
}

/// Short code shown at the restaurant's pickup desk, e.g. `KB0042`.
///
/// Only four random digits: it is a display convenience, not an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickupCode(String);

impl PickupCode {
    /// Generate a fresh code.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let digits: u16 = rng.random_range(0..10_000);
        Self(format!("{PICKUP_CODE_PREFIX}{digits:04}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PickupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Star rating left after pickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRating {
    /// 1 to 5.
    pub stars: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub rated_at: DateTime<Utc>,
}

/// A reservation as kept on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    /// Local ID; equals the backend ID when the remote create succeeded first.
    pub id: OrderId,
    pub user_id: PartitionKey,
    pub restaurant: RestaurantSnapshot,
    pub package: PackageSnapshot,
    pub quantity: u32,
    pub total_price: Money,
    pub original_price: Money,
    /// Always `original_price - total_price`.
    pub savings: Money,
    pub status: OrderStatus,
    pub pickup_code: PickupCode,
    pub order_date: DateTime<Utc>,
    pub pickup_time: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub backend_order_id: Option<BackendOrderId>,
    #[serde(default)]
    pub local_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<OrderRating>,
}

impl OrderRecord {
    /// Assemble a new pending record.
    ///
    /// With `backend_order_id` the record is synced and takes the backend ID
    /// as its local ID; without it the record is `local_only` and gets a
    /// timestamp-derived local ID.
    #[must_use]
    pub fn assemble(
        user_id: PartitionKey,
        input: OrderInput,
        pickup_code: PickupCode,
        backend_order_id: Option<BackendOrderId>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = backend_order_id
            .as_ref()
            .map_or_else(|| local_order_id(now), |backend| OrderId::new(backend.as_str()));
        let local_only = backend_order_id.is_none();
        let pickup_time = pickup_window(&input.restaurant);

        Self {
            id,
            user_id,
            savings: input.total_price.savings_against(input.original_price),
            restaurant: input.restaurant,
            package: input.package,
            quantity: input.quantity,
            total_price: input.total_price,
            original_price: input.original_price,
            status: OrderStatus::Pending,
            pickup_code,
            order_date: now,
            pickup_time,
            payment_method: input.payment_method,
            backend_order_id,
            local_only,
            rating: None,
        }
    }

    /// The input this record was created from, for resubmission.
    #[must_use]
    pub fn to_input(&self) -> OrderInput {
        OrderInput {
            restaurant: self.restaurant.clone(),
            package: self.package.clone(),
            quantity: self.quantity,
            total_price: self.total_price,
            original_price: self.original_price,
            payment_method: self.payment_method,
            notes: None,
        }
    }

    /// Whether the record is known to the backend.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.backend_order_id.is_some()
    }
}

/// Pickup window text: `"<open>-<close>"` from operating hours, or the fallback.
#[must_use]
pub fn pickup_window(restaurant: &RestaurantSnapshot) -> String {
    restaurant
        .operating_hours
        .as_ref()
        .filter(|hours| !hours.open.is_empty() && !hours.close.is_empty())
        .map_or_else(
            || FALLBACK_PICKUP_WINDOW.to_owned(),
            |hours| format!("{}-{}", hours.open, hours.close),
        )
}

/// Timestamp-derived local order ID with a short random suffix so that two
/// orders placed in the same millisecond stay distinct.
#[must_use]
pub fn local_order_id(now: DateTime<Utc>) -> OrderId {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect();
    OrderId::new(format!("order_{}_{suffix}", now.timestamp_millis()))
}
