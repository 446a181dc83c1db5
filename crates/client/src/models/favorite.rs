//! Favorite restaurants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::restaurant::RestaurantSnapshot;
use super::session::PartitionKey;

/// A restaurant the user marked as favorite.
///
/// Unique per `(user_id, restaurant.id)`. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub restaurant: RestaurantSnapshot,
    pub added_at: DateTime<Utc>,
    pub user_id: PartitionKey,
}
