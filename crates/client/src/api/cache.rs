//! Cache types for catalog responses.

use kaptaze_core::RestaurantId;

use crate::models::RestaurantListing;

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Restaurants,
    Restaurant(RestaurantId),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Restaurants(Vec<RestaurantListing>),
    Restaurant(Box<RestaurantListing>),
}
