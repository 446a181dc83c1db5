//! Domain models owned by the store.
//!
//! One canonical type per concept. Records are serialized in camelCase so
//! that data written by earlier app versions keeps loading.

pub mod favorite;
pub mod order;
pub mod restaurant;
pub mod session;
pub mod stats;

pub use favorite::FavoriteEntry;
pub use order::{OrderInput, OrderRating, OrderRecord, PickupCode};
pub use restaurant::{OperatingHours, PackageSnapshot, RestaurantListing, RestaurantSnapshot};
pub use session::{AuthToken, PartitionKey, UserSession};
pub use stats::UserStats;
