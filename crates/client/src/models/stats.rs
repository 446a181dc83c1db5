//! Per-user impact statistics.

use serde::Serialize;

use kaptaze_core::{Money, OrderStatus};

use super::order::OrderRecord;

/// Estimated food rescued per bag, in kilograms.
///
/// Presentation-level estimate, not a measured value.
pub const FOOD_KG_PER_BAG: f64 = 1.2;

/// Estimated CO2 emissions avoided per bag, in kilograms.
///
/// Presentation-level estimate, not a measured value.
pub const CO2_KG_PER_BAG: f64 = 3.5;

/// Aggregates shown on the profile screen.
///
/// Money and the two estimates only count `completed` orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_orders: usize,
    pub completed_orders: usize,
    pub total_savings: Money,
    pub total_spent: Money,
    pub food_saved_kg: f64,
    pub co2_saved_kg: f64,
}

impl UserStats {
    /// Aggregate over one user's orders.
    #[must_use]
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a OrderRecord>) -> Self {
        orders.into_iter().fold(Self::default(), |mut stats, order| {
            stats.total_orders += 1;
            if order.status == OrderStatus::Completed {
                let bags = f64::from(order.quantity);
                stats.completed_orders += 1;
                stats.total_savings = stats.total_savings + order.savings;
                stats.total_spent = stats.total_spent + order.total_price;
                stats.food_saved_kg += bags * FOOD_KG_PER_BAG;
                stats.co2_saved_kg += bags * CO2_KG_PER_BAG;
            }
            stats
        })
    }
}
