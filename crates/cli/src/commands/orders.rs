//! Order commands.

use kaptaze_client::ClientContext;
use kaptaze_client::models::OrderInput;
use kaptaze_core::{OrderId, PaymentMethod, RestaurantId};

use super::CommandError;

/// List the signed-in user's orders, newest first.
pub async fn list(ctx: &ClientContext) {
    let orders = ctx.store().user_orders().await;
    if orders.is_empty() {
        tracing::info!("No orders");
    }
    for order in orders {
        tracing::info!(
            "{}  {}  {} x{}  {}  code {}  pickup {}{}",
            order.id,
            order.status,
            order.restaurant.name,
            order.quantity,
            order.total_price.display(),
            order.pickup_code,
            order.pickup_time,
            if order.local_only { "  (not synced)" } else { "" }
        );
    }
}

/// Reserve `quantity` bags of `package_id` at `restaurant_id`.
///
/// # Errors
///
/// Returns an error if signed out, the restaurant cannot be fetched, or it
/// does not offer the package.
pub async fn place(
    ctx: &ClientContext,
    restaurant_id: &str,
    package_id: &str,
    quantity: u32,
    payment_method: PaymentMethod,
    notes: Option<String>,
) -> Result<(), CommandError> {
    if ctx.store().partition_key().await.is_none() {
        return Err(CommandError::NotSignedIn);
    }

    let listing = ctx
        .api()
        .get_restaurant(&RestaurantId::new(restaurant_id))
        .await?;
    let package = listing
        .packages
        .iter()
        .find(|p| p.id.as_str() == package_id)
        .cloned()
        .ok_or_else(|| CommandError::UnknownPackage {
            restaurant: restaurant_id.to_string(),
            package: package_id.to_string(),
        })?;

    let mut input = OrderInput::for_package(listing.restaurant, package, quantity, payment_method);
    input.notes = notes;

    let order = ctx
        .store()
        .add_order(input)
        .await
        .ok_or(CommandError::NotSignedIn)?;

    tracing::info!("Order {} placed", order.id);
    tracing::info!("  Pickup code: {}", order.pickup_code);
    tracing::info!("  Pickup time: {}", order.pickup_time);
    tracing::info!(
        "  Total: {} (you save {})",
        order.total_price.display(),
        order.savings.display()
    );
    if order.local_only {
        tracing::info!("  Backend unreachable; run `kaptaze orders sync` later");
    }
    Ok(())
}

/// Retry orders that never reached the backend.
pub async fn sync(ctx: &ClientContext) {
    let synced = ctx.store().sync_local_orders().await;
    tracing::info!("{synced} orders synced");
}

/// Bring order statuses up to date from the backend's order history.
pub async fn refresh(ctx: &ClientContext) {
    let changed = ctx.store().refresh_order_statuses().await;
    tracing::info!("{changed} orders updated");
}

/// Cancel a pending order.
///
/// # Errors
///
/// Returns an error if the order is unknown or no longer pending.
pub async fn cancel(ctx: &ClientContext, id: &str) -> Result<(), CommandError> {
    if !ctx.store().cancel_order(&OrderId::new(id)).await {
        return Err(CommandError::Refused(format!(
            "Order {id} cannot be cancelled"
        )));
    }
    tracing::info!("Order {id} cancelled");
    Ok(())
}

/// Mark an order as picked up.
///
/// # Errors
///
/// Returns an error if the order is unknown or already closed.
pub async fn received(ctx: &ClientContext, id: &str) -> Result<(), CommandError> {
    if !ctx.store().mark_received(&OrderId::new(id)).await {
        return Err(CommandError::Refused(format!(
            "Order {id} cannot be marked as received"
        )));
    }
    tracing::info!("Order {id} completed");
    Ok(())
}

/// Rate a completed order.
///
/// # Errors
///
/// Returns an error if the rating is out of range or the order cannot be
/// rated.
pub async fn rate(ctx: &ClientContext, id: &str, stars: u8, comment: &str) -> Result<(), CommandError> {
    if !ctx
        .store()
        .submit_rating(&OrderId::new(id), stars, comment)
        .await
    {
        return Err(CommandError::Refused(format!(
            "Order {id} cannot be rated with {stars} stars"
        )));
    }
    tracing::info!("Thanks for rating order {id}");
    Ok(())
}

/// Show savings and impact.
pub async fn stats(ctx: &ClientContext) {
    let stats = ctx.store().user_stats().await;
    tracing::info!(
        "Orders: {} ({} completed)",
        stats.total_orders,
        stats.completed_orders
    );
    tracing::info!("Spent: {}", stats.total_spent.display());
    tracing::info!("Saved: {}", stats.total_savings.display());
    tracing::info!(
        "Food rescued: {:.1} kg, CO2 avoided: {:.1} kg",
        stats.food_saved_kg,
        stats.co2_saved_kg
    );
}
