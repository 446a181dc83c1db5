//! Restaurant catalog and favorites.

use kaptaze_client::ClientContext;
use kaptaze_client::models::{RestaurantListing, RestaurantSnapshot};
use kaptaze_core::RestaurantId;

use super::CommandError;

fn log_listing(listing: &RestaurantListing) {
    let restaurant = &listing.restaurant;
    let hours = restaurant
        .operating_hours
        .as_ref()
        .map_or_else(|| "-".to_string(), |h| format!("{}-{}", h.open, h.close));
    tracing::info!(
        "{}  {} [{}] {}",
        restaurant.id,
        restaurant.name,
        restaurant.category.as_deref().unwrap_or("-"),
        hours
    );
    for package in &listing.packages {
        tracing::info!(
            "    {}  {}  {} (was {})",
            package.id,
            package.name,
            package.sale_price.display(),
            package.original_price.display()
        );
    }
}

async fn fetch_snapshot(ctx: &ClientContext, id: &str) -> Result<RestaurantSnapshot, CommandError> {
    let listing = ctx.api().get_restaurant(&RestaurantId::new(id)).await?;
    Ok(listing.restaurant)
}

async fn require_user(ctx: &ClientContext) -> Result<(), CommandError> {
    if ctx.store().partition_key().await.is_none() {
        return Err(CommandError::NotSignedIn);
    }
    Ok(())
}

/// List active restaurants with their bags.
///
/// # Errors
///
/// Returns an error if the catalog cannot be fetched.
pub async fn list_restaurants(ctx: &ClientContext) -> Result<(), CommandError> {
    let listings = ctx.api().get_restaurants().await?;
    tracing::info!("{} restaurants", listings.len());
    for listing in &listings {
        log_listing(listing);
    }
    Ok(())
}

/// Show one restaurant.
///
/// # Errors
///
/// Returns an error if the restaurant cannot be fetched.
pub async fn show_restaurant(ctx: &ClientContext, id: &str) -> Result<(), CommandError> {
    let listing = ctx.api().get_restaurant(&RestaurantId::new(id)).await?;
    log_listing(&listing);
    Ok(())
}

/// List the signed-in user's favorites.
pub async fn list_favorites(ctx: &ClientContext) {
    let favorites = ctx.store().user_favorites().await;
    if favorites.is_empty() {
        tracing::info!("No favorites");
    }
    for favorite in favorites {
        tracing::info!(
            "{}  {}  (added {})",
            favorite.restaurant.id,
            favorite.restaurant.name,
            favorite.added_at.format("%Y-%m-%d")
        );
    }
}

/// Add a restaurant to favorites.
///
/// # Errors
///
/// Returns an error if signed out, the restaurant cannot be fetched, or it is
/// already a favorite.
pub async fn add_favorite(ctx: &ClientContext, restaurant_id: &str) -> Result<(), CommandError> {
    require_user(ctx).await?;
    let restaurant = fetch_snapshot(ctx, restaurant_id).await?;
    let name = restaurant.name.clone();
    if !ctx.store().add_to_favorites(restaurant).await {
        return Err(CommandError::Refused(format!("{name} is already a favorite")));
    }
    tracing::info!("Added {name} to favorites");
    Ok(())
}

/// Remove a restaurant from favorites.
///
/// # Errors
///
/// Returns an error if signed out.
pub async fn remove_favorite(ctx: &ClientContext, restaurant_id: &str) -> Result<(), CommandError> {
    require_user(ctx).await?;
    ctx.store()
        .remove_from_favorites(&RestaurantId::new(restaurant_id))
        .await;
    tracing::info!("Removed {restaurant_id} from favorites");
    Ok(())
}

/// Add or remove a restaurant.
///
/// # Errors
///
/// Returns an error if signed out or the restaurant cannot be fetched.
pub async fn toggle_favorite(ctx: &ClientContext, restaurant_id: &str) -> Result<(), CommandError> {
    require_user(ctx).await?;
    let restaurant = fetch_snapshot(ctx, restaurant_id).await?;
    let name = restaurant.name.clone();
    ctx.store().toggle_favorite(restaurant).await;

    let now_favorite = ctx
        .store()
        .is_favorite(&RestaurantId::new(restaurant_id))
        .await;
    tracing::info!(
        "{name} {}",
        if now_favorite {
            "added to favorites"
        } else {
            "removed from favorites"
        }
    );
    Ok(())
}
