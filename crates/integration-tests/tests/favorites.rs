//! Favorite uniqueness and toggling.

#![allow(clippy::unwrap_used)]

use kaptaze_client::models::RestaurantSnapshot;
use kaptaze_core::RestaurantId;
use kaptaze_integration_tests::{TestContext, cafe, user};

#[tokio::test]
async fn test_adding_twice_keeps_one_entry() {
    let ctx = TestContext::new().await;
    ctx.store.set_user(Some(user("a@x.com")), None).await;

    assert!(ctx.store.add_to_favorites(cafe()).await);
    assert!(!ctx.store.add_to_favorites(cafe()).await);

    let favorites = ctx.store.user_favorites().await;
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].restaurant.id.as_str(), "r1");
    assert_eq!(favorites[0].user_id.as_str(), "a@x.com");
}

#[tokio::test]
async fn test_favorites_are_stored_as_json_array() {
    let ctx = TestContext::new().await;
    ctx.store.set_user(Some(user("a@x.com")), None).await;
    ctx.store.add_to_favorites(cafe()).await;
    ctx.store
        .add_to_favorites(RestaurantSnapshot::new("r2", "Fırın"))
        .await;

    let raw = ctx.stored("@kaptaze_favorites_a@x.com").await.unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entries = stored.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["userId"], "a@x.com");
    assert_eq!(entries[0]["restaurant"]["id"], "r1");
    assert_eq!(entries[1]["restaurant"]["name"], "Fırın");
    assert!(entries[0]["addedAt"].is_string());
}

#[tokio::test]
async fn test_toggle_adds_then_removes() {
    let ctx = TestContext::new().await;
    let r1 = RestaurantId::new("r1");
    ctx.store.set_user(Some(user("a@x.com")), None).await;

    assert!(ctx.store.toggle_favorite(cafe()).await);
    assert!(ctx.store.is_favorite(&r1).await);

    assert!(ctx.store.toggle_favorite(cafe()).await);
    assert!(!ctx.store.is_favorite(&r1).await);
    assert_eq!(
        ctx.stored("@kaptaze_favorites_a@x.com").await.as_deref(),
        Some("[]")
    );
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let ctx = TestContext::new().await;
    let r1 = RestaurantId::new("r1");
    ctx.store.set_user(Some(user("a@x.com")), None).await;
    ctx.store.add_to_favorites(cafe()).await;

    assert!(ctx.store.remove_from_favorites(&r1).await);
    assert!(ctx.store.remove_from_favorites(&r1).await);
    assert!(ctx.store.user_favorites().await.is_empty());
}

#[tokio::test]
async fn test_signed_out_favorites_are_refused() {
    let ctx = TestContext::new().await;

    assert!(!ctx.store.add_to_favorites(cafe()).await);
    assert!(!ctx.store.remove_from_favorites(&RestaurantId::new("r1")).await);
    assert!(!ctx.store.is_favorite(&RestaurantId::new("r1")).await);
    assert!(ctx.storage.keys().await.is_empty());
}
