//! Favorite restaurants.

use chrono::Utc;
use tracing::{debug, instrument};

use kaptaze_core::RestaurantId;

use super::{StoreState, UserDataStore};
use crate::models::{FavoriteEntry, RestaurantSnapshot};

impl StoreState {
    fn is_favorite(&self, restaurant_id: &RestaurantId) -> bool {
        self.user_favorites()
            .any(|favorite| &favorite.restaurant.id == restaurant_id)
    }
}

impl UserDataStore {
    /// Add a restaurant to the signed-in user's favorites.
    ///
    /// Returns `false` without changing anything when signed out or when the
    /// restaurant is already a favorite.
    #[instrument(skip_all, fields(restaurant_id = %restaurant.id))]
    pub async fn add_to_favorites(&self, restaurant: RestaurantSnapshot) -> bool {
        let mut state = self.lock().await;
        self.add_favorite_locked(&mut state, restaurant).await
    }

    /// Remove a restaurant from the signed-in user's favorites.
    ///
    /// Idempotent: returns `true` even if it was not a favorite. Returns
    /// `false` only when signed out.
    #[instrument(skip(self))]
    pub async fn remove_from_favorites(&self, restaurant_id: &RestaurantId) -> bool {
        let mut state = self.lock().await;
        self.remove_favorite_locked(&mut state, restaurant_id).await
    }

    /// Whether the signed-in user has favorited the restaurant.
    pub async fn is_favorite(&self, restaurant_id: &RestaurantId) -> bool {
        self.lock().await.is_favorite(restaurant_id)
    }

    /// Remove the restaurant if it is a favorite, add it otherwise.
    ///
    /// Returns the result of whichever operation ran.
    #[instrument(skip_all, fields(restaurant_id = %restaurant.id))]
    pub async fn toggle_favorite(&self, restaurant: RestaurantSnapshot) -> bool {
        let mut state = self.lock().await;
        if state.is_favorite(&restaurant.id) {
            self.remove_favorite_locked(&mut state, &restaurant.id).await
        } else {
            self.add_favorite_locked(&mut state, restaurant).await
        }
    }

    async fn add_favorite_locked(
        &self,
        state: &mut StoreState,
        restaurant: RestaurantSnapshot,
    ) -> bool {
        let Some(partition) = state.partition.clone() else {
            debug!("Not signed in");
            return false;
        };
        if state.is_favorite(&restaurant.id) {
            debug!("Already a favorite");
            return false;
        }

        state.favorites.push(FavoriteEntry {
            restaurant,
            added_at: Utc::now(),
            user_id: partition,
        });
        self.persist_favorites(state).await;
        true
    }

    async fn remove_favorite_locked(
        &self,
        state: &mut StoreState,
        restaurant_id: &RestaurantId,
    ) -> bool {
        let Some(partition) = state.partition.clone() else {
            return false;
        };

        let before = state.favorites.len();
        state
            .favorites
            .retain(|f| !(f.user_id == partition && &f.restaurant.id == restaurant_id));
        debug!(removed = before - state.favorites.len(), "Favorite removed");
        self.persist_favorites(state).await;
        true
    }
}
