//! Order submission and status changes.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use kaptaze_core::{BackendOrderId, OrderId, OrderStatus};

use super::{StoreState, UserDataStore};
use crate::api::CreateOrderPayload;
use crate::models::{OrderInput, OrderRating, OrderRecord, PickupCode};
use crate::storage::StorageKey;

/// Outcome of applying a status to one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Transition {
    Applied,
    Unchanged,
    Rejected,
}

impl Transition {
    const fn accepted(self) -> bool {
        matches!(self, Self::Applied | Self::Unchanged)
    }
}

pub(super) fn apply_status(order: &mut OrderRecord, next: OrderStatus) -> Transition {
    if order.status == next {
        return Transition::Unchanged;
    }
    if !order.status.can_transition_to(next) {
        warn!(
            order_id = %order.id,
            from = %order.status,
            to = %next,
            "Rejected status transition"
        );
        return Transition::Rejected;
    }
    debug!(order_id = %order.id, from = %order.status, to = %next, "Order status changed");
    order.status = next;
    Transition::Applied
}

impl StoreState {
    pub(super) fn order_mut(&mut self, id: &OrderId) -> Option<&mut OrderRecord> {
        let key = self.partition.as_ref()?;
        self.orders
            .iter_mut()
            .find(|order| &order.user_id == key && &order.id == id)
    }
}

impl UserDataStore {
    /// Place an order optimistically.
    ///
    /// The backend is asked to create the order first. Whatever it answers,
    /// a record is committed locally, prepended to the user's orders and
    /// persisted before this returns. A failed remote call yields a
    /// `local_only` record without a backend ID. Returns `None` only when
    /// nobody is signed in.
    #[instrument(skip_all, fields(restaurant_id = %input.restaurant.id, quantity = input.quantity))]
    pub async fn add_order(&self, input: OrderInput) -> Option<OrderRecord> {
        let (user, partition) = {
            let state = self.lock().await;
            let user = state.current_user.clone()?;
            let partition = state.partition.clone()?;
            (user, partition)
        };

        let pickup_code = PickupCode::generate(&mut rand::rng());
        let payload = CreateOrderPayload::build(&user, &input, &pickup_code);

        let backend_order_id = match self.inner.api.create_order(&payload).await {
            Ok(created) => Some(created.backend_order_id),
            Err(e) => {
                warn!(error = %e, "Order creation failed; keeping local_only record");
                None
            }
        };

        let record = OrderRecord::assemble(partition, input, pickup_code, backend_order_id, Utc::now());

        let mut state = self.lock().await;
        if state.partition.as_ref() == Some(&record.user_id) {
            state.orders.insert(0, record.clone());
            self.persist_orders(&state).await;
        } else {
            self.persist_orphan(&record).await;
        }
        drop(state);

        info!(
            order_id = %record.id,
            pickup_code = %record.pickup_code,
            local_only = record.local_only,
            "Order placed"
        );
        self.notify();
        Some(record)
    }

    /// Write a record whose user signed out or switched while it was being
    /// submitted straight into that user's stored partition.
    async fn persist_orphan(&self, record: &OrderRecord) {
        let key = StorageKey::Orders(record.user_id.clone());
        let mut stored: Vec<OrderRecord> = match self.read_json(&key).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                warn!(key = %key, error = %e, "Stored orders unreadable; rewriting");
                Vec::new()
            }
        };
        stored.insert(0, record.clone());
        if let Err(e) = self.write_json(&key, &stored).await {
            warn!(key = %key, error = %e, "Failed to persist order");
        }
        debug!(user = %record.user_id, "Order stored for a user no longer signed in");
    }

    /// Set the status of one of the signed-in user's orders by local ID.
    ///
    /// Re-applying the current status is a no-op that still returns `true`.
    /// Returns `false` for an unknown order or an invalid transition; neither
    /// changes anything.
    #[instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: &OrderId, status: OrderStatus) -> bool {
        let mut state = self.lock().await;
        let Some(order) = state.order_mut(order_id) else {
            debug!("Unknown order");
            return false;
        };

        let outcome = apply_status(order, status);
        if outcome == Transition::Applied {
            self.persist_orders(&state).await;
            drop(state);
            self.notify();
        }
        outcome.accepted()
    }

    /// Apply a status reported by the backend for `backend_order_id`.
    ///
    /// Matches on the backend ID, not the local ID. Unknown orders are
    /// ignored and never created.
    #[instrument(skip(self))]
    pub async fn apply_remote_status(
        &self,
        backend_order_id: &BackendOrderId,
        status: OrderStatus,
    ) -> bool {
        let mut state = self.lock().await;
        let Some(key) = state.partition.clone() else {
            return false;
        };
        let Some(order) = state.orders.iter_mut().find(|order| {
            order.user_id == key && order.backend_order_id.as_ref() == Some(backend_order_id)
        }) else {
            debug!("Status update for unknown order ignored");
            return false;
        };

        let outcome = apply_status(order, status);
        if outcome == Transition::Applied {
            self.persist_orders(&state).await;
            drop(state);
            self.notify();
        }
        outcome.accepted()
    }

    /// Cancel a pending order.
    ///
    /// The backend is notified best-effort when the order is synced. Returns
    /// `false` if the order is unknown or no longer pending.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: &OrderId) -> bool {
        self.user_transition(
            order_id,
            &[OrderStatus::Pending],
            OrderStatus::Cancelled,
            "Cancelled by customer",
        )
        .await
    }

    /// Mark an order as picked up.
    ///
    /// Valid from `pending`, `confirmed` and `ready`; the backend is notified
    /// best-effort when the order is synced.
    #[instrument(skip(self))]
    pub async fn mark_received(&self, order_id: &OrderId) -> bool {
        self.user_transition(
            order_id,
            &[
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Ready,
            ],
            OrderStatus::Completed,
            "Picked up by customer",
        )
        .await
    }

    async fn user_transition(
        &self,
        order_id: &OrderId,
        allowed_from: &[OrderStatus],
        next: OrderStatus,
        note: &str,
    ) -> bool {
        let mut state = self.lock().await;
        let Some(order) = state.order_mut(order_id) else {
            debug!("Unknown order");
            return false;
        };
        if !allowed_from.contains(&order.status) {
            debug!(status = %order.status, "Order not in a state for this action");
            return false;
        }
        if apply_status(order, next) != Transition::Applied {
            return false;
        }
        let backend_order_id = order.backend_order_id.clone();
        self.persist_orders(&state).await;
        drop(state);
        self.notify();

        if let Some(backend_order_id) = backend_order_id
            && let Err(e) = self
                .inner
                .api
                .update_order_status(&backend_order_id, next, note)
                .await
        {
            warn!(backend_order_id = %backend_order_id, error = %e, "Failed to report status to backend");
        }
        true
    }

    /// Rate a completed order from 1 to 5 stars.
    ///
    /// The rating is kept on the record even if sending it to the backend
    /// fails. Returns `false` for an out-of-range rating, an unknown order,
    /// an order that is not completed, or one already rated.
    #[instrument(skip(self, comment))]
    pub async fn submit_rating(&self, order_id: &OrderId, stars: u8, comment: &str) -> bool {
        if !(1..=5).contains(&stars) {
            debug!("Rating out of range");
            return false;
        }

        let mut state = self.lock().await;
        let Some(order) = state.order_mut(order_id) else {
            return false;
        };
        if order.status != OrderStatus::Completed || order.rating.is_some() {
            debug!(status = %order.status, rated = order.rating.is_some(), "Order cannot be rated");
            return false;
        }

        let comment = comment.trim().to_owned();
        order.rating = Some(OrderRating {
            stars,
            comment: comment.clone(),
            rated_at: Utc::now(),
        });
        let backend_order_id = order.backend_order_id.clone();
        self.persist_orders(&state).await;
        drop(state);

        if let Some(backend_order_id) = backend_order_id
            && let Err(e) = self
                .inner
                .api
                .add_review(&backend_order_id, stars, &comment)
                .await
        {
            warn!(backend_order_id = %backend_order_id, error = %e, "Failed to send review");
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use kaptaze_core::Money;

    use super::super::StoreOptions;
    use super::super::tests::{harness, order_input, user};
    use super::*;
    use crate::storage::KeyValueStorage;

    #[tokio::test]
    async fn test_add_order_requires_user() {
        let (store, _, api) = harness(StoreOptions::default());
        assert!(store.add_order(order_input(50, 90, 2)).await.is_none());
        assert_eq!(api.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_order_online() {
        let (store, storage, _) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;

        let record = store.add_order(order_input(60, 100, 1)).await.unwrap();
        assert!(!record.local_only);
        assert_eq!(record.backend_order_id.as_ref().unwrap().as_str(), "ORD-1");
        assert_eq!(record.id.as_str(), "ORD-1");
        assert_eq!(record.savings, Money::from_whole(40));
        assert_eq!(record.status, OrderStatus::Pending);
        assert_eq!(record.pickup_time, "18:00-21:00");
        assert!(record.pickup_code.as_str().starts_with("KB"));

        let stored = storage.get("@kaptaze_orders_a@x.com").await.unwrap().unwrap();
        let stored: Vec<OrderRecord> = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[tokio::test]
    async fn test_add_order_offline_is_local_only() {
        let (store, _, api) = harness(StoreOptions::default());
        api.offline.store(true, Ordering::SeqCst);
        store.set_user(Some(user("a@x.com")), None).await;

        let record = store.add_order(order_input(50, 90, 2)).await.unwrap();
        assert!(record.local_only);
        assert!(record.backend_order_id.is_none());
        assert!(record.id.as_str().starts_with("order_"));
        assert_eq!(store.user_orders().await[0], record);
    }

    #[tokio::test]
    async fn test_newest_order_first() {
        let (store, _, _) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        let first = store.add_order(order_input(50, 90, 1)).await.unwrap();
        let second = store.add_order(order_input(30, 60, 1)).await.unwrap();

        let ids: Vec<OrderId> = store.user_orders().await.into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_update_status_twice() {
        let (store, _, _) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        let record = store.add_order(order_input(50, 90, 1)).await.unwrap();

        assert!(store.update_order_status(&record.id, OrderStatus::Ready).await);
        assert!(store.update_order_status(&record.id, OrderStatus::Ready).await);

        let orders = store.user_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn test_update_status_rejects_backwards_and_unknown() {
        let (store, _, _) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        let record = store.add_order(order_input(50, 90, 1)).await.unwrap();

        assert!(store.update_order_status(&record.id, OrderStatus::Completed).await);
        assert!(!store.update_order_status(&record.id, OrderStatus::Ready).await);
        assert!(!store.update_order_status(&"nope".into(), OrderStatus::Ready).await);
        assert_eq!(store.user_orders().await[0].status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_remote_status_matches_backend_id() {
        let (store, _, _) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        let record = store.add_order(order_input(50, 90, 1)).await.unwrap();
        let backend_id = record.backend_order_id.clone().unwrap();

        assert!(store.apply_remote_status(&backend_id, OrderStatus::Confirmed).await);
        assert!(
            !store
                .apply_remote_status(&BackendOrderId::new("ORD-404"), OrderStatus::Ready)
                .await
        );
        let orders = store.user_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_only_from_pending() {
        let (store, _, api) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        let record = store.add_order(order_input(50, 90, 1)).await.unwrap();

        assert!(store.cancel_order(&record.id).await);
        assert!(!store.cancel_order(&record.id).await);
        assert_eq!(store.user_orders().await[0].status, OrderStatus::Cancelled);
        assert_eq!(
            api.status_calls.lock().unwrap().as_slice(),
            &[("ORD-1".to_string(), OrderStatus::Cancelled)]
        );

        let other = store.add_order(order_input(50, 90, 1)).await.unwrap();
        store.update_order_status(&other.id, OrderStatus::Confirmed).await;
        assert!(!store.cancel_order(&other.id).await);
    }

    #[tokio::test]
    async fn test_mark_received_local_only_skips_backend() {
        let (store, _, api) = harness(StoreOptions::default());
        api.offline.store(true, Ordering::SeqCst);
        store.set_user(Some(user("a@x.com")), None).await;
        let record = store.add_order(order_input(50, 90, 1)).await.unwrap();
        api.offline.store(false, Ordering::SeqCst);

        assert!(store.mark_received(&record.id).await);
        assert!(!store.mark_received(&record.id).await);
        assert_eq!(store.user_orders().await[0].status, OrderStatus::Completed);
        assert!(api.status_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rating() {
        let (store, _, api) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        let record = store.add_order(order_input(50, 90, 1)).await.unwrap();

        assert!(!store.submit_rating(&record.id, 5, "").await);
        store.mark_received(&record.id).await;
        assert!(!store.submit_rating(&record.id, 0, "").await);
        assert!(!store.submit_rating(&record.id, 6, "").await);

        api.offline.store(true, Ordering::SeqCst);
        assert!(store.submit_rating(&record.id, 4, " Lezzetli ").await);
        assert!(!store.submit_rating(&record.id, 5, "").await);

        let rating = store.user_orders().await[0].rating.clone().unwrap();
        assert_eq!(rating.stars, 4);
        assert_eq!(rating.comment, "Lezzetli");
        assert!(api.reviews.lock().unwrap().is_empty());
    }
}
