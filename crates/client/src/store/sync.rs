//! Reconciliation with the backend outside the push channel: retrying
//! `local_only` orders and pulling statuses from the order history.

use tracing::{debug, info, instrument, warn};

use kaptaze_core::{BackendOrderId, OrderId};

use super::UserDataStore;
use super::orders::{Transition, apply_status};
use crate::api::CreateOrderPayload;
use crate::models::{OrderRecord, PartitionKey};
use crate::storage::StorageKey;

fn mark_synced(order: &mut OrderRecord, backend_order_id: &BackendOrderId) -> bool {
    if !order.local_only {
        return false;
    }
    order.backend_order_id = Some(backend_order_id.clone());
    order.local_only = false;
    true
}

impl UserDataStore {
    /// Retry remote creation of the signed-in user's `local_only` orders.
    ///
    /// Each order that the backend accepts gets its backend ID and loses the
    /// `local_only` flag; its local ID and pickup code stay as they were.
    /// Orders that fail again are left untouched for the next pass. Only one
    /// pass runs at a time; a call made while another is in flight returns 0
    /// without contacting the backend. Returns how many orders were synced.
    #[instrument(skip(self))]
    pub async fn sync_local_orders(&self) -> usize {
        let Ok(_pass) = self.inner.sync_pass.try_lock() else {
            debug!("Sync already in progress");
            return 0;
        };

        let (user, partition, pending) = {
            let state = self.lock().await;
            let (Some(user), Some(partition)) =
                (state.current_user.clone(), state.partition.clone())
            else {
                return 0;
            };
            let pending: Vec<OrderRecord> = state
                .user_orders()
                .filter(|order| order.local_only)
                .cloned()
                .collect();
            (user, partition, pending)
        };

        if pending.is_empty() {
            return 0;
        }
        debug!(count = pending.len(), "Syncing local orders");

        let mut accepted: Vec<(OrderId, BackendOrderId)> = Vec::with_capacity(pending.len());
        for order in &pending {
            let payload = CreateOrderPayload::build(&user, &order.to_input(), &order.pickup_code);
            match self.inner.api.create_order(&payload).await {
                Ok(created) => accepted.push((order.id.clone(), created.backend_order_id)),
                Err(e) => warn!(order_id = %order.id, error = %e, "Order still not accepted"),
            }
        }
        if accepted.is_empty() {
            return 0;
        }

        let mut state = self.lock().await;
        if state.partition.as_ref() != Some(&partition) {
            drop(state);
            return self.mark_synced_in_storage(&partition, &accepted).await;
        }

        let mut synced = 0;
        for (order_id, backend_order_id) in &accepted {
            if let Some(order) = state.order_mut(order_id)
                && mark_synced(order, backend_order_id)
            {
                synced += 1;
            }
        }

        if synced > 0 {
            self.persist_orders(&state).await;
            drop(state);
            self.notify();
            info!(synced, "Local orders synced");
        }
        synced
    }

    /// Pull the signed-in user's order history and apply its statuses.
    ///
    /// Orders are matched by backend ID and follow the same transition rules
    /// as pushed updates; history entries unknown on this device are ignored.
    /// Needs a user with a backend ID, since that is what the history is
    /// keyed by. Returns how many orders changed status.
    #[instrument(skip(self))]
    pub async fn refresh_order_statuses(&self) -> usize {
        let (customer_id, partition) = {
            let state = self.lock().await;
            let Some(partition) = state.partition.clone() else {
                return 0;
            };
            let Some(customer_id) = state.current_user.as_ref().and_then(|u| u.id.clone()) else {
                debug!("Signed-in user has no backend ID; order history unavailable");
                return 0;
            };
            (customer_id, partition)
        };

        let remote = match self.inner.api.customer_orders(&customer_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "Failed to fetch order history");
                return 0;
            }
        };

        let mut state = self.lock().await;
        if state.partition.as_ref() != Some(&partition) {
            debug!(user = %partition, "Session changed while fetching order history");
            return 0;
        }

        let mut changed = 0;
        for entry in &remote {
            let Some(order) = state.orders.iter_mut().find(|order| {
                order.user_id == partition
                    && order.backend_order_id.as_ref() == Some(&entry.backend_order_id)
            }) else {
                continue;
            };
            if apply_status(order, entry.status) == Transition::Applied {
                changed += 1;
            }
        }

        if changed > 0 {
            self.persist_orders(&state).await;
            drop(state);
            self.notify();
            info!(changed, "Order statuses refreshed from history");
        }
        changed
    }

    /// Record accepted orders of a user who signed out during the pass.
    async fn mark_synced_in_storage(
        &self,
        partition: &PartitionKey,
        accepted: &[(OrderId, BackendOrderId)],
    ) -> usize {
        let key = StorageKey::Orders(partition.clone());
        let mut stored: Vec<OrderRecord> = match self.read_json(&key).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                warn!(key = %key, error = %e, "Stored orders unreadable; sync result lost");
                return 0;
            }
        };

        let mut synced = 0;
        for (order_id, backend_order_id) in accepted {
            if let Some(order) = stored.iter_mut().find(|o| &o.id == order_id)
                && mark_synced(order, backend_order_id)
            {
                synced += 1;
            }
        }
        if synced > 0
            && let Err(e) = self.write_json(&key, &stored).await
        {
            warn!(key = %key, error = %e, "Failed to persist synced orders");
        }
        debug!(user = %partition, synced, "Synced orders of a user no longer signed in");
        synced
    }
}
