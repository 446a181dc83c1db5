//! The Session & Collection Store.
//!
//! # Architecture
//!
//! [`UserDataStore`] is the single owner of the signed-in session, its token
//! and the user's favorites and orders. It is cheap to clone; all clones share
//! one state behind an async mutex.
//!
//! - Every mutation is read-modify-write on the in-memory collections,
//!   followed by a full rewrite of the affected partition in device storage,
//!   all under the state lock. Two quick toggles therefore persist in order.
//! - Storage is best-effort: failures are logged at `warn` and the in-memory
//!   state stays authoritative for the session.
//! - Remote calls are made without holding the lock.
//! - [`UserDataStore::changes`] ticks whenever the session or the order set
//!   changes; [`crate::reconcile`] follows it.
//!
//! Operations are split by concern: [`favorites`], [`orders`] and [`sync`]
//! (retrying local orders and pulling statuses from the order history).

mod favorites;
mod orders;
mod sync;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info, instrument, warn};

use kaptaze_core::BackendOrderId;

use crate::api::OrderApi;
use crate::error::ClientError;
use crate::models::{AuthToken, FavoriteEntry, OrderRecord, PartitionKey, UserSession, UserStats};
use crate::storage::{KeyValueStorage, StorageKey};

/// Store behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Delete the user's favorites and orders from device storage on logout.
    ///
    /// When disabled, a user who signs in again on the same device finds
    /// their collections where they left them.
    pub purge_partition_on_logout: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            purge_partition_on_logout: true,
        }
    }
}

/// Session, favorites and orders of the signed-in user.
#[derive(Clone)]
pub struct UserDataStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    storage: Arc<dyn KeyValueStorage>,
    api: Arc<dyn OrderApi>,
    options: StoreOptions,
    state: Mutex<StoreState>,
    /// Held for the whole of a [`UserDataStore::sync_local_orders`] pass.
    sync_pass: Mutex<()>,
    changes: watch::Sender<u64>,
}

/// Everything behind the lock.
///
/// `favorites` and `orders` hold the loaded partition; projections still
/// filter by partition key so that a record can never leak across users.
struct StoreState {
    current_user: Option<UserSession>,
    partition: Option<PartitionKey>,
    token: Option<AuthToken>,
    favorites: Vec<FavoriteEntry>,
    orders: Vec<OrderRecord>,
    is_loading: bool,
}

impl StoreState {
    const fn new() -> Self {
        Self {
            current_user: None,
            partition: None,
            token: None,
            favorites: Vec::new(),
            orders: Vec::new(),
            is_loading: true,
        }
    }

    fn user_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        let key = self.partition.as_ref();
        self.orders
            .iter()
            .filter(move |order| Some(&order.user_id) == key)
    }

    fn user_favorites(&self) -> impl Iterator<Item = &FavoriteEntry> {
        let key = self.partition.as_ref();
        self.favorites
            .iter()
            .filter(move |favorite| Some(&favorite.user_id) == key)
    }
}

impl std::fmt::Debug for UserDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataStore")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl UserDataStore {
    /// Create a store. Call [`Self::bootstrap`] before use.
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        api: Arc<dyn OrderApi>,
        options: StoreOptions,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                storage,
                api,
                options,
                state: Mutex::new(StoreState::new()),
                sync_pass: Mutex::new(()),
                changes,
            }),
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Restore the previous session from device storage.
    ///
    /// Never fails: unreadable entries leave the store signed out. Loading is
    /// over when this returns, whatever the outcome.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) {
        let mut state = self.lock().await;

        let user = self
            .read_json::<UserSession>(&StorageKey::CurrentUser)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to restore session");
                None
            });
        let token = self
            .inner
            .storage
            .get(&StorageKey::UserToken.to_string())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to restore token");
                None
            })
            .filter(|raw| !raw.is_empty())
            .map(AuthToken::new);

        state.token = token;
        if let Some(user) = user {
            self.enter_session(&mut state, user).await;
            info!(user = ?state.partition, "Session restored");
        } else {
            debug!("No stored session");
        }

        state.is_loading = false;
        drop(state);
        self.notify();
    }

    /// Whether [`Self::bootstrap`] has not finished yet.
    pub async fn is_loading(&self) -> bool {
        self.lock().await.is_loading
    }

    /// The signed-in user.
    pub async fn current_user(&self) -> Option<UserSession> {
        self.lock().await.current_user.clone()
    }

    /// The bearer token, if one is set.
    pub async fn token(&self) -> Option<AuthToken> {
        self.lock().await.token.clone()
    }

    /// Partition of the signed-in user.
    pub async fn partition_key(&self) -> Option<PartitionKey> {
        self.lock().await.partition.clone()
    }

    /// Replace the signed-in user and optionally the token.
    ///
    /// A `None` token leaves the current token untouched. Setting a user loads
    /// that user's collections, replacing whatever was in memory; setting
    /// `None` clears the stored session record.
    #[instrument(skip_all, fields(user = ?user.as_ref().and_then(UserSession::partition_key)))]
    pub async fn set_user(&self, user: Option<UserSession>, token: Option<AuthToken>) {
        let mut state = self.lock().await;

        if let Some(token) = token {
            if let Err(e) = self
                .inner
                .storage
                .set(&StorageKey::UserToken.to_string(), token.expose())
                .await
            {
                warn!(error = %e, "Failed to persist token");
            }
            state.token = Some(token);
        }

        match user {
            Some(user) => {
                if let Err(e) = self.write_json(&StorageKey::CurrentUser, &user).await {
                    warn!(error = %e, "Failed to persist session");
                }
                self.enter_session(&mut state, user).await;
                info!(user = ?state.partition, "Signed in");
            }
            None => {
                if let Err(e) = self
                    .inner
                    .storage
                    .remove(&StorageKey::CurrentUser.to_string())
                    .await
                {
                    warn!(error = %e, "Failed to clear session");
                }
                state.current_user = None;
                state.partition = None;
                state.favorites.clear();
                state.orders.clear();
                info!("Session cleared");
            }
        }

        drop(state);
        self.notify();
    }

    /// Sign out.
    ///
    /// Clears the session, token and in-memory collections and deletes the
    /// stored session and token. The user's stored collections are deleted
    /// too unless [`StoreOptions::purge_partition_on_logout`] is off.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let mut state = self.lock().await;
        let partition = state.partition.take();

        state.current_user = None;
        state.token = None;
        state.favorites.clear();
        state.orders.clear();

        let mut keys = vec![
            StorageKey::CurrentUser.to_string(),
            StorageKey::UserToken.to_string(),
        ];
        if self.inner.options.purge_partition_on_logout
            && let Some(partition) = &partition
        {
            keys.extend(StorageKey::partition(partition).iter().map(ToString::to_string));
        }
        if let Err(e) = self.inner.storage.multi_remove(&keys).await {
            warn!(error = %e, "Failed to clear stored session");
        }

        drop(state);
        info!(user = ?partition, "Signed out");
        self.notify();
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// The signed-in user's orders, newest first. Empty when signed out.
    pub async fn user_orders(&self) -> Vec<OrderRecord> {
        self.lock().await.user_orders().cloned().collect()
    }

    /// The signed-in user's favorites. Empty when signed out.
    pub async fn user_favorites(&self) -> Vec<FavoriteEntry> {
        self.lock().await.user_favorites().cloned().collect()
    }

    /// Impact statistics over the signed-in user's orders.
    pub async fn user_stats(&self) -> UserStats {
        UserStats::from_orders(self.lock().await.user_orders())
    }

    /// Backend IDs of the signed-in user's synced orders.
    pub async fn backend_order_ids(&self) -> Vec<BackendOrderId> {
        self.lock()
            .await
            .user_orders()
            .filter_map(|order| order.backend_order_id.clone())
            .collect()
    }

    /// Receiver that ticks on every session or order change.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().await
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|tick| *tick = tick.wrapping_add(1));
    }

    /// Make `user` current and load their partition.
    async fn enter_session(&self, state: &mut StoreState, user: UserSession) {
        let partition = PartitionKey::for_user(&user);
        state.current_user = Some(user);
        state.favorites.clear();
        state.orders.clear();

        let Some(partition) = partition else {
            warn!("Signed-in user has neither email nor id; collections disabled");
            state.partition = None;
            return;
        };

        state.favorites = self.load_partition(&StorageKey::Favorites(partition.clone()), &partition).await;
        state.orders = self.load_partition(&StorageKey::Orders(partition.clone()), &partition).await;
        debug!(
            user = %partition,
            favorites = state.favorites.len(),
            orders = state.orders.len(),
            "Partition loaded"
        );
        state.partition = Some(partition);
    }

    /// Read one partitioned collection, stamping every record with `partition`.
    ///
    /// Records written by older app versions may carry the user's ID instead
    /// of the key they are stored under.
    async fn load_partition<T>(&self, key: &StorageKey, partition: &PartitionKey) -> Vec<T>
    where
        T: DeserializeOwned + Partitioned,
    {
        match self.read_json::<Vec<T>>(key).await {
            Ok(records) => records
                .unwrap_or_default()
                .into_iter()
                .map(|mut record| {
                    record.set_partition(partition);
                    record
                })
                .collect(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load collection");
                Vec::new()
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        key: &StorageKey,
    ) -> Result<Option<T>, ClientError> {
        match self.inner.storage.get(&key.to_string()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized + Sync>(
        &self,
        key: &StorageKey,
        value: &T,
    ) -> Result<(), ClientError> {
        let raw = serde_json::to_string(value)?;
        self.inner.storage.set(&key.to_string(), &raw).await?;
        Ok(())
    }

    /// Persist the current partition's favorites.
    async fn persist_favorites(&self, state: &StoreState) {
        let Some(partition) = &state.partition else {
            return;
        };
        let favorites: Vec<&FavoriteEntry> = state.user_favorites().collect();
        if let Err(e) = self
            .write_json(&StorageKey::Favorites(partition.clone()), &favorites)
            .await
        {
            warn!(user = %partition, error = %e, "Failed to persist favorites");
        }
    }

    /// Persist the current partition's orders.
    async fn persist_orders(&self, state: &StoreState) {
        let Some(partition) = &state.partition else {
            return;
        };
        let orders: Vec<&OrderRecord> = state.user_orders().collect();
        if let Err(e) = self
            .write_json(&StorageKey::Orders(partition.clone()), &orders)
            .await
        {
            warn!(user = %partition, error = %e, "Failed to persist orders");
        }
    }
}

/// Records stored under a partition key.
trait Partitioned {
    fn set_partition(&mut self, partition: &PartitionKey);
}

impl Partitioned for FavoriteEntry {
    fn set_partition(&mut self, partition: &PartitionKey) {
        partition.clone_into(&mut self.user_id);
    }
}

impl Partitioned for OrderRecord {
    fn set_partition(&mut self, partition: &PartitionKey) {
        partition.clone_into(&mut self.user_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use kaptaze_core::{Email, Money, OrderStatus, PaymentMethod, UserId};

    use super::*;
    use crate::api::{ApiError, CreateOrderPayload, CreatedOrder, RemoteOrderStatus};
    use crate::models::{OrderInput, PackageSnapshot, RestaurantSnapshot};
    use crate::storage::MemoryStorage;

    /// Scripted backend: numbered order IDs while online.
    #[derive(Default)]
    pub struct FakeApi {
        pub offline: AtomicBool,
        pub created: AtomicUsize,
        pub create_delay_ms: AtomicU64,
        pub history: std::sync::Mutex<Vec<RemoteOrderStatus>>,
        pub status_calls: std::sync::Mutex<Vec<(String, OrderStatus)>>,
        pub reviews: std::sync::Mutex<Vec<(String, u8)>>,
    }

    #[async_trait]
    impl OrderApi for FakeApi {
        async fn create_order(
            &self,
            _payload: &CreateOrderPayload,
        ) -> Result<CreatedOrder, ApiError> {
            let delay = self.create_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(ApiError::Rejected("offline".to_string()));
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CreatedOrder {
                backend_order_id: BackendOrderId::new(format!("ORD-{n}")),
            })
        }

        async fn update_order_status(
            &self,
            order_id: &BackendOrderId,
            status: OrderStatus,
            _note: &str,
        ) -> Result<(), ApiError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ApiError::Rejected("offline".to_string()));
            }
            self.status_calls
                .lock()
                .unwrap()
                .push((order_id.to_string(), status));
            Ok(())
        }

        async fn add_review(
            &self,
            order_id: &BackendOrderId,
            rating: u8,
            _comment: &str,
        ) -> Result<(), ApiError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ApiError::Rejected("offline".to_string()));
            }
            self.reviews
                .lock()
                .unwrap()
                .push((order_id.to_string(), rating));
            Ok(())
        }

        async fn customer_orders(
            &self,
            _customer_id: &UserId,
        ) -> Result<Vec<RemoteOrderStatus>, ApiError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ApiError::Rejected("offline".to_string()));
            }
            Ok(self.history.lock().unwrap().clone())
        }
    }

    pub fn harness(options: StoreOptions) -> (UserDataStore, Arc<MemoryStorage>, Arc<FakeApi>) {
        let storage = Arc::new(MemoryStorage::new());
        let api = Arc::new(FakeApi::default());
        let store = UserDataStore::new(storage.clone(), api.clone(), options);
        (store, storage, api)
    }

    pub fn user(email: &str) -> UserSession {
        UserSession::with_email(Email::parse(email).unwrap())
    }

    pub fn order_input(total: i64, original: i64, quantity: u32) -> OrderInput {
        OrderInput {
            restaurant: RestaurantSnapshot::new("r1", "Cafe"),
            package: PackageSnapshot::new(
                "p1",
                "Surprise Bag",
                Money::from_whole(original),
                Money::from_whole(total),
            ),
            quantity,
            total_price: Money::from_whole(total),
            original_price: Money::from_whole(original),
            payment_method: PaymentMethod::Cash,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_empty_storage() {
        let (store, _, _) = harness(StoreOptions::default());
        assert!(store.is_loading().await);
        store.bootstrap().await;
        assert!(!store.is_loading().await);
        assert!(store.current_user().await.is_none());
        assert!(store.user_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_restores_session_and_partition() {
        let (store, storage, _) = harness(StoreOptions::default());
        store
            .set_user(Some(user("a@x.com")), Some(AuthToken::new("tok")))
            .await;
        store
            .add_to_favorites(RestaurantSnapshot::new("r1", "Cafe"))
            .await;

        let restored = UserDataStore::new(storage, Arc::new(FakeApi::default()), StoreOptions::default());
        restored.bootstrap().await;
        assert_eq!(
            restored.partition_key().await.unwrap().as_str(),
            "a@x.com"
        );
        assert_eq!(restored.token().await.unwrap().expose(), "tok");
        assert_eq!(restored.user_favorites().await.len(), 1);
    }

    #[tokio::test]
    async fn test_token_is_stored_raw() {
        let (store, storage, _) = harness(StoreOptions::default());
        store
            .set_user(Some(user("a@x.com")), Some(AuthToken::new("eyJ.raw")))
            .await;
        assert_eq!(
            storage.get("@kaptaze_user_token").await.unwrap().as_deref(),
            Some("eyJ.raw")
        );
    }

    #[tokio::test]
    async fn test_bootstrap_survives_corrupt_session() {
        let (store, storage, _) = harness(StoreOptions::default());
        storage.set("@kaptaze_current_user", "{oops").await.unwrap();
        store.bootstrap().await;
        assert!(!store.is_loading().await);
        assert!(store.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_set_user_none_keeps_token() {
        let (store, storage, _) = harness(StoreOptions::default());
        store
            .set_user(Some(user("a@x.com")), Some(AuthToken::new("tok")))
            .await;
        store.set_user(None, None).await;

        assert!(store.current_user().await.is_none());
        assert!(store.token().await.is_some());
        assert!(!storage.contains_key("@kaptaze_current_user").await);
    }

    #[tokio::test]
    async fn test_legacy_records_are_restamped() {
        let (store, storage, _) = harness(StoreOptions::default());
        let favorites = serde_json::json!([{
            "restaurant": {"id": "r1", "name": "Cafe"},
            "addedAt": "2025-05-01T10:00:00Z",
            "userId": "u-legacy"
        }]);
        storage
            .set("@kaptaze_favorites_a@x.com", &favorites.to_string())
            .await
            .unwrap();

        store.set_user(Some(user("a@x.com")), None).await;
        let loaded = store.user_favorites().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].user_id.as_str(), "a@x.com");
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_memory_state() {
        let (store, storage, _) = harness(StoreOptions::default());
        store.set_user(Some(user("a@x.com")), None).await;
        storage.set_fail_writes(true);

        assert!(
            store
                .add_to_favorites(RestaurantSnapshot::new("r1", "Cafe"))
                .await
        );
        assert!(store.is_favorite(&"r1".into()).await);
        store.logout().await;
        assert!(store.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_changes_tick_on_session_change() {
        let (store, _, _) = harness(StoreOptions::default());
        let mut changes = store.changes();
        store.set_user(Some(user("a@x.com")), None).await;
        assert!(changes.has_changed().unwrap());
        changes.mark_unchanged();
        store.logout().await;
        assert!(changes.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_user_without_identity_has_no_collections() {
        let (store, storage, _) = harness(StoreOptions::default());
        store.set_user(Some(UserSession::default()), None).await;
        assert!(store.current_user().await.is_some());
        assert!(
            !store
                .add_to_favorites(RestaurantSnapshot::new("r1", "Cafe"))
                .await
        );
        assert!(store.add_order(order_input(50, 90, 1)).await.is_none());
        assert_eq!(storage.keys().await, vec!["@kaptaze_current_user".to_string()]);
    }
}
