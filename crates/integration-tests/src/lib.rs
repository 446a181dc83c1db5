//! Integration tests for the KapTaze client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p kaptaze-integration-tests
//! ```
//!
//! Everything runs in-process: device storage is `MemoryStorage` (or
//! `FileStorage` on a temporary directory), the backend is [`ScriptedApi`],
//! and the push channel is `MemoryChannel`.
//!
//! # Test Categories
//!
//! - `session_partitions` - sign-in, logout and per-user isolation
//! - `favorites` - favorite uniqueness and toggling
//! - `orders` - optimistic submission, status transitions, statistics
//! - `status_reconciliation` - pushed status updates end to end

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use kaptaze_client::api::{ApiError, CreateOrderPayload, CreatedOrder, OrderApi, RemoteOrderStatus};
use kaptaze_client::models::{OrderInput, PackageSnapshot, RestaurantSnapshot, UserSession};
use kaptaze_client::push::MemoryChannel;
use kaptaze_client::storage::{KeyValueStorage, MemoryStorage};
use kaptaze_client::{StoreOptions, UserDataStore};
use kaptaze_core::{BackendOrderId, Email, Money, OrderStatus, PaymentMethod, UserId};

/// How long [`eventually`] polls before giving up.
pub const WAIT: Duration = Duration::from_secs(5);

const POLL: Duration = Duration::from_millis(10);

// =============================================================================
// Scripted backend
// =============================================================================

/// Backend double: hands out `ORD-<n>` IDs while online, refuses everything
/// while offline, records what it was sent and serves a scripted order
/// history.
#[derive(Debug)]
pub struct ScriptedApi {
    online: AtomicBool,
    next_id: AtomicUsize,
    created: Mutex<Vec<CreateOrderPayload>>,
    status_updates: Mutex<Vec<(BackendOrderId, OrderStatus)>>,
    reviews: Mutex<Vec<(BackendOrderId, u8)>>,
    history: Mutex<Vec<RemoteOrderStatus>>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            next_id: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            status_updates: Mutex::new(Vec::new()),
            reviews: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedApi {
    /// Switch the backend between reachable and unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Payloads of every accepted create request.
    pub async fn created(&self) -> Vec<CreateOrderPayload> {
        self.created.lock().await.clone()
    }

    /// Every accepted status update.
    pub async fn status_updates(&self) -> Vec<(BackendOrderId, OrderStatus)> {
        self.status_updates.lock().await.clone()
    }

    /// Every accepted review.
    pub async fn reviews(&self) -> Vec<(BackendOrderId, u8)> {
        self.reviews.lock().await.clone()
    }

    /// Replace the order history served to every customer.
    pub async fn set_history(&self, history: Vec<(&str, OrderStatus)>) {
        *self.history.lock().await = history
            .into_iter()
            .map(|(id, status)| RemoteOrderStatus {
                backend_order_id: BackendOrderId::new(id),
                status,
            })
            .collect();
    }

    fn check_online(&self) -> Result<(), ApiError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: 503,
                message: "backend unreachable".to_string(),
            })
        }
    }
}

#[async_trait]
impl OrderApi for ScriptedApi {
    async fn create_order(&self, payload: &CreateOrderPayload) -> Result<CreatedOrder, ApiError> {
        self.check_online()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.lock().await.push(payload.clone());
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
        self.check_online()?;
        self.status_updates
            .lock()
            .await
            .push((order_id.clone(), status));
        Ok(())
    }

    async fn add_review(
        &self,
        order_id: &BackendOrderId,
        rating: u8,
        _comment: &str,
    ) -> Result<(), ApiError> {
        self.check_online()?;
        self.reviews.lock().await.push((order_id.clone(), rating));
        Ok(())
    }

    async fn customer_orders(&self, _customer_id: &UserId) -> Result<Vec<RemoteOrderStatus>, ApiError> {
        self.check_online()?;
        Ok(self.history.lock().await.clone())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// A bootstrapped store with every collaborator exposed.
pub struct TestContext {
    pub store: UserDataStore,
    pub storage: Arc<MemoryStorage>,
    pub api: Arc<ScriptedApi>,
    pub channel: MemoryChannel,
}

impl TestContext {
    /// Context with default store options.
    pub async fn new() -> Self {
        Self::with_options(StoreOptions::default()).await
    }

    /// Context with the given store options.
    pub async fn with_options(options: StoreOptions) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let api = Arc::new(ScriptedApi::default());
        let store = UserDataStore::new(storage.clone(), api.clone(), options);
        store.bootstrap().await;

        Self {
            store,
            storage,
            api,
            channel: MemoryChannel::new(),
        }
    }

    /// Raw stored value for `key`.
    pub async fn stored(&self, key: &str) -> Option<String> {
        self.storage.get(key).await.ok().flatten()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A session identified by `email`.
///
/// # Panics
///
/// Panics if `email` is not a valid address.
#[must_use]
pub fn user(email: &str) -> UserSession {
    match Email::parse(email) {
        Ok(email) => UserSession::with_email(email),
        Err(e) => panic!("invalid fixture email {email}: {e}"),
    }
}

/// The restaurant used throughout the scenarios.
#[must_use]
pub fn cafe() -> RestaurantSnapshot {
    RestaurantSnapshot::new("r1", "Cafe")
}

/// Input for `quantity` bags costing `total` against `original`.
#[must_use]
pub fn order_input(quantity: u32, total: i64, original: i64) -> OrderInput {
    OrderInput {
        restaurant: cafe().with_hours("17:00", "20:00"),
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

/// Poll `check` until it holds or [`WAIT`] passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + WAIT;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}
