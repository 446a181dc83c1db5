//! Push channel for server-sent order updates.
//!
//! # Architecture
//!
//! - [`PushChannel::connect`] opens a [`Connection`]: a [`PushConnection`]
//!   handle for registering interest in named events, plus a receiver of
//!   [`ChannelEvent`]s (lifecycle and messages)
//! - A message is only delivered while its event name is registered
//! - Retry and backoff belong to the channel implementation; consumers only
//!   react to `Connected`, `Disconnected` and `Message`
//! - [`MemoryChannel`] is an in-process implementation

mod memory;

pub use memory::MemoryChannel;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use kaptaze_core::{BackendOrderId, OrderStatus};

use crate::models::{AuthToken, PartitionKey};

/// Prefix of per-order status event names.
pub const ORDER_UPDATE_PREFIX: &str = "order-update-";

/// Errors that can occur on the push channel.
#[derive(Debug, Error)]
pub enum PushError {
    /// The channel could not be opened.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The connection was already closed.
    #[error("Connection closed")]
    Closed,
}

/// Options passed when opening a connection.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    /// Bearer credential of the signed-in user.
    pub auth: Option<AuthToken>,
    /// Partition the connection is opened for.
    pub user: Option<PartitionKey>,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("auth", &self.auth.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The server acknowledged the connection (also sent after a reconnect).
    Connected,
    /// The transport dropped; the channel may reconnect on its own.
    Disconnected { reason: String },
    /// A transport-level error the channel could not hide.
    Error(String),
    /// A message for a registered event name.
    Message {
        event: String,
        payload: serde_json::Value,
    },
}

/// Handle for registering interest on an open connection.
#[async_trait]
pub trait PushConnection: Send + Sync {
    /// Start delivering messages named `event`.
    async fn on(&self, event: &str) -> Result<(), PushError>;

    /// Stop delivering messages named `event`, removing every registration.
    async fn off(&self, event: &str) -> Result<(), PushError>;

    /// Close the connection. Closing twice is harmless.
    async fn disconnect(&self);
}

/// An open connection.
pub struct Connection {
    pub handle: Arc<dyn PushConnection>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to a push endpoint.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &Url, options: ConnectOptions) -> Result<Connection, PushError>;
}

/// Event name carrying status updates for one backend order.
#[must_use]
pub fn subscription_key(order_id: &BackendOrderId) -> String {
    format!("{ORDER_UPDATE_PREFIX}{order_id}")
}

/// Payload of an `order-update-<id>` message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_id: Option<BackendOrderId>,
    pub status: String,
}

impl StatusUpdate {
    /// Decode a status update delivered under `event`.
    ///
    /// The order is the one the event name is keyed to. A payload naming a
    /// different order is rejected. Returns `None` for events that are not
    /// order updates and for payloads without a known status.
    #[must_use]
    pub fn decode(event: &str, payload: &serde_json::Value) -> Option<(BackendOrderId, OrderStatus)> {
        let order_id = event
            .strip_prefix(ORDER_UPDATE_PREFIX)
            .filter(|id| !id.is_empty())
            .map(BackendOrderId::new)?;

        let update = serde_json::from_value::<Self>(payload.clone()).ok()?;
        if let Some(named) = &update.order_id
            && !named.as_str().is_empty()
            && named != &order_id
        {
            debug!(event = %event, payload_order_id = %named, "Push payload names another order");
            return None;
        }

        let status = update.status.trim().to_ascii_lowercase().parse::<OrderStatus>().ok()?;
        Some((order_id, status))
    }
}
