//! In-process push channel.
//!
//! Behaves like a hosted socket endpoint driven from the test side: the
//! server acknowledges connections, drops and restores the transport, and
//! emits messages that reach only connections with the event registered.
//! Registrations live on the client side and survive a transport drop, so a
//! consumer that re-registers without deregistering first gets duplicate
//! deliveries.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use url::Url;

use super::{ChannelEvent, ConnectOptions, Connection, PushChannel, PushConnection, PushError};

/// In-process [`PushChannel`].
#[derive(Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<ChannelState>>,
}

#[derive(Default)]
struct ChannelState {
    next_id: u64,
    connections: BTreeMap<u64, Slot>,
    manual_ack: bool,
    fail_connect: bool,
    connect_count: usize,
    last_url: Option<Url>,
    last_options: Option<ConnectOptions>,
}

struct Slot {
    sender: mpsc::UnboundedSender<ChannelEvent>,
    /// Event name to number of registrations.
    handlers: BTreeMap<String, usize>,
    transport_up: bool,
}

impl Slot {
    fn send(&self, event: ChannelEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

impl MemoryChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, new connections wait for [`Self::acknowledge`] instead of
    /// receiving `Connected` immediately.
    pub async fn set_manual_ack(&self, manual: bool) {
        self.state.lock().await.manual_ack = manual;
    }

    /// Make subsequent connects fail.
    pub async fn set_fail_connect(&self, fail: bool) {
        self.state.lock().await.fail_connect = fail;
    }

    /// Number of successful connects so far.
    pub async fn connect_count(&self) -> usize {
        self.state.lock().await.connect_count
    }

    /// Number of connections not yet closed by their client.
    pub async fn open_connections(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Endpoint and options of the most recent connect.
    pub async fn last_connect(&self) -> Option<(Url, ConnectOptions)> {
        let state = self.state.lock().await;
        state.last_url.clone().zip(state.last_options.clone())
    }

    /// Send `Connected` to every open connection.
    pub async fn acknowledge(&self) {
        let mut state = self.state.lock().await;
        for slot in state.connections.values_mut() {
            slot.transport_up = true;
            slot.send(ChannelEvent::Connected);
        }
    }

    /// Drop the transport of every open connection.
    pub async fn drop_transport(&self, reason: &str) {
        let mut state = self.state.lock().await;
        for slot in state.connections.values_mut() {
            slot.transport_up = false;
            slot.send(ChannelEvent::Disconnected {
                reason: reason.to_owned(),
            });
        }
    }

    /// Restore the transport and acknowledge again, as a reconnect would.
    pub async fn restore_transport(&self) {
        self.acknowledge().await;
    }

    /// Report a transport error to every open connection.
    pub async fn fail_transport(&self, message: &str) {
        let state = self.state.lock().await;
        for slot in state.connections.values() {
            slot.send(ChannelEvent::Error(message.to_owned()));
        }
    }

    /// Emit `event` from the server side.
    ///
    /// Each registration receives its own copy. Returns the number of copies
    /// delivered.
    pub async fn emit(&self, event: &str, payload: serde_json::Value) -> usize {
        let state = self.state.lock().await;
        let mut delivered = 0;
        for slot in state.connections.values().filter(|s| s.transport_up) {
            let copies = slot.handlers.get(event).copied().unwrap_or(0);
            for _ in 0..copies {
                if slot.send(ChannelEvent::Message {
                    event: event.to_owned(),
                    payload: payload.clone(),
                }) {
                    delivered += 1;
                }
            }
        }
        debug!(event, delivered, "Memory channel emit");
        delivered
    }

    /// Event names registered on open connections, sorted and deduplicated.
    pub async fn registered_events(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut events: Vec<String> = state
            .connections
            .values()
            .flat_map(|slot| slot.handlers.keys().cloned())
            .collect();
        events.sort();
        events.dedup();
        events
    }

    /// Total registrations of `event` across open connections.
    pub async fn registrations(&self, event: &str) -> usize {
        let state = self.state.lock().await;
        state
            .connections
            .values()
            .filter_map(|slot| slot.handlers.get(event))
            .sum()
    }
}

#[async_trait]
impl PushChannel for MemoryChannel {
    async fn connect(&self, url: &Url, options: ConnectOptions) -> Result<Connection, PushError> {
        let mut state = self.state.lock().await;
        if state.fail_connect {
            return Err(PushError::Connect(format!("{url} refused the connection")));
        }

        let (sender, events) = mpsc::unbounded_channel();
        let id = state.next_id;
        state.next_id += 1;
        state.connect_count += 1;
        state.last_url = Some(url.clone());
        state.last_options = Some(options);

        let slot = Slot {
            sender,
            handlers: BTreeMap::new(),
            transport_up: !state.manual_ack,
        };
        if slot.transport_up {
            slot.send(ChannelEvent::Connected);
        }
        state.connections.insert(id, slot);

        Ok(Connection {
            handle: Arc::new(MemoryConnection {
                id,
                state: Arc::clone(&self.state),
            }),
            events,
        })
    }
}

/// Client handle of one [`MemoryChannel`] connection.
struct MemoryConnection {
    id: u64,
    state: Arc<Mutex<ChannelState>>,
}

#[async_trait]
impl PushConnection for MemoryConnection {
    async fn on(&self, event: &str) -> Result<(), PushError> {
        let mut state = self.state.lock().await;
        let slot = state.connections.get_mut(&self.id).ok_or(PushError::Closed)?;
        *slot.handlers.entry(event.to_owned()).or_default() += 1;
        Ok(())
    }

    async fn off(&self, event: &str) -> Result<(), PushError> {
        let mut state = self.state.lock().await;
        let slot = state.connections.get_mut(&self.id).ok_or(PushError::Closed)?;
        slot.handlers.remove(event);
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.lock().await.connections.remove(&self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn url() -> Url {
        Url::parse("wss://push.example.com").unwrap()
    }

    #[tokio::test]
    async fn test_connect_acknowledges() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect(&url(), ConnectOptions::default()).await.unwrap();
        assert_eq!(conn.events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(channel.connect_count().await, 1);
    }

    #[tokio::test]
    async fn test_only_registered_events_are_delivered() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect(&url(), ConnectOptions::default()).await.unwrap();
        let _ = conn.events.recv().await;

        assert_eq!(channel.emit("order-update-1", json!({"status": "ready"})).await, 0);

        conn.handle.on("order-update-1").await.unwrap();
        assert_eq!(channel.emit("order-update-1", json!({"status": "ready"})).await, 1);
        assert!(matches!(
            conn.events.recv().await.unwrap(),
            ChannelEvent::Message { event, .. } if event == "order-update-1"
        ));

        conn.handle.off("order-update-1").await.unwrap();
        assert_eq!(channel.emit("order-update-1", json!({})).await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_registration_duplicates_delivery() {
        let channel = MemoryChannel::new();
        let conn = channel.connect(&url(), ConnectOptions::default()).await.unwrap();
        conn.handle.on("e").await.unwrap();
        conn.handle.on("e").await.unwrap();
        assert_eq!(channel.registrations("e").await, 2);
        assert_eq!(channel.emit("e", json!({})).await, 2);

        conn.handle.off("e").await.unwrap();
        assert_eq!(channel.registrations("e").await, 0);
    }

    #[tokio::test]
    async fn test_transport_drop_and_restore() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect(&url(), ConnectOptions::default()).await.unwrap();
        let _ = conn.events.recv().await;
        conn.handle.on("e").await.unwrap();

        channel.drop_transport("ping timeout").await;
        assert_eq!(
            conn.events.recv().await.unwrap(),
            ChannelEvent::Disconnected {
                reason: "ping timeout".to_string()
            }
        );
        assert_eq!(channel.emit("e", json!({})).await, 0);

        channel.restore_transport().await;
        assert_eq!(conn.events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(channel.registered_events().await, vec!["e".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_closes_handle() {
        let channel = MemoryChannel::new();
        let mut conn = channel.connect(&url(), ConnectOptions::default()).await.unwrap();
        let _ = conn.events.recv().await;

        conn.handle.disconnect().await;
        conn.handle.disconnect().await;
        assert_eq!(channel.open_connections().await, 0);
        assert!(matches!(conn.handle.on("e").await, Err(PushError::Closed)));
        assert!(conn.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fail_connect() {
        let channel = MemoryChannel::new();
        channel.set_fail_connect(true).await;
        assert!(matches!(
            channel.connect(&url(), ConnectOptions::default()).await,
            Err(PushError::Connect(_))
        ));
        assert_eq!(channel.connect_count().await, 0);
    }

    #[tokio::test]
    async fn test_manual_ack() {
        let channel = MemoryChannel::new();
        channel.set_manual_ack(true).await;
        let mut conn = channel.connect(&url(), ConnectOptions::default()).await.unwrap();
        assert!(conn.events.try_recv().is_err());

        channel.acknowledge().await;
        assert_eq!(conn.events.recv().await.unwrap(), ChannelEvent::Connected);
    }
}
