//! Reconciliation of pushed order status.
//!
//! [`StatusReconciler`] keeps one push connection open while a user is signed
//! in and one subscription per synced order of that user. Its lifecycle:
//!
//! ```text
//! Disconnected --user signs in--> Connecting --ack--> Connected
//!      ^                               ^                  |
//!      |                               +--transport drop--+
//!      +-------- logout / user switch / shutdown ---------+
//! ```
//!
//! On every acknowledgment each subscription is deregistered and registered
//! again, so reconnects never stack handlers. `Connected` is published once
//! that is done. While connected, changes to the
//! set of synced orders are applied as a diff. Reconnecting after a transport
//! drop is left to the channel.
//!
//! The reconciler is an owned actor: drive it by hand through its `&mut`
//! methods, or hand it to [`StatusReconciler::spawn`].

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::models::PartitionKey;
use crate::push::{
    ChannelEvent, ConnectOptions, PushChannel, PushConnection, StatusUpdate, subscription_key,
};
use crate::store::UserDataStore;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Applies pushed status updates to the store.
pub struct StatusReconciler {
    store: UserDataStore,
    channel: Arc<dyn PushChannel>,
    endpoint: Url,
    state: ConnectionState,
    connection: Option<Arc<dyn PushConnection>>,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    /// Event names currently registered on `connection`.
    subscriptions: BTreeSet<String>,
    /// Partition the open connection belongs to.
    connected_for: Option<PartitionKey>,
    state_tx: watch::Sender<ConnectionState>,
}

impl StatusReconciler {
    #[must_use]
    pub fn new(store: UserDataStore, channel: Arc<dyn PushChannel>, endpoint: Url) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            store,
            channel,
            endpoint,
            state: ConnectionState::Disconnected,
            connection: None,
            events: None,
            subscriptions: BTreeSet::new(),
            connected_for: None,
            state_tx,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Event names currently registered.
    #[must_use]
    pub const fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Push connection state");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Bring the connection in line with the store's session.
    ///
    /// Signed out: tear down. Signed in as the connected user: refresh the
    /// subscriptions. Signed in as someone else, or not connected: reconnect.
    #[instrument(skip(self))]
    pub async fn sync_session(&mut self) {
        let Some(partition) = self.store.partition_key().await else {
            self.teardown().await;
            return;
        };

        if self.connection.is_some() && self.connected_for.as_ref() == Some(&partition) {
            if self.state == ConnectionState::Connected {
                self.refresh_subscriptions(false).await;
            }
            return;
        }

        self.teardown().await;
        self.set_state(ConnectionState::Connecting);

        let options = ConnectOptions {
            auth: self.store.token().await,
            user: Some(partition.clone()),
        };
        match self.channel.connect(&self.endpoint, options).await {
            Ok(connection) => {
                info!(user = %partition, endpoint = %self.endpoint, "Push channel opened");
                self.connection = Some(connection.handle);
                self.events = Some(connection.events);
                self.connected_for = Some(partition);
            }
            Err(e) => {
                warn!(user = %partition, error = %e, "Push channel connect failed");
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// React to one channel event.
    pub async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.refresh_subscriptions(true).await;
                self.set_state(ConnectionState::Connected);
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Push transport dropped; waiting for channel to reconnect");
                if self.connection.is_some() {
                    self.set_state(ConnectionState::Connecting);
                }
            }
            ChannelEvent::Error(message) => {
                warn!(error = %message, "Push channel error");
            }
            ChannelEvent::Message { event, payload } => {
                if !self.subscriptions.contains(&event) {
                    debug!(event = %event, "Ignoring unsubscribed push event");
                    return;
                }
                let Some((order_id, status)) = StatusUpdate::decode(&event, &payload) else {
                    debug!(event = %event, "Ignoring push payload that is not an update for this order");
                    return;
                };
                let applied = self.store.apply_remote_status(&order_id, status).await;
                debug!(backend_order_id = %order_id, status = %status, applied, "Pushed status handled");
            }
        }
    }

    /// Register one subscription per synced order of the signed-in user.
    ///
    /// With `force`, every subscription is deregistered and registered again.
    /// Otherwise only the difference to the registered set is applied.
    async fn refresh_subscriptions(&mut self, force: bool) {
        let Some(connection) = self.connection.clone() else {
            return;
        };

        let desired: BTreeSet<String> = self
            .store
            .backend_order_ids()
            .await
            .iter()
            .map(subscription_key)
            .collect();
        if !force && desired == self.subscriptions {
            return;
        }

        for stale in self.subscriptions.difference(&desired) {
            if let Err(e) = connection.off(stale).await {
                warn!(event = %stale, error = %e, "Failed to deregister");
            }
        }

        let mut registered = BTreeSet::new();
        for key in &desired {
            if !force && self.subscriptions.contains(key) {
                registered.insert(key.clone());
                continue;
            }
            let result = match connection.off(key).await {
                Ok(()) => connection.on(key).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    registered.insert(key.clone());
                }
                Err(e) => warn!(event = %key, error = %e, "Failed to register"),
            }
        }

        debug!(count = registered.len(), "Order subscriptions refreshed");
        self.subscriptions = registered;
    }

    /// Close the connection and forget every subscription.
    pub async fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect().await;
            info!(user = ?self.connected_for, "Push channel closed");
        }
        self.events = None;
        self.subscriptions.clear();
        self.connected_for = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// The channel closed its side; wait for the next session change.
    fn on_channel_closed(&mut self) {
        warn!("Push channel closed by remote");
        self.connection = None;
        self.events = None;
        self.subscriptions.clear();
        self.connected_for = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Handle every event already queued, without waiting. Returns how many
    /// were handled.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = match self.events.as_mut() {
                Some(events) => events.try_recv(),
                None => return handled,
            };
            match next {
                Ok(event) => {
                    self.handle_event(event).await;
                    handled += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => return handled,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.on_channel_closed();
                    return handled;
                }
            }
        }
    }

    /// Run on a background task until shut down.
    ///
    /// Follows [`UserDataStore::changes`] for session and order changes and
    /// the open connection for channel events.
    #[must_use]
    pub fn spawn(mut self) -> ReconcilerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let state = self.state_tx.subscribe();
        let mut changes = self.store.changes();

        let task = tokio::spawn(async move {
            self.sync_session().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.sync_session().await;
                    }
                    event = next_event(&mut self.events) => match event {
                        Some(event) => self.handle_event(event).await,
                        None => self.on_channel_closed(),
                    },
                }
            }
            self.teardown().await;
        });

        ReconcilerHandle {
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<ChannelEvent>>,
) -> Option<ChannelEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned [`StatusReconciler`].
#[derive(Debug)]
pub struct ReconcilerHandle {
    state: watch::Receiver<ConnectionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `target`. Returns `false` if the
    /// reconciler stopped first.
    pub async fn wait_for(&mut self, target: ConnectionState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Stop the reconciler, closing the connection.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Reconciler task failed");
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
