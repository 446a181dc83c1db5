//! Client context shared across the app.

use std::sync::Arc;

use tracing::info;

use crate::api::HttpApiClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::{AuthToken, UserSession};
use crate::push::PushChannel;
use crate::reconcile::{ReconcilerHandle, StatusReconciler};
use crate::storage::{FileStorage, KeyValueStorage};
use crate::store::UserDataStore;

/// Everything a running client needs.
///
/// This struct is cheaply cloneable via `Arc`. The HTTP client's bearer token
/// follows the store's session when sessions change through this context.
#[derive(Clone)]
pub struct ClientContext {
    inner: Arc<ClientContextInner>,
}

struct ClientContextInner {
    config: ClientConfig,
    api: Arc<HttpApiClient>,
    store: UserDataStore,
}

impl ClientContext {
    /// Build the context from configuration, with file-backed storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(FileStorage::new(config.storage_path.clone()));
        Self::with_storage(config, storage)
    }

    /// Build the context over the given storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_storage(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ClientError> {
        let api = Arc::new(HttpApiClient::new(&config.api)?);
        let store = UserDataStore::new(storage, api.clone(), config.store);

        Ok(Self {
            inner: Arc::new(ClientContextInner { config, api, store }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Backend API client, also used for catalog reads.
    #[must_use]
    pub fn api(&self) -> &HttpApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn store(&self) -> &UserDataStore {
        &self.inner.store
    }

    /// Restore the persisted session and hand its token to the API client.
    pub async fn bootstrap(&self) {
        self.inner.store.bootstrap().await;
        self.inner.api.set_token(self.inner.store.token().await).await;
    }

    /// Switch to `user`, authenticated by `token`.
    pub async fn sign_in(&self, user: UserSession, token: AuthToken) {
        self.inner.api.set_token(Some(token.clone())).await;
        self.inner.store.set_user(Some(user), Some(token)).await;
    }

    /// End the session.
    pub async fn logout(&self) {
        self.inner.store.logout().await;
        self.inner.api.set_token(None).await;
    }

    /// Start status reconciliation over `channel` against the configured
    /// push endpoint.
    #[must_use]
    pub fn start_reconciler(&self, channel: Arc<dyn PushChannel>) -> ReconcilerHandle {
        info!(endpoint = %self.inner.config.push_url, "Starting status reconciler");
        StatusReconciler::new(
            self.inner.store.clone(),
            channel,
            self.inner.config.push_url.clone(),
        )
        .spawn()
    }
}
