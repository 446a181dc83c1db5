//! `reqwest` implementation of the backend API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use kaptaze_core::{BackendOrderId, OrderStatus, RestaurantId, UserId};

use super::cache::{CacheKey, CacheValue};
use super::conversions::{created_order_id, listing_from_raw, remote_status_from_raw};
use super::types::{
    ApiEnvelope, CreateOrderPayload, CreatedOrder, CreatedOrderData, CustomerOrdersData,
    RawRestaurant, RemoteOrderStatus, RestaurantListData, ReviewBody, StatusUpdateBody,
};
use super::{ApiError, OrderApi};
use crate::config::ApiConfig;
use crate::models::{AuthToken, RestaurantListing};

const MAX_CACHED_ENTRIES: u64 = 500;

/// Order history page size; the backend defaults to 20.
const CUSTOMER_ORDERS_LIMIT: u32 = 50;

/// Client for the KapTaze backend.
///
/// Cheap to clone. Catalog reads are cached for the configured TTL; order
/// operations are never cached.
#[derive(Clone)]
pub struct HttpApiClient {
    inner: Arc<HttpApiClientInner>,
}

struct HttpApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: RwLock<Option<AuthToken>>,
    cache: Cache<CacheKey, CacheValue>,
}

impl HttpApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build or the base URL
    /// cannot carry a path.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "API base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(MAX_CACHED_ENTRIES)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(HttpApiClientInner {
                client,
                base_url: config.base_url.clone(),
                token: RwLock::new(None),
                cache,
            }),
        })
    }

    /// Set or clear the bearer token sent with every request.
    pub async fn set_token(&self, token: Option<AuthToken>) {
        *self.inner.token.write().await = token;
    }

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Config("API base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and unwrap the response envelope.
    ///
    /// Returns the envelope's `data`, which may be absent for endpoints that
    /// only acknowledge.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let request = match self.inner.token.read().await.as_ref() {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
                .map_or_else(
                    |_| body.chars().take(200).collect(),
                    |envelope| envelope.failure_message(),
                );
            warn!(status = %status, message = %message, "Backend returned non-success status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            debug!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            ApiError::Malformed(e.to_string())
        })?;

        if !envelope.success {
            return Err(ApiError::Rejected(envelope.failure_message()));
        }
        Ok(envelope.data)
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Option<T>, ApiError> {
        let url = self.endpoint(segments)?;
        self.execute(self.inner.client.post(url).json(body)).await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List active restaurants with their packages.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn get_restaurants(&self) -> Result<Vec<RestaurantListing>, ApiError> {
        if let Some(CacheValue::Restaurants(listings)) =
            self.inner.cache.get(&CacheKey::Restaurants).await
        {
            debug!("Cache hit for restaurants");
            return Ok(listings);
        }

        let url = self.endpoint(&["public", "restaurants"])?;
        let data: RestaurantListData = self
            .execute(self.inner.client.get(url))
            .await?
            .unwrap_or_default();

        let today = Utc::now().weekday();
        let listings: Vec<RestaurantListing> = data
            .restaurants
            .into_iter()
            .filter_map(|raw| match listing_from_raw(raw, today) {
                Ok(listing) => Some(listing),
                Err(e) => {
                    debug!(error = %e, "Skipping restaurant");
                    None
                }
            })
            .collect();

        self.inner
            .cache
            .insert(CacheKey::Restaurants, CacheValue::Restaurants(listings.clone()))
            .await;

        Ok(listings)
    }

    /// Get one restaurant with its packages.
    ///
    /// # Errors
    ///
    /// Returns an error if the restaurant does not exist, the API request
    /// fails, or the response is malformed.
    #[instrument(skip(self), fields(restaurant_id = %id))]
    pub async fn get_restaurant(&self, id: &RestaurantId) -> Result<RestaurantListing, ApiError> {
        let cache_key = CacheKey::Restaurant(id.clone());
        if let Some(CacheValue::Restaurant(listing)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for restaurant");
            return Ok(*listing);
        }

        let url = self.endpoint(&["public", "restaurants", id.as_str()])?;
        let raw: RawRestaurant = self
            .execute(self.inner.client.get(url))
            .await?
            .ok_or_else(|| ApiError::Malformed("restaurant response has no data".to_string()))?;
        let listing = listing_from_raw(raw, Utc::now().weekday())?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Restaurant(Box::new(listing.clone())))
            .await;

        Ok(listing)
    }

    /// Drop every cached catalog entry.
    pub fn invalidate_catalog(&self) {
        self.inner.cache.invalidate_all();
    }
}

#[async_trait]
impl OrderApi for HttpApiClient {
    #[instrument(skip(self, payload), fields(restaurant_id = %payload.restaurant.id))]
    async fn create_order(&self, payload: &CreateOrderPayload) -> Result<CreatedOrder, ApiError> {
        let data: CreatedOrderData = self
            .post_json(&["orders"], payload)
            .await?
            .ok_or_else(|| ApiError::Malformed("create order response has no data".to_string()))?;

        let backend_order_id = created_order_id(&data)?;
        debug!(backend_order_id = %backend_order_id, "Order created");
        Ok(CreatedOrder { backend_order_id })
    }

    #[instrument(skip(self, note), fields(order_id = %order_id, status = %status))]
    async fn update_order_status(
        &self,
        order_id: &BackendOrderId,
        status: OrderStatus,
        note: &str,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["orders", order_id.as_str(), "status"])?;
        let body = StatusUpdateBody { status, note };
        self.execute::<serde_json::Value>(self.inner.client.patch(url).json(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, comment), fields(order_id = %order_id))]
    async fn add_review(
        &self,
        order_id: &BackendOrderId,
        rating: u8,
        comment: &str,
    ) -> Result<(), ApiError> {
        let body = ReviewBody { rating, comment };
        self.post_json::<_, serde_json::Value>(&["orders", order_id.as_str(), "review"], &body)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn customer_orders(&self, customer_id: &UserId) -> Result<Vec<RemoteOrderStatus>, ApiError> {
        let mut url = self.endpoint(&["orders", "customer", customer_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("limit", &CUSTOMER_ORDERS_LIMIT.to_string());

        let data: CustomerOrdersData = self
            .execute(self.inner.client.get(url))
            .await?
            .unwrap_or_default();
        let total = data.orders.len();
        let statuses: Vec<RemoteOrderStatus> = data
            .orders
            .iter()
            .filter_map(remote_status_from_raw)
            .collect();
        if statuses.len() < total {
            debug!(skipped = total - statuses.len(), "Skipping order history entries");
        }
        Ok(statuses)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::models::{OrderInput, PackageSnapshot, PickupCode, RestaurantSnapshot, UserSession};
    use kaptaze_core::{Email, Money, PaymentMethod};

    /// Serve `responses` in order, one per connection; yields the raw requests.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (Url, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });
        (Url::parse(&format!("http://{addr}/")).unwrap(), handle)
    }

    /// Read one request: headers, then `content-length` bytes of body.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&raw).into_owned();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn client(base_url: Url) -> HttpApiClient {
        HttpApiClient::new(&ApiConfig {
            base_url,
            timeout: Duration::from_secs(5),
            catalog_cache_ttl: Duration::from_secs(60),
        })
        .unwrap()
    }

    fn payload() -> CreateOrderPayload {
        let user = UserSession::with_email(Email::parse("a@x.com").unwrap());
        let input = OrderInput::for_package(
            RestaurantSnapshot::new("r1", "Cafe"),
            PackageSnapshot::new("p1", "Bag", Money::from_whole(45), Money::from_whole(25)),
            1,
            PaymentMethod::Cash,
        );
        let code: PickupCode = serde_json::from_str("\"KB0001\"").unwrap();
        CreateOrderPayload::build(&user, &input, &code)
    }

    #[tokio::test]
    async fn test_create_order_reads_order_id() {
        let (url, server) = serve(vec![(
            201,
            r#"{"success":true,"message":"Order created successfully","data":{"orderId":"ORD-1001","status":"pending"}}"#,
        )])
        .await;
        let api = client(url);
        api.set_token(Some(AuthToken::new("tok-123"))).await;

        let created = api.create_order(&payload()).await.unwrap();
        assert_eq!(created.backend_order_id.as_str(), "ORD-1001");

        let requests = server.await.unwrap();
        let request = requests[0].to_ascii_lowercase();
        assert!(request.starts_with("post /orders "));
        assert!(request.contains("authorization: bearer tok-123"));
    }

    #[tokio::test]
    async fn test_non_success_status_carries_backend_message() {
        let (url, _server) = serve(vec![(
            404,
            r#"{"success":false,"error":"Restaurant not found or not active"}"#,
        )])
        .await;

        let err = client(url).create_order(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status: 404, ref message } if message == "Restaurant not found or not active"
        ));
    }

    #[tokio::test]
    async fn test_success_false_is_rejected() {
        let (url, _server) = serve(vec![(200, r#"{"success":false,"message":"nope"}"#)]).await;
        let err = client(url)
            .update_order_status(&BackendOrderId::new("ORD-1"), OrderStatus::Cancelled, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "nope"));
    }

    #[tokio::test]
    async fn test_missing_order_id_is_malformed() {
        let (url, _server) = serve(vec![(201, r#"{"success":true,"data":{"status":"pending"}}"#)]).await;
        let err = client(url).create_order(&payload()).await.unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = client(Url::parse(&format!("http://{addr}/")).unwrap());
        assert!(matches!(
            api.create_order(&payload()).await,
            Err(ApiError::Http(_))
        ));
    }

    #[tokio::test]
    async fn test_customer_orders_reads_history() {
        let (url, server) = serve(vec![(
            200,
            r#"{"success":true,"data":{"orders":[{"_id":"665f","orderId":"ORD-1","status":"ready","restaurant":{"name":"Cafe"}},{"orderId":"ORD-2","status":"??"}],"pagination":{"page":1,"limit":50,"total":2,"pages":1}}}"#,
        )])
        .await;

        let statuses = client(url)
            .customer_orders(&UserId::new("u-1"))
            .await
            .unwrap();
        assert_eq!(
            statuses,
            vec![RemoteOrderStatus {
                backend_order_id: BackendOrderId::new("ORD-1"),
                status: OrderStatus::Ready,
            }]
        );

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /orders/customer/u-1?limit=50 "));
    }

    #[tokio::test]
    async fn test_status_and_review_paths() {
        let (url, server) = serve(vec![
            (200, r#"{"success":true,"data":{"orderId":"ORD 9","status":"cancelled"}}"#),
            (200, r#"{"success":true,"message":"Review added successfully"}"#),
        ])
        .await;
        let api = client(url);
        let id = BackendOrderId::new("ORD 9");

        api.update_order_status(&id, OrderStatus::Cancelled, "Cancelled by customer")
            .await
            .unwrap();
        api.add_review(&id, 5, "Harika").await.unwrap();

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PATCH /orders/ORD%209/status "));
        assert!(requests[0].contains(r#""status":"cancelled""#));
        assert!(requests[1].starts_with("POST /orders/ORD%209/review "));
        assert!(requests[1].contains(r#""rating":5"#));
    }

    #[tokio::test]
    async fn test_restaurants_are_cached() {
        let (url, server) = serve(vec![(
            200,
            r#"{"success":true,"data":{"restaurants":[{"_id":"r1","name":"Cafe","packages":[{"id":"p1","name":"Bag","price":40,"originalPrice":90}]}],"pagination":{"page":1}}}"#,
        )])
        .await;
        let api = client(url);

        let first = api.get_restaurants().await.unwrap();
        let second = api.get_restaurants().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].restaurant.id.as_str(), "r1");
        assert_eq!(first[0].packages[0].sale_price, Money::from_whole(40));

        // Only one request reached the server.
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = client(Url::parse("https://api.example.com/v1/").unwrap());
        let url = api.endpoint(&["orders", "ORD-1", "status"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/orders/ORD-1/status");
    }
}
