//! KapTaze backend REST API.
//!
//! # Architecture
//!
//! - [`OrderApi`] is the seam the store depends on: order creation, status
//!   updates, reviews and the customer's order history
//! - [`HttpApiClient`] implements it over `reqwest` and also serves the public
//!   restaurant catalog, cached in memory via `moka`
//! - Wire shapes live in [`types`]; [`conversions`] is the single place where
//!   backend field variants are normalized into the store's models
//!
//! Every endpoint answers with an envelope `{ success, data, message, error }`.

mod cache;
pub mod conversions;
mod http;
pub mod types;

pub use http::HttpApiClient;
pub use types::{CreateOrderPayload, CreatedOrder, RemoteOrderStatus};

use async_trait::async_trait;
use thiserror::Error;

use kaptaze_core::{BackendOrderId, OrderStatus, UserId};

/// Errors that can occur when calling the backend API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status code.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Backend answered `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Client could not be configured.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Order operations the store performs against the backend.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Create an order; returns the backend's identifier for it.
    async fn create_order(&self, payload: &CreateOrderPayload) -> Result<CreatedOrder, ApiError>;

    /// Report a status change made on the device (cancel, picked up).
    async fn update_order_status(
        &self,
        order_id: &BackendOrderId,
        status: OrderStatus,
        note: &str,
    ) -> Result<(), ApiError>;

    /// Leave a rating for a completed order.
    async fn add_review(
        &self,
        order_id: &BackendOrderId,
        rating: u8,
        comment: &str,
    ) -> Result<(), ApiError>;

    /// Current status of the customer's recent orders.
    async fn customer_orders(&self, customer_id: &UserId) -> Result<Vec<RemoteOrderStatus>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 404,
            message: "Restaurant not found or not active".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error: 404 - Restaurant not found or not active"
        );
        assert_eq!(
            ApiError::Rejected("Validation failed".to_string()).to_string(),
            "Request rejected: Validation failed"
        );
    }
}
