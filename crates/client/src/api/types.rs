//! Wire types for the KapTaze backend.
//!
//! Request payloads are built from canonical models; response types mirror
//! the backend's loosely typed JSON and are normalized in
//! [`super::conversions`] before anything else sees them.

use serde::{Deserialize, Serialize};

use kaptaze_core::{BackendOrderId, Money, OrderStatus, PaymentMethod};

use crate::models::{OrderInput, PickupCode, UserSession};

// =============================================================================
// Envelope
// =============================================================================

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Best human-readable description of a failure.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request was not successful".to_string())
    }
}

// =============================================================================
// Orders
// =============================================================================

/// `POST /orders` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    pub customer: CustomerInfo,
    pub restaurant: RestaurantRef,
    pub items: Vec<OrderItem>,
    pub delivery: Delivery,
    pub payment_method: PaymentMethod,
    pub total_amount: Money,
    /// Always carries the pickup code so the restaurant can match the bag.
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestaurantRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub package_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    Pickup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    #[serde(rename = "type")]
    pub kind: DeliveryType,
}

impl CreateOrderPayload {
    /// Build the create request for `input` on behalf of `user`.
    #[must_use]
    pub fn build(user: &UserSession, input: &OrderInput, pickup_code: &PickupCode) -> Self {
        let email = user
            .email
            .as_ref()
            .map(|e| e.as_str().to_owned())
            .unwrap_or_default();
        let name = user
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_owned());

        let notes = match input.notes.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("Pickup code: {pickup_code}. {extra}"),
            _ => format!("Pickup code: {pickup_code}"),
        };

        Self {
            customer: CustomerInfo {
                id: user.id.as_ref().map(|id| id.as_str().to_owned()),
                name,
                email,
                phone: user.phone.clone().unwrap_or_default(),
            },
            restaurant: RestaurantRef {
                id: input.restaurant.id.as_str().to_owned(),
            },
            items: vec![OrderItem {
                package_id: input.package.id.as_str().to_owned(),
                name: input.package.name.clone(),
                price: input.package.sale_price,
                quantity: input.quantity,
                total: input.total_price,
            }],
            delivery: Delivery {
                kind: DeliveryType::Pickup,
            },
            payment_method: input.payment_method,
            total_amount: input.total_price,
            notes,
        }
    }
}

/// `data` of a successful create; the backend has used all three names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrderData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub backend_order_id: BackendOrderId,
}

/// `PATCH /orders/:id/status` body.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateBody<'a> {
    pub status: OrderStatus,
    pub note: &'a str,
}

/// `POST /orders/:id/review` body.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewBody<'a> {
    pub rating: u8,
    pub comment: &'a str,
}

/// `data` of `GET /orders/customer/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerOrdersData {
    #[serde(default)]
    pub orders: Vec<RawOrderSummary>,
}

/// One entry of a customer's order history. Only the fields the store
/// reconciles are read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrderSummary {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Status of one order as the backend currently reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrderStatus {
    pub backend_order_id: BackendOrderId,
    pub status: OrderStatus,
}

// =============================================================================
// Catalog
// =============================================================================

/// `data` of `GET /public/restaurants`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestaurantListData {
    #[serde(default)]
    pub restaurants: Vec<RawRestaurant>,
}

/// A restaurant exactly as the backend sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRestaurant {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Either a plain string or `{ street, district, city }`.
    #[serde(default)]
    pub address: Option<serde_json::Value>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub operating_hours: Option<RawHours>,
    #[serde(default)]
    pub opening_hours: Vec<RawOpeningDay>,
    #[serde(default)]
    pub packages: Vec<RawPackage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHours {
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOpeningDay {
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

/// A package exactly as the backend sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPackage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "_id")]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub original_price: Option<Money>,
    #[serde(default)]
    pub discounted_price: Option<Money>,
    #[serde(default)]
    pub sale_price: Option<Money>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kaptaze_core::{Email, UserId};

    use super::*;
    use crate::models::{PackageSnapshot, RestaurantSnapshot};

    #[test]
    fn test_envelope_data_is_optional_for_any_payload() {
        let envelope: ApiEnvelope<BackendOrderId> =
            serde_json::from_str(r#"{"success":true,"data":"ORD-1"}"#).unwrap();
        assert_eq!(envelope.data.unwrap().as_str(), "ORD-1");

        let envelope: ApiEnvelope<BackendOrderId> =
            serde_json::from_str(r#"{"success":false,"error":"Validation failed"}"#).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.failure_message(), "Validation failed");
    }

    fn input() -> OrderInput {
        OrderInput::for_package(
            RestaurantSnapshot::new("r1", "Cafe"),
            PackageSnapshot::new("p1", "Surprise Bag", Money::from_whole(45), Money::from_whole(25)),
            2,
            PaymentMethod::Cash,
        )
    }

    fn code() -> PickupCode {
        serde_json::from_str("\"KB0042\"").unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let user = UserSession {
            id: Some(UserId::new("u-1")),
            email: Some(Email::parse("ayse@x.com").unwrap()),
            name: Some("Ayşe".to_string()),
            phone: Some("+90 555 000 0000".to_string()),
            ..UserSession::default()
        };

        let json = serde_json::to_value(CreateOrderPayload::build(&user, &input(), &code())).unwrap();
        assert_eq!(json["customer"]["id"], "u-1");
        assert_eq!(json["customer"]["name"], "Ayşe");
        assert_eq!(json["restaurant"]["id"], "r1");
        assert_eq!(json["items"][0]["packageId"], "p1");
        assert_eq!(json["items"][0]["quantity"], 2);
        assert_eq!(json["items"][0]["total"], 50.0);
        assert_eq!(json["delivery"]["type"], "pickup");
        assert_eq!(json["paymentMethod"], "cash");
        assert_eq!(json["totalAmount"], 50.0);
        assert_eq!(json["notes"], "Pickup code: KB0042");
    }

    #[test]
    fn test_payload_name_falls_back_to_email() {
        let user = UserSession::with_email(Email::parse("mehmet@x.com").unwrap());
        let mut input = input();
        input.notes = Some(" no onions ".to_string());

        let payload = CreateOrderPayload::build(&user, &input, &code());
        assert_eq!(payload.customer.name, "mehmet");
        assert!(payload.customer.id.is_none());
        assert_eq!(payload.notes, "Pickup code: KB0042. no onions");
    }

    #[test]
    fn test_envelope_failure_message() {
        let env: ApiEnvelope<CreatedOrderData> =
            serde_json::from_str(r#"{"success":false,"error":"Validation failed"}"#).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.failure_message(), "Validation failed");
    }
}
