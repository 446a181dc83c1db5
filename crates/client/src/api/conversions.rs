//! Normalization of backend responses into canonical models.
//!
//! This is the only place that knows about `_id` versus `id`, the three price
//! field names, the two operating-hours shapes and structured addresses.
//! Display text is passed through [`repair_mojibake`] on the way in.

use chrono::Weekday;

use kaptaze_core::{BackendOrderId, OrderStatus, PackageId, RestaurantId};

use super::ApiError;
use super::types::{
    CreatedOrderData, RawHours, RawOpeningDay, RawOrderSummary, RawPackage, RawRestaurant,
    RemoteOrderStatus,
};
use crate::models::{OperatingHours, PackageSnapshot, RestaurantListing, RestaurantSnapshot};
use crate::text::repair_mojibake;

/// Pick the first non-blank identifier.
fn first_id<'a>(candidates: impl IntoIterator<Item = Option<&'a String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

fn clean_text(text: Option<String>) -> Option<String> {
    text.map(|t| repair_mojibake(t.trim()).into_owned())
        .filter(|t| !t.is_empty())
}

/// Extract the backend order ID from a create response.
///
/// # Errors
///
/// Returns `ApiError::Malformed` if none of the known ID fields is present.
pub fn created_order_id(data: &CreatedOrderData) -> Result<BackendOrderId, ApiError> {
    first_id([
        data.id.as_ref(),
        data.order_id.as_ref(),
        data.mongo_id.as_ref(),
    ])
    .map(BackendOrderId::new)
    .ok_or_else(|| ApiError::Malformed("create order response has no order ID".to_string()))
}

/// Convert an order-history entry; `None` without an ID or a known status.
#[must_use]
pub fn remote_status_from_raw(raw: &RawOrderSummary) -> Option<RemoteOrderStatus> {
    let backend_order_id = first_id([raw.order_id.as_ref(), raw.mongo_id.as_ref()])?;
    let status = raw
        .status
        .as_deref()?
        .trim()
        .to_ascii_lowercase()
        .parse::<OrderStatus>()
        .ok()?;
    Some(RemoteOrderStatus {
        backend_order_id: BackendOrderId::new(backend_order_id),
        status,
    })
}

/// Format an address that is either a string or `{ street, district, city }`.
#[must_use]
pub fn address_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => clean_text(Some(s.clone())),
        serde_json::Value::Object(fields) => {
            let parts: Vec<&str> = ["street", "district", "city"]
                .iter()
                .filter_map(|key| fields.get(*key).and_then(serde_json::Value::as_str))
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            clean_text(Some(parts.join(", ")))
        }
        _ => None,
    }
}

fn hours_from_pair(open: Option<&String>, close: Option<&String>) -> Option<OperatingHours> {
    let open = open.map(|s| s.trim()).filter(|s| !s.is_empty())?;
    let close = close.map(|s| s.trim()).filter(|s| !s.is_empty())?;
    Some(OperatingHours {
        open: open.to_owned(),
        close: close.to_owned(),
    })
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Resolve today's pickup window.
///
/// A flat `operatingHours` pair wins. Otherwise the `openingHours` entry for
/// `today` is used, then the first open day of the week.
fn resolve_hours(
    flat: Option<&RawHours>,
    weekly: &[RawOpeningDay],
    today: Weekday,
) -> Option<OperatingHours> {
    if let Some(hours) = flat.and_then(|h| hours_from_pair(h.open.as_ref(), h.close.as_ref())) {
        return Some(hours);
    }

    let open_days = || weekly.iter().filter(|d| !d.closed);
    let today_name = weekday_name(today);
    open_days()
        .find(|d| {
            d.day
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(today_name))
        })
        .or_else(|| open_days().next())
        .and_then(|d| hours_from_pair(d.open.as_ref(), d.close.as_ref()))
}

/// Normalize a package.
///
/// The charged price is `discountedPrice`, then `salePrice`, then `price`;
/// the shelf price is `originalPrice`, then `price`, then the charged price.
///
/// # Errors
///
/// Returns `ApiError::Malformed` if the package has no ID or no price.
pub fn package_from_raw(raw: RawPackage) -> Result<PackageSnapshot, ApiError> {
    let id = first_id([raw.id.as_ref(), raw.mongo_id.as_ref()])
        .ok_or_else(|| ApiError::Malformed("package without id".to_string()))?;

    let sale_price = raw
        .discounted_price
        .or(raw.sale_price)
        .or(raw.price)
        .ok_or_else(|| ApiError::Malformed(format!("package {id} has no price")))?;
    let original_price = raw.original_price.or(raw.price).unwrap_or(sale_price);

    let name = clean_text(raw.name).unwrap_or_else(|| id.clone());
    let mut package = PackageSnapshot::new(PackageId::new(id), name, original_price, sale_price);
    package.description = clean_text(raw.description);
    Ok(package)
}

/// Normalize a restaurant and its packages.
///
/// Packages that cannot be normalized are skipped.
///
/// # Errors
///
/// Returns `ApiError::Malformed` if the restaurant has no ID.
pub fn listing_from_raw(raw: RawRestaurant, today: Weekday) -> Result<RestaurantListing, ApiError> {
    let id = first_id([raw.id.as_ref(), raw.mongo_id.as_ref()])
        .ok_or_else(|| ApiError::Malformed("restaurant without id".to_string()))?;

    let operating_hours = resolve_hours(raw.operating_hours.as_ref(), &raw.opening_hours, today);
    let address = raw.address.as_ref().and_then(address_text);

    let packages = raw
        .packages
        .into_iter()
        .filter_map(|package| match package_from_raw(package) {
            Ok(package) => Some(package),
            Err(e) => {
                tracing::debug!(restaurant_id = %id, error = %e, "Skipping package");
                None
            }
        })
        .collect();

    let name = clean_text(raw.name).unwrap_or_else(|| id.clone());
    let restaurant = RestaurantSnapshot {
        id: RestaurantId::new(id),
        name,
        category: clean_text(raw.category),
        address,
        phone: raw.phone.filter(|p| !p.trim().is_empty()),
        image_url: raw.image_url.or(raw.image).filter(|u| !u.trim().is_empty()),
        operating_hours,
    };

    Ok(RestaurantListing {
        restaurant,
        packages,
    })
}
