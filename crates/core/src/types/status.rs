//! Status enums for orders and payments.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a surprise-bag reservation.
///
/// ```text
/// pending -> confirmed -> ready -> completed
///    \
///     `-> cancelled
/// ```
///
/// Forward skips along the main chain are valid (a push event may report
/// `ready` for an order that was never seen as `confirmed`). `completed` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Position on the main fulfilment chain; `None` for `Cancelled`.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Ready => Some(2),
            Self::Completed => Some(3),
            Self::Cancelled => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a valid transition.
    ///
    /// Re-applying the current status is not a transition and returns `false`;
    /// callers treat it as an idempotent no-op.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (Some(0), None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Ready => write!(f, "ready"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" | "preparing" => Ok(Self::Confirmed),
            "ready" | "delivering" => Ok(Self::Ready),
            "completed" | "delivered" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// How the customer pays at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    #[default]
    CreditCard,
    #[serde(alias = "online")]
    MobilePayment,
}

impl PaymentMethod {
    /// Wire value expected by the orders API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::CreditCard => "credit_card",
            Self::MobilePayment => "mobile_payment",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_main_chain_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
    }

    #[test]
    fn test_cancel_only_from_pending() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_no_backward_or_terminal_exits() {
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Ready));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn test_same_status_is_not_a_transition() {
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Ready));
    }

    #[test]
    fn test_terminal() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
    }

    #[test]
    fn test_serde_and_parse_agree() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_backend_only_statuses_fold_into_main_chain() {
        assert_eq!(
            "delivered".parse::<OrderStatus>().unwrap(),
            OrderStatus::Completed
        );
        assert_eq!(
            "preparing".parse::<OrderStatus>().unwrap(),
            OrderStatus::Confirmed
        );
        assert_eq!(
            "delivering".parse::<OrderStatus>().unwrap(),
            OrderStatus::Ready
        );
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_payment_method_wire_values() {
        let method: PaymentMethod = serde_json::from_str("\"online\"").unwrap();
        assert_eq!(method, PaymentMethod::MobilePayment);
        assert_eq!(PaymentMethod::default().as_str(), "credit_card");
    }
}
