use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub total_amount: i64,
    pub status: String,
    pub mpesa_checkout_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of an order. Stored as lowercase text in the `status` column.
///
/// `pending` moves to `paid` or `failed` when the payment callback lands.
/// Admins then walk `paid -> processing -> shipped -> delivered` one step at
/// a time; `cancelled` is reachable from any non-terminal state. `delivered`
/// and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Whether `self -> to` is a legal transition. Shortcuts such as
    /// `pending -> delivered` are rejected; the sequence must be walked.
    pub fn can_transition(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, to) {
            (Pending, Paid) | (Pending, Failed) => true,
            (Paid, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (from, Cancelled) if !from.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn callback_moves_pending_to_paid_or_failed() {
        assert!(Pending.can_transition(Paid));
        assert!(Pending.can_transition(Failed));
        assert!(!Paid.can_transition(Pending));
        assert!(!Failed.can_transition(Paid));
    }

    #[test]
    fn admin_advances_one_step_at_a_time() {
        assert!(Paid.can_transition(Processing));
        assert!(Processing.can_transition(Shipped));
        assert!(Shipped.can_transition(Delivered));
        // no shortcuts
        assert!(!Pending.can_transition(Delivered));
        assert!(!Paid.can_transition(Shipped));
        assert!(!Paid.can_transition(Delivered));
    }

    #[test]
    fn cancel_from_any_non_terminal_state() {
        for from in [Pending, Paid, Failed, Processing, Shipped] {
            assert!(from.can_transition(Cancelled), "{from} should be cancellable");
        }
        assert!(!Delivered.can_transition(Cancelled));
        assert!(!Cancelled.can_transition(Cancelled));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for to in [Pending, Paid, Failed, Processing, Shipped, Delivered, Cancelled] {
            assert!(!Delivered.can_transition(to));
            assert!(!Cancelled.can_transition(to));
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [Pending, Paid, Failed, Processing, Shipped, Delivered, Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }
}
