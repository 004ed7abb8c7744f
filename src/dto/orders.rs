use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Order;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub product_id: i64,
    pub quantity: i32,
    /// Unit price in whole KES, snapshotted onto the order item.
    pub price: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub items: Vec<CheckoutItem>,
    pub total_amount: i64,
}

impl CheckoutRequest {
    /// Boundary validation. Returns the offending field so the client can
    /// fix it; nothing is written unless this passes.
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_name.trim().is_empty() {
            return Err("customer_name must not be empty".into());
        }
        if self.customer_email.trim().is_empty() || !self.customer_email.contains('@') {
            return Err("customer_email must be a valid email address".into());
        }
        if self.customer_phone.trim().is_empty() {
            return Err("customer_phone must not be empty".into());
        }
        if self.delivery_address.trim().is_empty() {
            return Err("delivery_address must not be empty".into());
        }
        if self.items.is_empty() {
            return Err("items must not be empty".into());
        }
        let mut computed: i64 = 0;
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(format!("items[{idx}].quantity must be positive"));
            }
            if item.price <= 0 {
                return Err(format!("items[{idx}].price must be positive"));
            }
            // Overflow on an absurd price is a client error, not a panic.
            let subtotal = item
                .price
                .checked_mul(i64::from(item.quantity))
                .ok_or_else(|| format!("items[{idx}] subtotal is out of range"))?;
            computed = computed
                .checked_add(subtotal)
                .ok_or_else(|| "item subtotals are out of range".to_string())?;
        }
        if self.total_amount <= 0 {
            return Err("total_amount must be positive".into());
        }
        if computed != self.total_amount {
            return Err(format!(
                "total_amount {} does not match item subtotals {computed}",
                self.total_amount
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<TrackedItem>,
}

/// Order line joined with the product it references, for display.
#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct TrackedItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    pub payment_correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CheckoutRequest {
        CheckoutRequest {
            customer_name: "Jane".into(),
            customer_email: "jane@x.com".into(),
            customer_phone: "0712345678".into(),
            delivery_address: "12 Riverside Dr, Nairobi".into(),
            items: vec![CheckoutItem {
                product_id: 1,
                quantity: 2,
                price: 100,
            }],
            total_amount: 200,
        }
    }

    #[test]
    fn accepts_valid_payload() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn rejects_empty_customer_fields() {
        let mut req = valid_request();
        req.customer_name = "  ".into();
        assert!(req.validate().unwrap_err().contains("customer_name"));

        let mut req = valid_request();
        req.customer_email = "not-an-email".into();
        assert!(req.validate().unwrap_err().contains("customer_email"));
    }

    #[test]
    fn rejects_non_positive_quantity_and_price() {
        let mut req = valid_request();
        req.items[0].quantity = 0;
        assert!(req.validate().unwrap_err().contains("quantity"));

        let mut req = valid_request();
        req.items[0].price = -5;
        req.total_amount = -10;
        assert!(req.validate().unwrap_err().contains("price"));
    }

    #[test]
    fn rejects_empty_cart() {
        let mut req = valid_request();
        req.items.clear();
        assert!(req.validate().unwrap_err().contains("items"));
    }

    #[test]
    fn rejects_overflowing_subtotals_instead_of_panicking() {
        let mut req = valid_request();
        req.items[0].price = i64::MAX;
        req.items[0].quantity = 2;
        assert!(req.validate().unwrap_err().contains("out of range"));

        // Per-item subtotals fit but their sum does not.
        let mut req = valid_request();
        req.items = vec![
            CheckoutItem {
                product_id: 1,
                quantity: 1,
                price: i64::MAX,
            },
            CheckoutItem {
                product_id: 2,
                quantity: 1,
                price: i64::MAX,
            },
        ];
        req.total_amount = 1;
        assert!(req.validate().unwrap_err().contains("out of range"));
    }

    #[test]
    fn rejects_total_that_disagrees_with_subtotals() {
        let mut req = valid_request();
        req.total_amount = 250;
        assert!(req.validate().unwrap_err().contains("does not match"));
    }
}
