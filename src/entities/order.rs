use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StoredEntity;
use crate::store::Collection;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Terminal states: reachable from any non-terminal state, never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Orders in these states must not be deleted.
    pub fn blocks_deletion(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Shipped)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, validator::Validate)]
pub struct Customer {
    #[validate(length(min = 1, message = "is required"))]
    pub name: String,

    #[validate(custom = "crate::validation::validate_email_field")]
    pub email: String,

    #[validate(length(min = 1, message = "is required"))]
    pub phone: String,

    #[validate(length(min = 1, message = "is required"))]
    pub address: String,
}

/// One order line. `name` and `price` are snapshots taken at order-creation
/// time, not live joins; the product reference is weak and the product may
/// no longer exist by the time the order completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "productId", default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Pre-migration records carried the product reference under `id`.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,

    pub name: String,

    pub price: Decimal,

    pub quantity: i64,
}

impl OrderItem {
    /// Resolves the referenced product id, falling back to the legacy field.
    pub fn product_ref(&self) -> Option<&str> {
        self.product_id.as_deref().or(self.legacy_id.as_deref())
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(skip_serializing, default)]
    pub id: String,

    pub customer: Customer,

    pub items: Vec<OrderItem>,

    pub subtotal: Decimal,

    pub tax: Decimal,

    pub shipping: Decimal,

    pub total: Decimal,

    pub status: OrderStatus,

    pub date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Idempotency marker: set once the completion deduction has been
    /// applied, so a re-delivered completion never deducts twice.
    #[serde(rename = "stockDeducted", default)]
    pub stock_deducted: bool,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredEntity for Order {
    const COLLECTION: Collection = Collection::Orders;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn status_parses_lowercase_strings() {
        assert_eq!(OrderStatus::from_str("pending").unwrap(), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_str("completed").unwrap(), OrderStatus::Completed);
        assert!(OrderStatus::from_str("archived").is_err());
    }

    #[test]
    fn terminal_and_deletion_policy() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Delivered.is_terminal());

        assert!(OrderStatus::Completed.blocks_deletion());
        assert!(OrderStatus::Shipped.blocks_deletion());
        assert!(!OrderStatus::Cancelled.blocks_deletion());
    }

    #[test]
    fn product_ref_falls_back_to_legacy_id() {
        let item: OrderItem = serde_json::from_value(json!({
            "id": "p-legacy",
            "name": "Widget",
            "price": "10.00",
            "quantity": 2,
        }))
        .unwrap();
        assert_eq!(item.product_ref(), Some("p-legacy"));

        let item: OrderItem = serde_json::from_value(json!({
            "productId": "p-new",
            "id": "p-legacy",
            "name": "Widget",
            "price": "10.00",
            "quantity": 2,
        }))
        .unwrap();
        assert_eq!(item.product_ref(), Some("p-new"));
    }

    #[test]
    fn line_total_multiplies_snapshot_price() {
        let item = OrderItem {
            product_id: Some("p1".into()),
            legacy_id: None,
            name: "Widget".into(),
            price: dec!(10.00),
            quantity: 3,
        };
        assert_eq!(item.line_total(), dec!(30.00));
    }

    #[test]
    fn order_without_marker_defaults_to_not_deducted() {
        let doc = json!({
            "customer": {
                "name": "Sam Doe",
                "email": "sam@example.com",
                "phone": "555-0100",
                "address": "1 Main St",
            },
            "items": [{"productId": "p1", "name": "Widget", "price": "10.00", "quantity": 1}],
            "subtotal": "10.00",
            "tax": "0.80",
            "shipping": "10.00",
            "total": "20.80",
            "status": "pending",
            "date": "2024-03-01",
            "createdAt": "2024-03-01T10:00:00Z",
        });
        let order: Order = crate::entities::decode("o1", doc.as_object().unwrap()).unwrap();
        assert!(!order.stock_deducted);
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
