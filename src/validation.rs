//! Invariant validator.
//!
//! Checks proposed records (full record on create, merged patch on update)
//! against field constraints and the current projection, and normalizes
//! accepted input. Verdicts enumerate every violated field. Nothing here
//! writes; all store writes happen only after validation succeeds.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use validator::ValidationError;

use crate::config::PricingConfig;
use crate::entities::OrderItem;
use crate::errors::{CoreError, ValidationFailure};
use crate::projection::Projection;

pub const CATEGORY_NAME_MIN: usize = 2;
pub const CATEGORY_NAME_MAX: usize = 50;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Custom validator for `#[validate(custom = "...")]` derive fields.
pub fn validate_email_field(value: &str) -> Result<(), ValidationError> {
    if is_valid_email(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email");
        err.message = Some("must be a valid email address".into());
        Err(err)
    }
}

/// Rounds a monetary amount to 2 decimal places, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Recomputes order totals from line items. Caller-supplied totals are
/// never trusted.
pub fn compute_totals(items: &[OrderItem], pricing: &PricingConfig) -> OrderTotals {
    let subtotal = round_money(items.iter().map(OrderItem::line_total).sum());
    let tax = round_money(subtotal * pricing.tax_rate);
    let shipping = round_money(pricing.shipping_flat);
    let total = round_money(subtotal + tax + shipping);
    OrderTotals {
        subtotal,
        tax,
        shipping,
        total,
    }
}

/// Trims and checks a category name. Returns the normalized name alongside
/// any violations.
pub fn validate_category_name(raw: &str) -> (String, ValidationFailure) {
    let name = raw.trim().to_string();
    let mut failure = ValidationFailure::new();
    if name.len() < CATEGORY_NAME_MIN || name.len() > CATEGORY_NAME_MAX {
        failure.push(
            "name",
            format!(
                "must be between {CATEGORY_NAME_MIN} and {CATEGORY_NAME_MAX} characters"
            ),
        );
    }
    (name, failure)
}

/// Case-insensitive uniqueness check against the projection; on edit the
/// category being renamed is excluded from the comparison.
pub fn ensure_category_name_available(
    projection: &Projection,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), CoreError> {
    let taken = projection
        .categories()
        .iter()
        .any(|c| Some(c.id.as_str()) != exclude_id && c.name_matches(name));
    if taken {
        Err(CoreError::DuplicateName {
            entity: "category",
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Full product field check, used for creates and for patched records on
/// update. Referential checks (category by name, supplier by id) run
/// against the projection.
#[allow(clippy::too_many_arguments)]
pub fn validate_product_fields(
    name: &str,
    sku: &str,
    category: &str,
    price: Decimal,
    cost_price: Decimal,
    stock: i64,
    low_stock_threshold: i64,
    supplier: Option<&str>,
    projection: &Projection,
) -> ValidationFailure {
    let mut failure = ValidationFailure::new();

    if name.trim().is_empty() {
        failure.push("name", "is required");
    }
    if sku.trim().is_empty() {
        failure.push("sku", "is required");
    }
    if category.trim().is_empty() {
        failure.push("category", "is required");
    } else if projection.category_by_name(category).is_none() {
        failure.push("category", format!("unknown category: {category}"));
    }
    if price <= Decimal::ZERO {
        failure.push("price", "must be greater than zero");
    }
    if cost_price < Decimal::ZERO {
        failure.push("costPrice", "must not be negative");
    }
    if stock < 0 {
        failure.push("stock", "must not be negative");
    }
    if low_stock_threshold < 0 {
        failure.push("lowStockThreshold", "must not be negative");
    }
    if let Some(supplier_id) = supplier {
        if projection.supplier(supplier_id).is_none() {
            failure.push("supplier", format!("unknown supplier: {supplier_id}"));
        }
    }

    failure
}

/// Order line checks at creation time: at least one item, positive
/// quantities, and a product reference on every line. Product existence is
/// deliberately not required — line items are snapshots, not live joins.
pub fn validate_order_items(items: &[OrderItem]) -> ValidationFailure {
    let mut failure = ValidationFailure::new();
    if items.is_empty() {
        failure.push("items", "at least one item is required");
    }
    for (index, item) in items.iter().enumerate() {
        if item.quantity < 1 {
            failure.push(
                format!("items[{index}].quantity"),
                "must be at least 1",
            );
        }
        if item.product_ref().is_none() {
            failure.push(
                format!("items[{index}].productId"),
                "product reference is required",
            );
        }
        if item.name.trim().is_empty() {
            failure.push(format!("items[{index}].name"), "is required");
        }
        if item.price < Decimal::ZERO {
            failure.push(format!("items[{index}].price"), "must not be negative");
        }
    }
    failure
}
