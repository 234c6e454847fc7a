//! Mutation services.
//!
//! Each service validates against the projection, writes to the store, and
//! publishes domain events after the write succeeds. None of them mutate
//! the projection directly; it catches up through the change feed.

use serde_json::Value;

use crate::store::Document;

pub mod categories;
pub mod orders;
pub mod products;
pub mod suppliers;

pub use categories::{CascadeReport, CategoryService};
pub use orders::{LineOutcome, OrderService, ReconciliationReport, StatusChangeOutcome};
pub use products::{ProductFilter, ProductService};
pub use suppliers::{SupplierService, SupplierStats};

/// Builds a store patch from a `json!` object literal.
pub(crate) fn patch(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}
