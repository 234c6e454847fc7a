//! Stock alert views.
//!
//! Pure aggregations over the projection: recomputed on demand, holding no
//! state of their own.

use std::collections::BTreeMap;

use crate::entities::{Product, StockStatus};
use crate::projection::Projection;

#[derive(Clone, Debug, Default)]
pub struct StockAlertSummary {
    pub low_stock: Vec<Product>,
    pub out_of_stock: Vec<Product>,
}

impl StockAlertSummary {
    pub fn total_alerts(&self) -> usize {
        self.low_stock.len() + self.out_of_stock.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low_stock.is_empty() && self.out_of_stock.is_empty()
    }
}

/// Classifies every product and collects the low- and out-of-stock sets.
pub fn stock_alerts(projection: &Projection) -> StockAlertSummary {
    let mut summary = StockAlertSummary::default();
    for product in projection.products() {
        match product.stock_status() {
            StockStatus::LowStock => summary.low_stock.push(product),
            StockStatus::OutOfStock => summary.out_of_stock.push(product),
            StockStatus::InStock => {}
        }
    }
    summary
}

pub fn low_stock_products(projection: &Projection) -> Vec<Product> {
    stock_alerts(projection).low_stock
}

pub fn out_of_stock_products(projection: &Projection) -> Vec<Product> {
    stock_alerts(projection).out_of_stock
}

/// Alert products grouped by category name, for the per-category alert
/// views. Categories without alerts are absent.
pub fn alerts_by_category(projection: &Projection) -> BTreeMap<String, Vec<Product>> {
    let mut grouped: BTreeMap<String, Vec<Product>> = BTreeMap::new();
    for product in projection.products() {
        if product.stock_status() != StockStatus::InStock {
            grouped
                .entry(product.category.clone())
                .or_default()
                .push(product);
        }
    }
    grouped
}
