use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::StoredEntity;
use crate::store::Collection;

/// Stock classification derived from `stock` and `low_stock_threshold`.
/// Pure view over the product; never stored.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(stock: i64, low_stock_threshold: i64) -> Self {
        if stock == 0 {
            StockStatus::OutOfStock
        } else if stock <= low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Older records stored the category as an embedded record rather than a
/// bare name. Both shapes decode to the plain name; the ambiguity stops at
/// this boundary.
fn category_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CategoryRef {
        Name(String),
        Record { name: String },
    }

    Ok(match CategoryRef::deserialize(deserializer)? {
        CategoryRef::Name(name) | CategoryRef::Record { name } => name,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(skip_serializing, default)]
    pub id: String,

    pub name: String,

    pub sku: String,

    #[serde(default)]
    pub description: String,

    /// Category **name**, the join key to the categories collection.
    #[serde(deserialize_with = "category_name")]
    pub category: String,

    pub stock: i64,

    pub price: Decimal,

    #[serde(rename = "costPrice", default)]
    pub cost_price: Decimal,

    #[serde(rename = "lowStockThreshold", default)]
    pub low_stock_threshold: i64,

    /// Supplier id; optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredEntity for Product {
    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock, self.low_stock_threshold)
    }
}
