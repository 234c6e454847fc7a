//! Product management: validated CRUD, direct stock writes, SKU
//! generation, and projection-backed search.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::{self, Capability, PermissionProvider};
use crate::entities::{decode, Product, StockStatus};
use crate::errors::{CoreError, ValidationFailure};
use crate::events::{Event, EventSender};
use crate::projection::Projection;
use crate::store::{Collection, EntityStore};
use crate::validation::validate_product_fields;

#[derive(Debug, Clone)]
pub struct CreateProductRequest {
    pub name: String,
    pub sku: String,
    pub description: String,
    pub category: String,
    pub stock: i64,
    pub price: Decimal,
    pub cost_price: Decimal,
    pub low_stock_threshold: i64,
    pub supplier: Option<String>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub stock: Option<i64>,
    pub price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub low_stock_threshold: Option<i64>,
    pub supplier: Option<Option<String>>,
    pub images: Option<Vec<String>>,
}

/// Projection-backed product query. All criteria are conjunctive; absent
/// criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive substring match over name, SKU, and description.
    pub search: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub stock_status: Option<StockStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl ProductFilter {
    fn matches(&self, product: &Product) -> bool {
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = product.name.to_lowercase().contains(&term)
                || product.sku.to_lowercase().contains(&term)
                || product.description.to_lowercase().contains(&term);
            if !hit {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if product.category != *category {
                return false;
            }
        }
        if let Some(supplier) = &self.supplier {
            if product.supplier.as_deref() != Some(supplier.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if product.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if product.price > max {
                return false;
            }
        }
        if let Some(status) = self.stock_status {
            if product.stock_status() != status {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if product.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if product.created_at > before {
                return false;
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn EntityStore>,
    projection: Arc<Projection>,
    permissions: Arc<dyn PermissionProvider>,
    events: EventSender,
}

impl ProductService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        projection: Arc<Projection>,
        permissions: Arc<dyn PermissionProvider>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            projection,
            permissions,
            events,
        }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<Product, CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "create_product",
        )?;

        let name = request.name.trim().to_string();
        let sku = request.sku.trim().to_string();
        let category = request.category.trim().to_string();

        validate_product_fields(
            &name,
            &sku,
            &category,
            request.price,
            request.cost_price,
            request.stock,
            request.low_stock_threshold,
            request.supplier.as_deref(),
            &self.projection,
        )
        .into_result()?;

        // SKU uniqueness is a soft rule; collisions are logged, not refused.
        if self
            .projection
            .products()
            .iter()
            .any(|p| p.sku.eq_ignore_ascii_case(&sku))
        {
            warn!(sku = %sku, "SKU already in use by another product");
        }

        let now = Utc::now();
        let mut product = Product {
            id: String::new(),
            name,
            sku,
            description: request.description.trim().to_string(),
            category,
            stock: request.stock,
            price: request.price,
            cost_price: request.cost_price,
            low_stock_threshold: request.low_stock_threshold,
            supplier: request.supplier,
            images: request.images,
            created_at: now,
            updated_at: Some(now),
        };

        let id = self
            .store
            .create(Collection::Products, crate::store::to_document(&product))
            .await
            .map_err(CoreError::StoreWriteFailed)?;
        product.id = id.clone();

        info!(product_id = %id, sku = %product.sku, "Product created");
        if let Err(e) = self
            .events
            .send(Event::ProductCreated {
                product_id: id,
                sku: product.sku.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send product created event");
        }

        Ok(product)
    }

    /// Applies a partial patch. The merged record is validated as a whole,
    /// so a patch can never leave a product violating an invariant.
    #[instrument(skip(self, request), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: &str,
        request: UpdateProductRequest,
    ) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "update_product",
        )?;

        let current = self.fetch_product(product_id).await?;

        let name = request.name.as_deref().unwrap_or(&current.name).trim();
        let sku = request.sku.as_deref().unwrap_or(&current.sku).trim();
        let category = request
            .category
            .as_deref()
            .unwrap_or(&current.category)
            .trim();
        let price = request.price.unwrap_or(current.price);
        let cost_price = request.cost_price.unwrap_or(current.cost_price);
        let stock = request.stock.unwrap_or(current.stock);
        let low_stock_threshold = request
            .low_stock_threshold
            .unwrap_or(current.low_stock_threshold);
        let supplier = match &request.supplier {
            Some(supplier) => supplier.clone(),
            None => current.supplier.clone(),
        };

        validate_product_fields(
            name,
            sku,
            category,
            price,
            cost_price,
            stock,
            low_stock_threshold,
            supplier.as_deref(),
            &self.projection,
        )
        .into_result()?;

        let mut patch = serde_json::Map::new();
        if request.name.is_some() {
            patch.insert("name".into(), json!(name));
        }
        if request.sku.is_some() {
            patch.insert("sku".into(), json!(sku));
        }
        if let Some(description) = &request.description {
            patch.insert("description".into(), json!(description.trim()));
        }
        if request.category.is_some() {
            patch.insert("category".into(), json!(category));
        }
        if request.stock.is_some() {
            patch.insert("stock".into(), json!(stock));
        }
        if request.price.is_some() {
            patch.insert("price".into(), json!(price));
        }
        if request.cost_price.is_some() {
            patch.insert("costPrice".into(), json!(cost_price));
        }
        if request.low_stock_threshold.is_some() {
            patch.insert("lowStockThreshold".into(), json!(low_stock_threshold));
        }
        if request.supplier.is_some() {
            patch.insert("supplier".into(), json!(supplier));
        }
        if let Some(images) = &request.images {
            patch.insert("images".into(), json!(images));
        }
        patch.insert("updatedAt".into(), json!(Utc::now()));

        self.store
            .update(Collection::Products, product_id, patch)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(product_id = %product_id, "Product updated");
        if let Err(e) = self
            .events
            .send(Event::ProductUpdated {
                product_id: product_id.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send product updated event");
        }
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(&self, product_id: &str) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "delete_product",
        )?;
        auth::require(
            &*self.permissions,
            Capability::CanDeleteItems,
            "delete_product",
        )?;

        self.fetch_product(product_id).await?;
        self.store
            .delete(Collection::Products, product_id)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(product_id = %product_id, "Product deleted");
        if let Err(e) = self
            .events
            .send(Event::ProductDeleted {
                product_id: product_id.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send product deleted event");
        }
        Ok(())
    }

    /// Writes an absolute stock level.
    #[instrument(skip(self), fields(product_id = %product_id, new_stock))]
    pub async fn set_stock(&self, product_id: &str, new_stock: i64) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "set_stock",
        )?;

        if new_stock < 0 {
            let mut failure = ValidationFailure::new();
            failure.push("stock", "must not be negative");
            return failure.into_result();
        }

        let current = self.fetch_product(product_id).await?;

        self.store
            .update(
                Collection::Products,
                product_id,
                super::patch(json!({
                    "stock": new_stock,
                    "updatedAt": Utc::now(),
                })),
            )
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(
            product_id = %product_id,
            old_stock = current.stock,
            new_stock,
            "Stock level set"
        );
        if let Err(e) = self
            .events
            .send(Event::StockLevelSet {
                product_id: product_id.to_string(),
                old_stock: current.stock,
                new_stock,
            })
            .await
        {
            warn!(error = %e, "Failed to send stock level event");
        }
        Ok(())
    }

    /// Generates a SKU from the category and name prefixes plus a
    /// time-derived suffix, e.g. `EL-WID-4821`.
    pub fn generate_sku(category: &str, name: &str) -> String {
        let prefix = |s: &str, n: usize| -> String {
            s.chars().take(n).collect::<String>().to_uppercase()
        };
        let suffix = Utc::now().timestamp_millis().rem_euclid(10_000);
        format!("{}-{}-{:04}", prefix(category, 2), prefix(name, 3), suffix)
    }

    /// Projection-backed filtering; no permission required.
    pub fn filter_products(&self, filter: &ProductFilter) -> Vec<Product> {
        self.projection
            .products()
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect()
    }

    /// Text search over name, SKU, and description.
    pub fn search_products(&self, term: &str) -> Vec<Product> {
        self.filter_products(&ProductFilter {
            search: Some(term.to_string()),
            ..ProductFilter::default()
        })
    }

    async fn fetch_product(&self, product_id: &str) -> Result<Product, CoreError> {
        let doc = self
            .store
            .get(Collection::Products, product_id)
            .await
            .map_err(CoreError::StoreReadFailed)?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        decode(product_id, &doc)
            .map_err(|e| CoreError::Other(anyhow::anyhow!("malformed product document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_sku_has_expected_shape() {
        let sku = ProductService::generate_sku("Electronics", "Widget");
        let parts: Vec<&str> = sku.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "EL");
        assert_eq!(parts[1], "WID");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn generated_sku_tolerates_short_inputs() {
        let sku = ProductService::generate_sku("K", "Ab");
        assert!(sku.starts_with("K-AB-"));
    }
}
