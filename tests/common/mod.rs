//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use stockroom::config::CoreConfig;
use stockroom::prelude::*;
use stockroom::projection::Projection;
use stockroom::services::categories::CreateCategoryRequest;
use stockroom::services::products::CreateProductRequest;

pub struct TestCore {
    pub core: InventoryCore,
    pub store: Arc<MemoryStore>,
}

/// Boots a core over a fresh in-memory store. Default-category seeding is
/// off so tests control the category set.
pub async fn boot(role: Role) -> TestCore {
    boot_with(role, false).await
}

pub async fn boot_with(role: Role, seed_default_categories: bool) -> TestCore {
    let store = Arc::new(MemoryStore::new());
    let config = CoreConfig {
        seed_default_categories,
        ..CoreConfig::default()
    };
    let core = InventoryCore::start(
        store.clone(),
        Arc::new(RolePermissions::new(role)),
        config,
    )
    .await
    .expect("core boots");
    TestCore { core, store }
}

/// Waits (bounded) until the projection satisfies `predicate`.
pub async fn settle<F>(core: &InventoryCore, predicate: F)
where
    F: FnMut(&Projection) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), core.wait_until(predicate))
        .await
        .expect("timed out waiting for projection")
        .expect("projection worker stopped");
}

pub async fn create_category(core: &InventoryCore, name: &str) -> Category {
    let category = core
        .categories
        .create_category(CreateCategoryRequest {
            name: name.to_string(),
            description: format!("{name} products"),
            color: "#007bff".to_string(),
        })
        .await
        .expect("category created");
    settle(core, |p| p.category(&category.id).is_some()).await;
    category
}

pub async fn create_product(
    core: &InventoryCore,
    name: &str,
    category: &str,
    stock: i64,
    low_stock_threshold: i64,
) -> Product {
    let product = core
        .products
        .create_product(CreateProductRequest {
            name: name.to_string(),
            sku: format!("TS-{}", name.to_uppercase()),
            description: String::new(),
            category: category.to_string(),
            stock,
            price: Decimal::new(999, 2),
            cost_price: Decimal::new(500, 2),
            low_stock_threshold,
            supplier: None,
            images: Vec::new(),
        })
        .await
        .expect("product created");
    settle(core, |p| p.product(&product.id).is_some()).await;
    product
}

pub fn customer() -> Customer {
    Customer {
        name: "Sam Doe".to_string(),
        email: "sam@example.com".to_string(),
        phone: "555-0100".to_string(),
        address: "1 Main St".to_string(),
    }
}

pub fn item(product_id: &str, name: &str, price: Decimal, quantity: i64) -> OrderItem {
    OrderItem {
        product_id: Some(product_id.to_string()),
        legacy_id: None,
        name: name.to_string(),
        price,
        quantity,
    }
}
