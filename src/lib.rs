//! Stockroom core
//!
//! The consistency and stock-reconciliation core of an inventory-and-order
//! management system: validated mutations over categories, products,
//! suppliers, and orders; a category rename cascade; exactly-once stock
//! deduction on order completion; and an in-memory projection kept fresh by
//! the store's change feeds.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod alerts;
pub mod auth;
pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod projection;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod validation;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::PermissionProvider;
use crate::config::CoreConfig;
use crate::errors::CoreError;
use crate::events::{process_events, EventSender};
use crate::projection::{Projection, ProjectionWorker};
use crate::services::{CategoryService, OrderService, ProductService, SupplierService};
use crate::store::EntityStore;

/// Wired-up core: store handle, projection worker, event loop, and the four
/// services.
pub struct InventoryCore {
    pub store: Arc<dyn EntityStore>,
    pub projection: Arc<Projection>,
    pub config: CoreConfig,
    pub event_sender: EventSender,
    pub categories: CategoryService,
    pub products: ProductService,
    pub suppliers: SupplierService,
    pub orders: OrderService,
    worker_handle: JoinHandle<()>,
    events_handle: JoinHandle<()>,
}

impl InventoryCore {
    /// Boots the core: loads the initial projection snapshot (seeding the
    /// default categories into an empty store), then spawns the projection
    /// worker and the event loop.
    pub async fn start(
        store: Arc<dyn EntityStore>,
        permissions: Arc<dyn PermissionProvider>,
        config: CoreConfig,
    ) -> Result<Self, CoreError> {
        let (tx, rx) = mpsc::channel(config.event_buffer);
        let event_sender = EventSender::new(tx);
        let events_handle = tokio::spawn(process_events(rx));

        let projection = Arc::new(Projection::new());
        let worker = ProjectionWorker::new(
            store.clone(),
            projection.clone(),
            config.seed_default_categories,
        );
        worker.bootstrap().await?;
        let worker_handle = tokio::spawn(worker.run());

        let categories = CategoryService::new(
            store.clone(),
            projection.clone(),
            permissions.clone(),
            event_sender.clone(),
        );
        let products = ProductService::new(
            store.clone(),
            projection.clone(),
            permissions.clone(),
            event_sender.clone(),
        );
        let suppliers = SupplierService::new(
            store.clone(),
            projection.clone(),
            permissions.clone(),
            event_sender.clone(),
        );
        let orders = OrderService::new(
            store.clone(),
            projection.clone(),
            permissions,
            event_sender.clone(),
            config.pricing.clone(),
        );

        Ok(Self {
            store,
            projection,
            config,
            event_sender,
            categories,
            products,
            suppliers,
            orders,
            worker_handle,
            events_handle,
        })
    }

    /// Blocks until `predicate` holds over the projection, waking on every
    /// applied change batch. Useful for consumers that need to observe a
    /// write they just made: the projection catches up through the feed,
    /// not synchronously with the store call.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<(), CoreError>
    where
        F: FnMut(&Projection) -> bool,
    {
        let mut generation = self.projection.watch_generation();
        loop {
            if predicate(&self.projection) {
                return Ok(());
            }
            generation
                .changed()
                .await
                .map_err(|_| CoreError::EventError("projection worker stopped".to_string()))?;
        }
    }

    pub fn stock_alerts(&self) -> alerts::StockAlertSummary {
        alerts::stock_alerts(&self.projection)
    }

    pub fn alerts_by_category(
        &self,
    ) -> std::collections::BTreeMap<String, Vec<entities::Product>> {
        alerts::alerts_by_category(&self.projection)
    }
}

impl Drop for InventoryCore {
    fn drop(&mut self) {
        self.worker_handle.abort();
        self.events_handle.abort();
    }
}

pub mod prelude {
    pub use crate::alerts::{alerts_by_category, stock_alerts, StockAlertSummary};
    pub use crate::auth::{Capability, PermissionProvider, Role, RolePermissions};
    pub use crate::config::CoreConfig;
    pub use crate::entities::{
        Category, Customer, Order, OrderItem, OrderStatus, Product, StockStatus, Supplier,
        SupplierStatus,
    };
    pub use crate::errors::{CoreError, ValidationFailure};
    pub use crate::events::{Event, EventSender};
    pub use crate::projection::Projection;
    pub use crate::services::{
        CascadeReport, CategoryService, LineOutcome, OrderService, ProductService,
        ReconciliationReport, StatusChangeOutcome, SupplierService,
    };
    pub use crate::store::{Collection, EntityStore, MemoryStore};
    pub use crate::InventoryCore;
}
