//! Change-propagation layer.
//!
//! [`Projection`] is the in-memory materialized view of the store, keyed by
//! entity id. [`ProjectionWorker`] is its single mutator: it consumes every
//! collection's change feed, applies batches, and bumps a generation watch
//! so consumers can observe "the projection changed". Everything else reads.
//!
//! The projection is a cache. It is rebuilt from the store on startup and
//! fully replaced per collection on a `Resync` delivery; it is never the
//! source of truth across restarts.

use std::sync::Arc;

use dashmap::DashMap;
use strum::IntoEnumIterator;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::entities::{self, Category, Order, OrderStatus, Product, StoredEntity, Supplier};
use crate::errors::CoreError;
use crate::store::{ChangeBatch, Collection, DocChange, Document, EntityStore};

/// Categories written once when the categories collection is first observed
/// empty.
pub const DEFAULT_CATEGORIES: [&str; 10] = [
    "Electronics",
    "Kitchen",
    "Office",
    "Clothing",
    "Books",
    "Sports",
    "Health",
    "Home & Garden",
    "Automotive",
    "Other",
];

const DEFAULT_CATEGORY_COLORS: [&str; 10] = [
    "#007bff", "#28a745", "#dc3545", "#ffc107", "#17a2b8", "#6f42c1", "#e83e8c", "#fd7e14",
    "#20c997", "#6c757d",
];

pub struct Projection {
    categories: DashMap<String, Category>,
    products: DashMap<String, Product>,
    suppliers: DashMap<String, Supplier>,
    orders: DashMap<String, Order>,
    generation: watch::Sender<u64>,
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            categories: DashMap::new(),
            products: DashMap::new(),
            suppliers: DashMap::new(),
            orders: DashMap::new(),
            generation,
        }
    }

    // ---- read side -------------------------------------------------------

    pub fn categories(&self) -> Vec<Category> {
        let mut all: Vec<Category> = self.categories.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn category(&self, id: &str) -> Option<Category> {
        self.categories.get(id).map(|e| e.value().clone())
    }

    /// Case-insensitive lookup, matching the uniqueness rule.
    pub fn category_by_name(&self, name: &str) -> Option<Category> {
        self.categories
            .iter()
            .find(|e| e.value().name_matches(name))
            .map(|e| e.value().clone())
    }

    pub fn products(&self) -> Vec<Product> {
        let mut all: Vec<Product> = self.products.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.products.get(id).map(|e| e.value().clone())
    }

    /// Products whose category field exactly equals `name` (the join key).
    pub fn products_in_category(&self, name: &str) -> Vec<Product> {
        self.products
            .iter()
            .filter(|e| e.value().category == name)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn products_by_supplier(&self, supplier_id: &str) -> Vec<Product> {
        self.products
            .iter()
            .filter(|e| e.value().supplier.as_deref() == Some(supplier_id))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn suppliers(&self) -> Vec<Supplier> {
        let mut all: Vec<Supplier> = self.suppliers.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn supplier(&self, id: &str) -> Option<Supplier> {
        self.suppliers.get(id).map(|e| e.value().clone())
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.iter().map(|e| e.value().clone()).collect()
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.orders.get(id).map(|e| e.value().clone())
    }

    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|e| e.value().status == status)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self, collection: Collection) -> usize {
        match collection {
            Collection::Categories => self.categories.len(),
            Collection::Products => self.products.len(),
            Collection::Suppliers => self.suppliers.len(),
            Collection::Orders => self.orders.len(),
        }
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Monotonic change counter, bumped after every applied batch.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Consumers subscribe here to learn that the projection changed.
    pub fn watch_generation(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    // ---- write side (worker only) ----------------------------------------

    pub(crate) fn apply(&self, batch: ChangeBatch) {
        match batch {
            ChangeBatch::Applied {
                collection,
                changes,
            } => match collection {
                Collection::Categories => apply_changes(&self.categories, collection, changes),
                Collection::Products => apply_changes(&self.products, collection, changes),
                Collection::Suppliers => apply_changes(&self.suppliers, collection, changes),
                Collection::Orders => apply_changes(&self.orders, collection, changes),
            },
            ChangeBatch::Resync {
                collection,
                snapshot,
            } => match collection {
                Collection::Categories => apply_resync(&self.categories, collection, snapshot),
                Collection::Products => apply_resync(&self.products, collection, snapshot),
                Collection::Suppliers => apply_resync(&self.suppliers, collection, snapshot),
                Collection::Orders => apply_resync(&self.orders, collection, snapshot),
            },
        }
    }

    pub(crate) fn publish(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }
}

fn apply_changes<T: StoredEntity>(
    map: &DashMap<String, T>,
    collection: Collection,
    changes: Vec<DocChange>,
) {
    for change in changes {
        match change {
            DocChange::Created { id, doc } | DocChange::Updated { id, doc } => {
                match entities::decode::<T>(&id, &doc) {
                    Ok(entity) => {
                        map.insert(id, entity);
                    }
                    Err(e) => {
                        warn!(collection = %collection, id = %id, error = %e, "Skipping malformed document");
                    }
                }
            }
            DocChange::Deleted { id } => {
                map.remove(&id);
            }
        }
    }
}

/// Full replacement: the snapshot wins, entries absent from it are dropped.
fn apply_resync<T: StoredEntity>(
    map: &DashMap<String, T>,
    collection: Collection,
    snapshot: Vec<(String, Document)>,
) {
    map.clear();
    for (id, doc) in snapshot {
        match entities::decode::<T>(&id, &doc) {
            Ok(entity) => {
                map.insert(id, entity);
            }
            Err(e) => {
                warn!(collection = %collection, id = %id, error = %e, "Skipping malformed document");
            }
        }
    }
}

/// Single mutator of the projection. Construct, [`bootstrap`], then spawn
/// [`run`]; subscriptions are taken at construction so writes made during
/// bootstrap (default-category seeding included) are not missed.
///
/// [`bootstrap`]: ProjectionWorker::bootstrap
/// [`run`]: ProjectionWorker::run
pub struct ProjectionWorker {
    store: Arc<dyn EntityStore>,
    projection: Arc<Projection>,
    seed_default_categories: bool,
    categories_rx: broadcast::Receiver<ChangeBatch>,
    products_rx: broadcast::Receiver<ChangeBatch>,
    suppliers_rx: broadcast::Receiver<ChangeBatch>,
    orders_rx: broadcast::Receiver<ChangeBatch>,
}

impl ProjectionWorker {
    pub fn new(
        store: Arc<dyn EntityStore>,
        projection: Arc<Projection>,
        seed_default_categories: bool,
    ) -> Self {
        let categories_rx = store.subscribe(Collection::Categories);
        let products_rx = store.subscribe(Collection::Products);
        let suppliers_rx = store.subscribe(Collection::Suppliers);
        let orders_rx = store.subscribe(Collection::Orders);
        Self {
            store,
            projection,
            seed_default_categories,
            categories_rx,
            products_rx,
            suppliers_rx,
            orders_rx,
        }
    }

    /// Loads the initial snapshot of every collection and performs one-time
    /// default-category seeding. The seed writes arrive through the already
    /// open feed subscriptions.
    pub async fn bootstrap(&self) -> Result<(), CoreError> {
        for collection in Collection::iter() {
            let snapshot = self
                .store
                .list(collection)
                .await
                .map_err(CoreError::StoreReadFailed)?;
            self.projection.apply(ChangeBatch::Resync {
                collection,
                snapshot,
            });
        }

        if self.seed_default_categories && self.projection.is_empty(Collection::Categories) {
            self.seed_categories().await?;
        }

        self.projection.publish();
        Ok(())
    }

    async fn seed_categories(&self) -> Result<(), CoreError> {
        info!("No categories found, seeding defaults");
        let now = chrono::Utc::now();
        for (index, name) in DEFAULT_CATEGORIES.iter().enumerate() {
            let category = Category {
                id: String::new(),
                name: (*name).to_string(),
                description: format!("{name} products"),
                color: DEFAULT_CATEGORY_COLORS[index % DEFAULT_CATEGORY_COLORS.len()].to_string(),
                created_at: now,
                updated_at: Some(now),
            };
            self.store
                .create(Collection::Categories, crate::store::to_document(&category))
                .await
                .map_err(CoreError::StoreWriteFailed)?;
        }
        info!(count = DEFAULT_CATEGORIES.len(), "Default categories seeded");
        Ok(())
    }

    /// Feed loop. Lagged feeds recover with a full collection resync; a
    /// closed feed means the store is gone and the loop exits.
    pub async fn run(self) {
        let ProjectionWorker {
            store,
            projection,
            mut categories_rx,
            mut products_rx,
            mut suppliers_rx,
            mut orders_rx,
            ..
        } = self;

        loop {
            let (collection, result) = tokio::select! {
                r = categories_rx.recv() => (Collection::Categories, r),
                r = products_rx.recv() => (Collection::Products, r),
                r = suppliers_rx.recv() => (Collection::Suppliers, r),
                r = orders_rx.recv() => (Collection::Orders, r),
            };

            match result {
                Ok(batch) => {
                    projection.apply(batch);
                    projection.publish();
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(collection = %collection, missed, "Change feed lagged, resyncing");
                    match store.list(collection).await {
                        Ok(snapshot) => {
                            projection.apply(ChangeBatch::Resync {
                                collection,
                                snapshot,
                            });
                            projection.publish();
                        }
                        Err(e) => {
                            error!(collection = %collection, error = %e, "Resync after lag failed");
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    info!(collection = %collection, "Change feed closed, stopping projection worker");
                    break;
                }
            }
        }
    }
}
