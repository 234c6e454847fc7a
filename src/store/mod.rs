//! Entity store boundary.
//!
//! The durable store is an external collaborator: a replicated document
//! database exposing single-document CRUD plus a per-collection change feed.
//! The core consumes it through [`EntityStore`] and never assumes
//! multi-document transactional semantics.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

pub mod memory;

pub use memory::MemoryStore;

/// The four collections the core keeps mutually consistent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Categories,
    Products,
    Suppliers,
    Orders,
}

/// Flat key-value document, as persisted by the store.
pub type Document = serde_json::Map<String, Value>;

/// Serializes an entity into its stored document shape.
pub fn to_document<T: Serialize>(entity: &T) -> Document {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map,
        _ => Document::new(),
    }
}

/// One observed mutation on a single document.
#[derive(Debug, Clone)]
pub enum DocChange {
    Created { id: String, doc: Document },
    Updated { id: String, doc: Document },
    Deleted { id: String },
}

/// A change-feed delivery. `Applied` carries incremental per-document
/// changes in write order (per document id). `Resync` carries a full
/// collection snapshot and must fully replace any derived state; the store
/// emits it after a feed reconnection, when incremental delivery cannot be
/// guaranteed gap-free.
#[derive(Debug, Clone)]
pub enum ChangeBatch {
    Applied {
        collection: Collection,
        changes: Vec<DocChange>,
    },
    Resync {
        collection: Collection,
        snapshot: Vec<(String, Document)>,
    },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document {id} not found in {collection}")]
    NotFound { collection: Collection, id: String },

    #[error("store transport failure: {0}")]
    Transport(String),
}

/// CRUD + subscribe primitives of the durable store. Every call is a single
/// atomic document operation; each may independently fail with a transport
/// error.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persists a new document and returns its store-assigned id.
    async fn create(&self, collection: Collection, record: Document) -> Result<String, StoreError>;

    /// Merges `patch` into the document's top-level fields.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<(), StoreError>;

    /// Removes a document. Deleting an absent document is a no-op.
    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    async fn get(&self, collection: Collection, id: &str)
        -> Result<Option<Document>, StoreError>;

    async fn list(&self, collection: Collection) -> Result<Vec<(String, Document)>, StoreError>;

    /// Subscribes to the collection's change feed. Within one document id,
    /// deliveries follow write order; no ordering holds across ids or
    /// collections.
    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeBatch>;
}
