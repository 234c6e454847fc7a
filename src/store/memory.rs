//! In-process reference implementation of [`EntityStore`].
//!
//! Backs the integration tests and embedders that run without a remote
//! store. Documents live in per-collection maps; every mutation is atomic at
//! the single-document level and is published to that collection's change
//! feed while the document entry is still locked, so per-id feed order
//! matches write order.

use dashmap::DashMap;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ChangeBatch, Collection, DocChange, Document, EntityStore, StoreError};

const FEED_CAPACITY: usize = 256;

struct Shard {
    docs: DashMap<String, Document>,
    feed: broadcast::Sender<ChangeBatch>,
}

impl Shard {
    fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            docs: DashMap::new(),
            feed,
        }
    }
}

pub struct MemoryStore {
    shards: DashMap<Collection, Shard>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let shards = DashMap::new();
        for collection in Collection::iter() {
            shards.insert(collection, Shard::new());
        }
        Self { shards }
    }

    fn shard(&self, collection: Collection) -> dashmap::mapref::one::Ref<'_, Collection, Shard> {
        self.shards
            .get(&collection)
            .expect("all collections initialized at construction")
    }

    fn publish(shard: &Shard, collection: Collection, change: DocChange) {
        // A send error just means no subscriber is listening yet.
        let _ = shard.feed.send(ChangeBatch::Applied {
            collection,
            changes: vec![change],
        });
    }

    /// Re-emits a full snapshot on the collection's feed, as a reconnecting
    /// store would after a gap in incremental delivery.
    pub fn emit_resync(&self, collection: Collection) {
        let shard = self.shard(collection);
        let snapshot = shard
            .docs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let _ = shard.feed.send(ChangeBatch::Resync {
            collection,
            snapshot,
        });
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.shard(collection).docs.len()
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn create(&self, collection: Collection, record: Document) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let shard = self.shard(collection);
        let entry = shard.docs.entry(id.clone()).or_insert(record.clone());
        Self::publish(
            &shard,
            collection,
            DocChange::Created {
                id: id.clone(),
                doc: record,
            },
        );
        drop(entry);
        Ok(id)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<(), StoreError> {
        let shard = self.shard(collection);
        let mut entry = shard.docs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            collection,
            id: id.to_string(),
        })?;
        for (key, value) in patch {
            entry.insert(key, value);
        }
        let merged = entry.clone();
        Self::publish(
            &shard,
            collection,
            DocChange::Updated {
                id: id.to_string(),
                doc: merged,
            },
        );
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let shard = self.shard(collection);
        if shard.docs.remove(id).is_some() {
            Self::publish(&shard, collection, DocChange::Deleted { id: id.to_string() });
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .shard(collection)
            .docs
            .get(id)
            .map(|doc| doc.value().clone()))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self
            .shard(collection)
            .docs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeBatch> {
        self.shard(collection).feed.subscribe()
    }
}
