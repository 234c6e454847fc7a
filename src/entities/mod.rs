//! Domain entities as persisted in the document store.
//!
//! Field names on the wire are camelCase and timestamps are ISO-8601
//! strings, matching existing records. Each entity's `id` is the store's
//! document key: absent from the serialized document, injected on decode.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::store::{Collection, Document};

pub mod category;
pub mod order;
pub mod product;
pub mod supplier;

pub use category::Category;
pub use order::{Customer, Order, OrderItem, OrderStatus};
pub use product::{Product, StockStatus};
pub use supplier::{Supplier, SupplierStatus};

/// An entity stored as a document in one fixed collection.
pub trait StoredEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: &str);
}

/// Decodes a stored document into its typed entity, injecting the document
/// key as the entity id.
pub fn decode<T: StoredEntity>(id: &str, doc: &Document) -> Result<T, serde_json::Error> {
    let mut entity: T = serde_json::from_value(Value::Object(doc.clone()))?;
    entity.set_id(id);
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_injects_document_key_as_id() {
        let doc = json!({
            "name": "Electronics",
            "description": "Electronics products",
            "color": "#007bff",
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-01T10:00:00Z",
        });
        let category: Category = decode("cat-1", doc.as_object().unwrap()).unwrap();
        assert_eq!(category.id, "cat-1");
        assert_eq!(category.name, "Electronics");
    }

    #[test]
    fn encoded_documents_do_not_carry_the_id_field() {
        let doc = json!({
            "name": "Office",
            "description": "Office products",
            "color": "#28a745",
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-01T10:00:00Z",
        });
        let mut category: Category = decode("cat-2", doc.as_object().unwrap()).unwrap();
        category.name = "Stationery".to_string();

        let encoded = crate::store::to_document(&category);
        assert!(!encoded.contains_key("id"));
        assert_eq!(encoded.get("name"), Some(&json!("Stationery")));
    }
}
