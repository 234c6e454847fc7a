use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoredEntity;
use crate::store::Collection;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SupplierStatus {
    #[default]
    Active,
    Inactive,
}

/// Supplier of products. Products reference a supplier by id; the reference
/// is optional on the product side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    #[serde(skip_serializing, default)]
    pub id: String,

    pub name: String,

    #[serde(rename = "contactPerson")]
    pub contact_person: String,

    pub email: String,

    pub phone: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub status: SupplierStatus,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredEntity for Supplier {
    const COLLECTION: Collection = Collection::Suppliers;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}
