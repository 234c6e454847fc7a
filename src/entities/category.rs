use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoredEntity;
use crate::store::Collection;

/// Product category. Products reference a category by **name**, so the name
/// doubles as a foreign key: renames cascade to referencing products and
/// deletion is blocked while any product still points here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(skip_serializing, default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub color: String,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredEntity for Category {
    const COLLECTION: Collection = Collection::Categories;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}

impl Category {
    /// Case-insensitive name match, the uniqueness key for categories.
    pub fn name_matches(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}
