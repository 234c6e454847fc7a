//! Supplier management and derived supplier statistics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::{self, Capability, PermissionProvider};
use crate::entities::{decode, Supplier, SupplierStatus};
use crate::errors::{CoreError, ValidationFailure};
use crate::events::{Event, EventSender};
use crate::projection::Projection;
use crate::store::{Collection, EntityStore};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSupplierRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub name: String,

    #[validate(length(min = 1, message = "is required"))]
    pub contact_person: String,

    #[validate(custom = "crate::validation::validate_email_field")]
    pub email: String,

    #[validate(length(min = 1, message = "is required"))]
    pub phone: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub status: SupplierStatus,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSupplierRequest {
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: Option<SupplierStatus>,
}

/// Supplier with usage figures derived from the projection.
#[derive(Debug, Clone)]
pub struct SupplierStats {
    pub supplier: Supplier,
    pub products_count: usize,
    pub last_order: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SupplierService {
    store: Arc<dyn EntityStore>,
    projection: Arc<Projection>,
    permissions: Arc<dyn PermissionProvider>,
    events: EventSender,
}

impl SupplierService {
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

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_supplier(
        &self,
        request: CreateSupplierRequest,
    ) -> Result<Supplier, CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageSuppliers,
            "create_supplier",
        )?;

        let mut failure = ValidationFailure::new();
        if let Err(errors) = request.validate() {
            failure.absorb(&errors);
        }
        failure.into_result()?;

        let now = Utc::now();
        let mut supplier = Supplier {
            id: String::new(),
            name: request.name.trim().to_string(),
            contact_person: request.contact_person.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.trim().to_string(),
            address: request.address.trim().to_string(),
            status: request.status,
            created_at: now,
            updated_at: Some(now),
        };

        let id = self
            .store
            .create(Collection::Suppliers, crate::store::to_document(&supplier))
            .await
            .map_err(CoreError::StoreWriteFailed)?;
        supplier.id = id.clone();

        info!(supplier_id = %id, name = %supplier.name, "Supplier created");
        if let Err(e) = self
            .events
            .send(Event::SupplierCreated { supplier_id: id })
            .await
        {
            warn!(error = %e, "Failed to send supplier created event");
        }
        Ok(supplier)
    }

    /// Applies a partial patch; the merged record is re-validated as a
    /// whole.
    #[instrument(skip(self, request), fields(supplier_id = %supplier_id))]
    pub async fn update_supplier(
        &self,
        supplier_id: &str,
        request: UpdateSupplierRequest,
    ) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageSuppliers,
            "update_supplier",
        )?;

        let current = self.fetch_supplier(supplier_id).await?;

        let merged = CreateSupplierRequest {
            name: request.name.clone().unwrap_or(current.name),
            contact_person: request.contact_person.clone().unwrap_or(current.contact_person),
            email: request.email.clone().unwrap_or(current.email),
            phone: request.phone.clone().unwrap_or(current.phone),
            address: request.address.clone().unwrap_or(current.address),
            status: request.status.unwrap_or(current.status),
        };
        let mut failure = ValidationFailure::new();
        if let Err(errors) = merged.validate() {
            failure.absorb(&errors);
        }
        failure.into_result()?;

        let mut patch = serde_json::Map::new();
        if request.name.is_some() {
            patch.insert("name".into(), json!(merged.name.trim()));
        }
        if request.contact_person.is_some() {
            patch.insert("contactPerson".into(), json!(merged.contact_person.trim()));
        }
        if request.email.is_some() {
            patch.insert("email".into(), json!(merged.email.trim()));
        }
        if request.phone.is_some() {
            patch.insert("phone".into(), json!(merged.phone.trim()));
        }
        if request.address.is_some() {
            patch.insert("address".into(), json!(merged.address.trim()));
        }
        if let Some(status) = request.status {
            patch.insert("status".into(), json!(status));
        }
        patch.insert("updatedAt".into(), json!(Utc::now()));

        self.store
            .update(Collection::Suppliers, supplier_id, patch)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(supplier_id = %supplier_id, "Supplier updated");
        if let Err(e) = self
            .events
            .send(Event::SupplierUpdated {
                supplier_id: supplier_id.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send supplier updated event");
        }
        Ok(())
    }

    #[instrument(skip(self), fields(supplier_id = %supplier_id))]
    pub async fn delete_supplier(&self, supplier_id: &str) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageSuppliers,
            "delete_supplier",
        )?;
        auth::require(
            &*self.permissions,
            Capability::CanDeleteItems,
            "delete_supplier",
        )?;

        self.fetch_supplier(supplier_id).await?;
        self.store
            .delete(Collection::Suppliers, supplier_id)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(supplier_id = %supplier_id, "Supplier deleted");
        if let Err(e) = self
            .events
            .send(Event::SupplierDeleted {
                supplier_id: supplier_id.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send supplier deleted event");
        }
        Ok(())
    }

    /// Per-supplier usage: how many products reference it, and when the
    /// most recent order touching one of its products was created.
    pub fn stats_for(&self, supplier: Supplier) -> SupplierStats {
        let products = self.projection.products_by_supplier(&supplier.id);
        let product_ids: Vec<&str> = products.iter().map(|p| p.id.as_str()).collect();

        let last_order = self
            .projection
            .orders()
            .into_iter()
            .filter(|order| {
                order.items.iter().any(|item| {
                    item.product_ref()
                        .is_some_and(|id| product_ids.contains(&id))
                })
            })
            .map(|order| order.created_at)
            .max();

        SupplierStats {
            products_count: products.len(),
            last_order,
            supplier,
        }
    }

    pub fn suppliers_with_stats(&self) -> Vec<SupplierStats> {
        self.projection
            .suppliers()
            .into_iter()
            .map(|supplier| self.stats_for(supplier))
            .collect()
    }

    async fn fetch_supplier(&self, supplier_id: &str) -> Result<Supplier, CoreError> {
        let doc = self
            .store
            .get(Collection::Suppliers, supplier_id)
            .await
            .map_err(CoreError::StoreReadFailed)?
            .ok_or_else(|| CoreError::not_found("supplier", supplier_id))?;
        decode(supplier_id, &doc)
            .map_err(|e| CoreError::Other(anyhow::anyhow!("malformed supplier document: {e}")))
    }
}
