//! Category management, including the rename cascade.
//!
//! Products join categories by name, so a rename must rewrite every product
//! still carrying the old name. The cascade is sequential and best-effort:
//! per-product write failures are recorded, the remaining products are still
//! attempted, and re-running the cascade is always safe because only
//! still-old-named products are touched.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::auth::{self, Capability, PermissionProvider};
use crate::entities::{decode, Category, Product};
use crate::errors::CoreError;
use crate::events::{Event, EventSender};
use crate::projection::Projection;
use crate::store::{Collection, EntityStore, StoreError};
use crate::validation::{ensure_category_name_available, validate_category_name};

#[derive(Debug, Clone, Default)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: String,
    pub color: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Outcome of a rename cascade.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub category_id: String,
    pub old_name: String,
    pub new_name: String,
    pub products_updated: usize,
    /// Product ids whose rewrite failed; re-running the rename retries them.
    pub failed_products: Vec<String>,
}

#[derive(Clone)]
pub struct CategoryService {
    store: Arc<dyn EntityStore>,
    projection: Arc<Projection>,
    permissions: Arc<dyn PermissionProvider>,
    events: EventSender,
}

impl CategoryService {
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
    pub async fn create_category(
        &self,
        request: CreateCategoryRequest,
    ) -> Result<Category, CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "create_category",
        )?;

        let (name, failure) = validate_category_name(&request.name);
        failure.into_result()?;
        ensure_category_name_available(&self.projection, &name, None)?;

        let now = Utc::now();
        let mut category = Category {
            id: String::new(),
            name,
            description: request.description.trim().to_string(),
            color: request.color.trim().to_string(),
            created_at: now,
            updated_at: Some(now),
        };

        let id = self
            .store
            .create(Collection::Categories, crate::store::to_document(&category))
            .await
            .map_err(CoreError::StoreWriteFailed)?;
        category.id = id.clone();

        info!(category_id = %id, name = %category.name, "Category created");
        if let Err(e) = self
            .events
            .send(Event::CategoryCreated {
                category_id: id,
                name: category.name.clone(),
            })
            .await
        {
            warn!(error = %e, "Failed to send category created event");
        }

        Ok(category)
    }

    /// Updates a category. A name change triggers the rename cascade and
    /// yields a [`CascadeReport`].
    #[instrument(skip(self, request), fields(category_id = %category_id))]
    pub async fn update_category(
        &self,
        category_id: &str,
        request: UpdateCategoryRequest,
    ) -> Result<Option<CascadeReport>, CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "update_category",
        )?;

        let current = self.fetch_category(category_id).await?;

        let new_name = match &request.name {
            Some(raw) => {
                let (name, failure) = validate_category_name(raw);
                failure.into_result()?;
                ensure_category_name_available(&self.projection, &name, Some(category_id))?;
                Some(name)
            }
            None => None,
        };

        let mut patch = serde_json::Map::new();
        if let Some(name) = &new_name {
            patch.insert("name".into(), json!(name));
        }
        if let Some(description) = &request.description {
            patch.insert("description".into(), json!(description.trim()));
        }
        if let Some(color) = &request.color {
            patch.insert("color".into(), json!(color.trim()));
        }
        patch.insert("updatedAt".into(), json!(Utc::now()));

        self.store
            .update(Collection::Categories, category_id, patch)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        let renamed = new_name.filter(|name| *name != current.name);
        let Some(new_name) = renamed else {
            if let Err(e) = self
                .events
                .send(Event::CategoryUpdated {
                    category_id: category_id.to_string(),
                })
                .await
            {
                warn!(error = %e, "Failed to send category updated event");
            }
            return Ok(None);
        };

        let report = self
            .cascade_rename(category_id, &current.name, &new_name)
            .await?;
        Ok(Some(report))
    }

    /// Renames a category, cascading the new name to every referencing
    /// product.
    #[instrument(skip(self), fields(category_id = %category_id, new_name = %new_name))]
    pub async fn rename_category(
        &self,
        category_id: &str,
        new_name: &str,
    ) -> Result<CascadeReport, CoreError> {
        let report = self
            .update_category(
                category_id,
                UpdateCategoryRequest {
                    name: Some(new_name.to_string()),
                    ..UpdateCategoryRequest::default()
                },
            )
            .await?;

        // A same-name rename cascades over zero products.
        Ok(report.unwrap_or(CascadeReport {
            category_id: category_id.to_string(),
            old_name: new_name.to_string(),
            new_name: new_name.to_string(),
            products_updated: 0,
            failed_products: Vec::new(),
        }))
    }

    async fn cascade_rename(
        &self,
        category_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<CascadeReport, CoreError> {
        let products = self
            .store
            .list(Collection::Products)
            .await
            .map_err(CoreError::StoreReadFailed)?;

        let mut report = CascadeReport {
            category_id: category_id.to_string(),
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
            products_updated: 0,
            failed_products: Vec::new(),
        };

        for (product_id, doc) in products {
            let product: Product = match decode(&product_id, &doc) {
                Ok(product) => product,
                Err(e) => {
                    warn!(product_id = %product_id, error = %e, "Skipping malformed product during cascade");
                    continue;
                }
            };
            if product.category != old_name {
                continue;
            }

            let result = self
                .store
                .update(
                    Collection::Products,
                    &product_id,
                    super::patch(json!({
                        "category": new_name,
                        "updatedAt": Utc::now(),
                    })),
                )
                .await;
            match result {
                Ok(()) => report.products_updated += 1,
                Err(e) => {
                    error!(product_id = %product_id, error = %e, "Cascade rewrite failed");
                    report.failed_products.push(product_id);
                }
            }
        }

        info!(
            category_id = %category_id,
            old_name = %old_name,
            new_name = %new_name,
            products_updated = report.products_updated,
            failed = report.failed_products.len(),
            "Category rename cascade finished"
        );
        if let Err(e) = self
            .events
            .send(Event::CategoryRenamed {
                category_id: category_id.to_string(),
                old_name: old_name.to_string(),
                new_name: new_name.to_string(),
                products_recategorized: report.products_updated,
            })
            .await
        {
            warn!(error = %e, "Failed to send category renamed event");
        }

        if report.failed_products.is_empty() {
            Ok(report)
        } else {
            Err(CoreError::StoreWriteFailed(StoreError::Transport(format!(
                "rename cascade left {} product(s) on the old name; retry the rename",
                report.failed_products.len()
            ))))
        }
    }

    /// Deletes a category, refusing while any product still references its
    /// name.
    #[instrument(skip(self), fields(category_id = %category_id))]
    pub async fn delete_category(&self, category_id: &str) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageInventory,
            "delete_category",
        )?;
        auth::require(
            &*self.permissions,
            Capability::CanDeleteItems,
            "delete_category",
        )?;

        let category = self.fetch_category(category_id).await?;

        let products = self
            .store
            .list(Collection::Products)
            .await
            .map_err(CoreError::StoreReadFailed)?;
        let dependents = products
            .iter()
            .filter_map(|(id, doc)| decode::<Product>(id, doc).ok())
            .filter(|p| p.category == category.name)
            .count();
        if dependents > 0 {
            warn!(
                category_id = %category_id,
                name = %category.name,
                dependents,
                "Delete blocked by referencing products"
            );
            return Err(CoreError::ReferentialIntegrityViolation {
                entity: "category",
                name: category.name,
                dependents,
            });
        }

        self.store
            .delete(Collection::Categories, category_id)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(category_id = %category_id, name = %category.name, "Category deleted");
        if let Err(e) = self
            .events
            .send(Event::CategoryDeleted {
                category_id: category_id.to_string(),
                name: category.name,
            })
            .await
        {
            warn!(error = %e, "Failed to send category deleted event");
        }
        Ok(())
    }

    async fn fetch_category(&self, category_id: &str) -> Result<Category, CoreError> {
        let doc = self
            .store
            .get(Collection::Categories, category_id)
            .await
            .map_err(CoreError::StoreReadFailed)?
            .ok_or_else(|| CoreError::not_found("category", category_id))?;
        decode(category_id, &doc)
            .map_err(|e| CoreError::Other(anyhow::anyhow!("malformed category document: {e}")))
    }
}
