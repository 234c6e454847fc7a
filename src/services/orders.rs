//! Order lifecycle and stock reconciliation.
//!
//! Status transitions are caller-driven; the core does not enforce a strict
//! transition graph. The one transition with side effects is the move to
//! `completed`: each line item deducts its quantity from the referenced
//! product's stock, clamped at zero. The persisted `stockDeducted` marker
//! makes completion idempotent under re-delivered or retried transitions;
//! there is no multi-document transaction to lean on.
//!
//! Stock writes are plain read-modify-write. Two orders completing
//! concurrently against the same product race with last-write-wins
//! semantics; no compare-and-swap loop is layered on top.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::auth::{self, Capability, PermissionProvider};
use crate::config::PricingConfig;
use crate::entities::{decode, Customer, Order, OrderItem, OrderStatus, Product, StockStatus};
use crate::errors::{CoreError, ValidationFailure};
use crate::events::{Event, EventSender};
use crate::projection::Projection;
use crate::store::{Collection, EntityStore};
use crate::validation::{compute_totals, validate_order_items};

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOrderRequest {
    pub customer: Option<Customer>,
    pub items: Option<Vec<OrderItem>>,
    pub notes: Option<String>,
}

/// Per-line-item reconciliation result. One line's failure never aborts the
/// remaining lines.
#[derive(Debug, Clone)]
pub enum LineOutcome {
    Deducted {
        product_id: String,
        quantity: i64,
        previous_stock: i64,
        new_stock: i64,
        /// The requested deduction exceeded the available stock and was
        /// clamped at zero.
        clamped: bool,
    },
    /// The referenced product no longer exists; the line is skipped.
    MissingProduct { product_id: String },
    /// The line carries no product reference at all.
    Unreferenced { name: String },
    /// The stock write (or read) failed; retrying the completion retries
    /// this line.
    Failed { product_id: String, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub order_id: String,
    /// The persisted marker was already set; nothing was deducted again.
    pub already_deducted: bool,
    pub lines: Vec<LineOutcome>,
}

impl ReconciliationReport {
    pub fn deducted_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, LineOutcome::Deducted { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, LineOutcome::Failed { .. }))
            .count()
    }

    /// Every line reached a terminal outcome (deducted, or skipped with a
    /// warning). Only then is the idempotency marker persisted.
    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0
    }
}

#[derive(Debug, Clone)]
pub struct StatusChangeOutcome {
    pub order_id: String,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    /// Present only when the new status is `completed`.
    pub reconciliation: Option<ReconciliationReport>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn EntityStore>,
    projection: Arc<Projection>,
    permissions: Arc<dyn PermissionProvider>,
    events: EventSender,
    pricing: PricingConfig,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        projection: Arc<Projection>,
        permissions: Arc<dyn PermissionProvider>,
        events: EventSender,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            store,
            projection,
            permissions,
            events,
            pricing,
        }
    }

    /// Creates an order in `pending` state. Totals are recomputed from the
    /// line items; caller-supplied totals are never trusted.
    #[instrument(skip(self, request), fields(customer = %request.customer.name, items = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageOrders,
            "create_order",
        )?;

        let mut failure = ValidationFailure::new();
        if let Err(errors) = request.customer.validate() {
            failure.absorb_prefixed("customer", &errors);
        }
        let item_failure = validate_order_items(&request.items);
        failure.errors.extend(item_failure.errors);
        failure.into_result()?;

        let totals = compute_totals(&request.items, &self.pricing);
        let now = Utc::now();
        let mut order = Order {
            id: String::new(),
            customer: request.customer,
            items: request.items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping: totals.shipping,
            total: totals.total,
            status: OrderStatus::Pending,
            date: now.date_naive(),
            notes: request.notes,
            stock_deducted: false,
            created_at: now,
            updated_at: Some(now),
        };

        let id = self
            .store
            .create(Collection::Orders, crate::store::to_document(&order))
            .await
            .map_err(CoreError::StoreWriteFailed)?;
        order.id = id.clone();

        info!(order_id = %id, total = %order.total, "Order created");
        if let Err(e) = self
            .events
            .send(Event::OrderCreated {
                order_id: id,
                total: order.total,
            })
            .await
        {
            warn!(error = %e, "Failed to send order created event");
        }
        Ok(order)
    }

    /// Updates customer data, items, or notes. Changing the items
    /// recomputes the totals.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        order_id: &str,
        request: UpdateOrderRequest,
    ) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageOrders,
            "update_order",
        )?;

        self.fetch_order(order_id).await?;

        let mut failure = ValidationFailure::new();
        if let Some(customer) = &request.customer {
            if let Err(errors) = customer.validate() {
                failure.absorb_prefixed("customer", &errors);
            }
        }
        if let Some(items) = &request.items {
            failure.errors.extend(validate_order_items(items).errors);
        }
        failure.into_result()?;

        let mut patch = serde_json::Map::new();
        if let Some(customer) = &request.customer {
            patch.insert("customer".into(), json!(customer));
        }
        if let Some(items) = &request.items {
            let totals = compute_totals(items, &self.pricing);
            patch.insert("items".into(), json!(items));
            patch.insert("subtotal".into(), json!(totals.subtotal));
            patch.insert("tax".into(), json!(totals.tax));
            patch.insert("shipping".into(), json!(totals.shipping));
            patch.insert("total".into(), json!(totals.total));
        }
        if let Some(notes) = &request.notes {
            patch.insert("notes".into(), json!(notes));
        }
        patch.insert("updatedAt".into(), json!(Utc::now()));

        self.store
            .update(Collection::Orders, order_id, patch)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(order_id = %order_id, "Order updated");
        if let Err(e) = self
            .events
            .send(Event::OrderUpdated {
                order_id: order_id.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send order updated event");
        }
        Ok(())
    }

    /// Moves an order to a new status. A transition whose new status is
    /// exactly `completed` additionally runs stock reconciliation.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: &str,
        new_status: &str,
    ) -> Result<StatusChangeOutcome, CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageOrders,
            "update_order_status",
        )?;

        let status = OrderStatus::from_str(new_status).map_err(|_| {
            let mut failure = ValidationFailure::new();
            failure.push("status", format!("invalid status: {new_status}"));
            CoreError::ValidationFailed(failure)
        })?;

        let order = self.fetch_order(order_id).await?;
        let old_status = order.status;

        self.store
            .update(
                Collection::Orders,
                order_id,
                super::patch(json!({
                    "status": status,
                    "updatedAt": Utc::now(),
                })),
            )
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %status,
            "Order status updated"
        );
        if let Err(e) = self
            .events
            .send(Event::OrderStatusChanged {
                order_id: order_id.to_string(),
                old_status,
                new_status: status,
            })
            .await
        {
            warn!(error = %e, "Failed to send order status event");
        }

        let reconciliation = if status == OrderStatus::Completed {
            Some(self.reconcile_stock(order_id, &order).await?)
        } else {
            None
        };

        Ok(StatusChangeOutcome {
            order_id: order_id.to_string(),
            old_status,
            new_status: status,
            reconciliation,
        })
    }

    /// Applies the per-line stock deductions for a completed order.
    ///
    /// Each line is an independent unit of work: missing products are
    /// skipped with a warning, write failures are recorded and the rest of
    /// the lines still run, and nothing is rolled back. The `stockDeducted`
    /// marker is persisted once every line has a terminal outcome, making a
    /// re-delivered completion a no-op.
    async fn reconcile_stock(
        &self,
        order_id: &str,
        order: &Order,
    ) -> Result<ReconciliationReport, CoreError> {
        let mut report = ReconciliationReport {
            order_id: order_id.to_string(),
            already_deducted: false,
            lines: Vec::new(),
        };

        if order.stock_deducted {
            info!(order_id = %order_id, "Stock already deducted for order, skipping");
            report.already_deducted = true;
            return Ok(report);
        }

        for item in &order.items {
            let Some(product_id) = item.product_ref() else {
                warn!(order_id = %order_id, item = %item.name, "Order item has no product reference");
                report.lines.push(LineOutcome::Unreferenced {
                    name: item.name.clone(),
                });
                continue;
            };

            let doc = match self.store.get(Collection::Products, product_id).await {
                Ok(doc) => doc,
                Err(e) => {
                    error!(order_id = %order_id, product_id = %product_id, error = %e, "Stock read failed");
                    report.lines.push(LineOutcome::Failed {
                        product_id: product_id.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let Some(doc) = doc else {
                warn!(order_id = %order_id, product_id = %product_id, "Product not found, skipping line item");
                report.lines.push(LineOutcome::MissingProduct {
                    product_id: product_id.to_string(),
                });
                continue;
            };
            let product: Product = match decode(product_id, &doc) {
                Ok(product) => product,
                Err(e) => {
                    warn!(order_id = %order_id, product_id = %product_id, error = %e, "Malformed product document, skipping line item");
                    report.lines.push(LineOutcome::MissingProduct {
                        product_id: product_id.to_string(),
                    });
                    continue;
                }
            };

            let previous_stock = product.stock;
            let new_stock = (previous_stock - item.quantity).max(0);
            let clamped = previous_stock - item.quantity < 0;

            let write = self
                .store
                .update(
                    Collection::Products,
                    product_id,
                    super::patch(json!({
                        "stock": new_stock,
                        "updatedAt": Utc::now(),
                    })),
                )
                .await;
            match write {
                Ok(()) => {
                    if clamped {
                        warn!(
                            order_id = %order_id,
                            product_id = %product_id,
                            previous_stock,
                            quantity = item.quantity,
                            "Deduction exceeded available stock, clamped at zero"
                        );
                    }
                    report.lines.push(LineOutcome::Deducted {
                        product_id: product_id.to_string(),
                        quantity: item.quantity,
                        previous_stock,
                        new_stock,
                        clamped,
                    });
                    if let Err(e) = self
                        .events
                        .send(Event::StockDeducted {
                            order_id: order_id.to_string(),
                            product_id: product_id.to_string(),
                            quantity: item.quantity,
                            previous_stock,
                            new_stock,
                        })
                        .await
                    {
                        warn!(error = %e, "Failed to send stock deducted event");
                    }
                    if StockStatus::classify(new_stock, product.low_stock_threshold)
                        != StockStatus::InStock
                    {
                        if let Err(e) = self
                            .events
                            .send(Event::LowStockDetected {
                                product_id: product_id.to_string(),
                                stock: new_stock,
                                threshold: product.low_stock_threshold,
                            })
                            .await
                        {
                            warn!(error = %e, "Failed to send low stock event");
                        }
                    }
                }
                Err(e) => {
                    error!(order_id = %order_id, product_id = %product_id, error = %e, "Stock write failed");
                    report.lines.push(LineOutcome::Failed {
                        product_id: product_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            self.store
                .update(
                    Collection::Orders,
                    order_id,
                    super::patch(json!({
                        "stockDeducted": true,
                        "updatedAt": Utc::now(),
                    })),
                )
                .await
                .map_err(CoreError::StoreWriteFailed)?;
        } else {
            warn!(
                order_id = %order_id,
                failed = report.failed_count(),
                "Reconciliation incomplete, idempotency marker not set"
            );
        }

        info!(
            order_id = %order_id,
            deducted = report.deducted_count(),
            lines = report.lines.len(),
            "Stock reconciliation finished"
        );
        Ok(report)
    }

    /// Deletes an order. Orders in `completed` or `shipped` state are
    /// policy-blocked.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(&self, order_id: &str) -> Result<(), CoreError> {
        auth::require(
            &*self.permissions,
            Capability::CanManageOrders,
            "delete_order",
        )?;
        auth::require(
            &*self.permissions,
            Capability::CanDeleteItems,
            "delete_order",
        )?;

        let order = self.fetch_order(order_id).await?;
        if order.status.blocks_deletion() {
            return Err(CoreError::InvalidOperation(format!(
                "cannot delete order in status {}",
                order.status
            )));
        }

        self.store
            .delete(Collection::Orders, order_id)
            .await
            .map_err(CoreError::StoreWriteFailed)?;

        info!(order_id = %order_id, "Order deleted");
        if let Err(e) = self
            .events
            .send(Event::OrderDeleted {
                order_id: order_id.to_string(),
            })
            .await
        {
            warn!(error = %e, "Failed to send order deleted event");
        }
        Ok(())
    }

    /// Projection-backed read; no permission required.
    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.projection.order(order_id)
    }

    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<Order> {
        self.projection.orders_by_status(status)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Order, CoreError> {
        let doc = self
            .store
            .get(Collection::Orders, order_id)
            .await
            .map_err(CoreError::StoreReadFailed)?
            .ok_or_else(|| CoreError::not_found("order", order_id))?;
        decode(order_id, &doc)
            .map_err(|e| CoreError::Other(anyhow::anyhow!("malformed order document: {e}")))
    }
}
