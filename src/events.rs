//! Domain event channel.
//!
//! Services publish lifecycle and reconciliation events after the
//! corresponding store write succeeds. Consumers (alerting, audit, UI
//! notification bridges) attach by draining the receiver; [`process_events`]
//! is the default consumer, which logs each event.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Category events
    CategoryCreated {
        category_id: String,
        name: String,
    },
    CategoryUpdated {
        category_id: String,
    },
    CategoryRenamed {
        category_id: String,
        old_name: String,
        new_name: String,
        products_recategorized: usize,
    },
    CategoryDeleted {
        category_id: String,
        name: String,
    },

    // Product events
    ProductCreated {
        product_id: String,
        sku: String,
    },
    ProductUpdated {
        product_id: String,
    },
    ProductDeleted {
        product_id: String,
    },
    StockLevelSet {
        product_id: String,
        old_stock: i64,
        new_stock: i64,
    },

    // Supplier events
    SupplierCreated {
        supplier_id: String,
    },
    SupplierUpdated {
        supplier_id: String,
    },
    SupplierDeleted {
        supplier_id: String,
    },

    // Order events
    OrderCreated {
        order_id: String,
        total: Decimal,
    },
    OrderUpdated {
        order_id: String,
    },
    OrderStatusChanged {
        order_id: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderDeleted {
        order_id: String,
    },

    // Reconciliation events
    StockDeducted {
        order_id: String,
        product_id: String,
        quantity: i64,
        previous_stock: i64,
        new_stock: i64,
    },
    LowStockDetected {
        product_id: String,
        stock: i64,
        threshold: i64,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Default event consumer: drains the channel and logs every event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CategoryRenamed {
                ref category_id,
                ref old_name,
                ref new_name,
                products_recategorized,
            } => {
                info!(
                    category_id = %category_id,
                    old_name = %old_name,
                    new_name = %new_name,
                    products_recategorized,
                    "Category renamed"
                );
            }
            Event::StockDeducted {
                ref order_id,
                ref product_id,
                quantity,
                previous_stock,
                new_stock,
            } => {
                info!(
                    order_id = %order_id,
                    product_id = %product_id,
                    quantity,
                    previous_stock,
                    new_stock,
                    "Stock deducted for completed order"
                );
            }
            Event::LowStockDetected {
                ref product_id,
                stock,
                threshold,
            } => {
                warn!(
                    product_id = %product_id,
                    stock,
                    threshold,
                    "Product is low on stock"
                );
            }
            Event::OrderStatusChanged {
                ref order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            ref other => {
                info!("Event: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::ProductCreated {
                product_id: "p1".into(),
                sku: "EL-WID-0001".into(),
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Event::ProductCreated { product_id, .. } => assert_eq!(product_id, "p1"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::Generic {
                message: "orphaned".into(),
                timestamp: Utc::now(),
            })
            .await
            .is_err());
    }
}
