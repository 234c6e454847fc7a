mod common;

use assert_matches::assert_matches;
use common::{boot, create_category, create_product, customer, item, settle};
use rust_decimal_macros::dec;
use serde_json::json;
use stockroom::errors::CoreError;
use stockroom::prelude::*;
use stockroom::services::orders::CreateOrderRequest;

async fn stock_of(fixture: &common::TestCore, product_id: &str) -> i64 {
    fixture
        .store
        .get(Collection::Products, product_id)
        .await
        .unwrap()
        .expect("product exists")
        .get("stock")
        .and_then(serde_json::Value::as_i64)
        .expect("stock field")
}

#[tokio::test]
async fn totals_are_recomputed_from_items() {
    let fixture = boot(Role::Admin).await;
    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![
                item("p1", "Widget", dec!(10.00), 2),
                item("p2", "Gadget", dec!(5.00), 1),
            ],
            notes: None,
        })
        .await
        .expect("order created");

    assert_eq!(order.subtotal, dec!(25.00));
    assert_eq!(order.tax, dec!(2.00));
    assert_eq!(order.shipping, dec!(10.00));
    assert_eq!(order.total, dec!(37.00));
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.stock_deducted);
}

#[tokio::test]
async fn order_creation_enumerates_every_violation() {
    let fixture = boot(Role::Admin).await;
    let err = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: Customer {
                name: String::new(),
                email: "not-an-email".to_string(),
                phone: "555-0100".to_string(),
                address: "1 Main St".to_string(),
            },
            items: vec![],
            notes: None,
        })
        .await
        .unwrap_err();

    let CoreError::ValidationFailed(failure) = err else {
        panic!("expected validation failure");
    };
    let fields: Vec<&str> = failure.errors.iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"customer.name"));
    assert!(fields.contains(&"customer.email"));
    assert!(fields.contains(&"items"));
}

#[tokio::test]
async fn completion_deducts_each_line_exactly_once() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Electronics").await;
    let product = create_product(&fixture.core, "Monitor", "Electronics", 5, 2).await;

    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![item(&product.id, "Monitor", dec!(10.00), 3)],
            notes: None,
        })
        .await
        .unwrap();

    let outcome = fixture
        .core
        .orders
        .update_status(&order.id, "completed")
        .await
        .expect("completion succeeds");
    let report = outcome.reconciliation.expect("completion reconciles");
    assert!(!report.already_deducted);
    assert_eq!(report.deducted_count(), 1);
    assert!(report.is_complete());
    assert_eq!(stock_of(&fixture, &product.id).await, 2);

    // Duplicate delivery of the same completion is a no-op.
    let second = fixture
        .core
        .orders
        .update_status(&order.id, "completed")
        .await
        .expect("re-completion accepted");
    let report = second.reconciliation.expect("reconciliation reported");
    assert!(report.already_deducted);
    assert_eq!(report.deducted_count(), 0);
    assert_eq!(stock_of(&fixture, &product.id).await, 2);
}

#[tokio::test]
async fn deduction_clamps_stock_at_zero() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Kitchen").await;
    let product = create_product(&fixture.core, "Kettle", "Kitchen", 2, 1).await;

    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![item(&product.id, "Kettle", dec!(20.00), 5)],
            notes: None,
        })
        .await
        .unwrap();

    let outcome = fixture
        .core
        .orders
        .update_status(&order.id, "completed")
        .await
        .unwrap();
    let report = outcome.reconciliation.unwrap();
    assert_matches!(
        report.lines[0],
        LineOutcome::Deducted {
            clamped: true,
            new_stock: 0,
            previous_stock: 2,
            ..
        }
    );
    assert_eq!(stock_of(&fixture, &product.id).await, 0);
}

#[tokio::test]
async fn missing_product_skips_line_but_deducts_the_rest() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Office").await;
    let kept = create_product(&fixture.core, "Desk", "Office", 10, 2).await;
    let doomed = create_product(&fixture.core, "Chair", "Office", 10, 2).await;

    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![
                item(&kept.id, "Desk", dec!(100.00), 2),
                item(&doomed.id, "Chair", dec!(50.00), 4),
            ],
            notes: None,
        })
        .await
        .unwrap();

    fixture.core.products.delete_product(&doomed.id).await.unwrap();

    let outcome = fixture
        .core
        .orders
        .update_status(&order.id, "completed")
        .await
        .unwrap();
    let report = outcome.reconciliation.unwrap();
    assert_eq!(report.deducted_count(), 1);
    assert!(report.is_complete());
    assert!(report
        .lines
        .iter()
        .any(|l| matches!(l, LineOutcome::MissingProduct { product_id } if *product_id == doomed.id)));
    assert_eq!(stock_of(&fixture, &kept.id).await, 8);
}

#[tokio::test]
async fn legacy_item_records_deduct_through_the_id_fallback() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Books").await;
    let product = create_product(&fixture.core, "Novel", "Books", 6, 1).await;

    // Pre-migration order document: the line's product reference lives in
    // `id`, and one line has no reference at all.
    let order_doc = json!({
        "customer": {
            "name": "Sam Doe",
            "email": "sam@example.com",
            "phone": "555-0100",
            "address": "1 Main St",
        },
        "items": [
            {"id": product.id, "name": "Novel", "price": "12.00", "quantity": 2},
            {"name": "Out-of-print title", "price": "5.00", "quantity": 1},
        ],
        "subtotal": "29.00",
        "tax": "2.32",
        "shipping": "10.00",
        "total": "41.32",
        "status": "pending",
        "date": "2024-03-01",
        "createdAt": "2024-03-01T10:00:00Z",
    });
    let order_id = fixture
        .store
        .create(Collection::Orders, order_doc.as_object().cloned().unwrap())
        .await
        .unwrap();

    let outcome = fixture
        .core
        .orders
        .update_status(&order_id, "completed")
        .await
        .unwrap();
    let report = outcome.reconciliation.unwrap();
    assert_eq!(report.deducted_count(), 1);
    assert!(report
        .lines
        .iter()
        .any(|l| matches!(l, LineOutcome::Unreferenced { name } if name == "Out-of-print title")));
    assert_eq!(stock_of(&fixture, &product.id).await, 4);

    // The marker persists on the legacy order too.
    let stored = fixture
        .store
        .get(Collection::Orders, &order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("stockDeducted"), Some(&json!(true)));
}

#[tokio::test]
async fn non_completion_transitions_do_not_touch_stock() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Sports").await;
    let product = create_product(&fixture.core, "Ball", "Sports", 7, 1).await;

    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![item(&product.id, "Ball", dec!(9.00), 3)],
            notes: None,
        })
        .await
        .unwrap();

    for status in ["confirmed", "shipped", "delivered", "cancelled"] {
        let outcome = fixture
            .core
            .orders
            .update_status(&order.id, status)
            .await
            .unwrap();
        assert!(outcome.reconciliation.is_none(), "{status} must not reconcile");
    }
    assert_eq!(stock_of(&fixture, &product.id).await, 7);
}

#[tokio::test]
async fn unknown_status_is_a_validation_failure() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Health").await;
    let product = create_product(&fixture.core, "Bandage", "Health", 3, 1).await;
    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![item(&product.id, "Bandage", dec!(4.00), 1)],
            notes: None,
        })
        .await
        .unwrap();

    let err = fixture
        .core
        .orders
        .update_status(&order.id, "archived")
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::ValidationFailed(_));
}

#[tokio::test]
async fn deletion_is_policy_blocked_for_completed_and_shipped() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Office").await;
    let product = create_product(&fixture.core, "Desk", "Office", 10, 1).await;

    let make_order = || async {
        fixture
            .core
            .orders
            .create_order(CreateOrderRequest {
                customer: customer(),
                items: vec![item(&product.id, "Desk", dec!(100.00), 1)],
                notes: None,
            })
            .await
            .unwrap()
    };

    let completed = make_order().await;
    fixture
        .core
        .orders
        .update_status(&completed.id, "completed")
        .await
        .unwrap();
    let err = fixture.core.orders.delete_order(&completed.id).await.unwrap_err();
    assert_matches!(err, CoreError::InvalidOperation(_));

    let shipped = make_order().await;
    fixture
        .core
        .orders
        .update_status(&shipped.id, "shipped")
        .await
        .unwrap();
    let err = fixture.core.orders.delete_order(&shipped.id).await.unwrap_err();
    assert_matches!(err, CoreError::InvalidOperation(_));

    let pending = make_order().await;
    fixture
        .core
        .orders
        .delete_order(&pending.id)
        .await
        .expect("pending orders are deletable");
    settle(&fixture.core, |p| p.order(&pending.id).is_none()).await;
}

#[tokio::test]
async fn staff_cannot_delete_orders() {
    let fixture = boot(Role::Staff).await;
    create_category(&fixture.core, "Kitchen").await;
    let product = create_product(&fixture.core, "Pan", "Kitchen", 4, 1).await;
    let order = fixture
        .core
        .orders
        .create_order(CreateOrderRequest {
            customer: customer(),
            items: vec![item(&product.id, "Pan", dec!(25.00), 1)],
            notes: None,
        })
        .await
        .unwrap();

    let err = fixture.core.orders.delete_order(&order.id).await.unwrap_err();
    assert_matches!(
        err,
        CoreError::PermissionDenied {
            capability: Capability::CanDeleteItems,
            ..
        }
    );
}
