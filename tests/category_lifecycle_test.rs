mod common;

use assert_matches::assert_matches;
use common::{boot, boot_with, create_category, create_product, settle};
use stockroom::errors::CoreError;
use stockroom::prelude::*;
use stockroom::projection::DEFAULT_CATEGORIES;
use stockroom::services::categories::{CreateCategoryRequest, UpdateCategoryRequest};

#[tokio::test]
async fn default_categories_seed_exactly_once() {
    let fixture = boot_with(Role::Admin, true).await;
    settle(&fixture.core, |p| {
        p.len(Collection::Categories) == DEFAULT_CATEGORIES.len()
    })
    .await;
    assert!(fixture.core.projection.category_by_name("Electronics").is_some());
    assert!(fixture.core.projection.category_by_name("Other").is_some());

    // A second client booting against the same store must not re-seed.
    let second = InventoryCore::start(
        fixture.store.clone(),
        std::sync::Arc::new(RolePermissions::new(Role::Admin)),
        stockroom::config::CoreConfig::default(),
    )
    .await
    .expect("second core boots");
    assert_eq!(
        second.projection.len(Collection::Categories),
        DEFAULT_CATEGORIES.len()
    );
    assert_eq!(
        fixture.store.len(Collection::Categories),
        DEFAULT_CATEGORIES.len()
    );
}

#[tokio::test]
async fn duplicate_names_are_rejected_case_insensitively() {
    let fixture = boot(Role::Admin).await;
    create_category(&fixture.core, "Electronics").await;

    let err = fixture
        .core
        .categories
        .create_category(CreateCategoryRequest {
            name: "ELECTRONICS".to_string(),
            description: String::new(),
            color: String::new(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::DuplicateName { entity: "category", .. });
}

#[tokio::test]
async fn category_name_length_is_validated() {
    let fixture = boot(Role::Admin).await;
    let err = fixture
        .core
        .categories
        .create_category(CreateCategoryRequest {
            name: " A ".to_string(),
            description: String::new(),
            color: String::new(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::ValidationFailed(ref failure) if failure.errors[0].field == "name");
}

#[tokio::test]
async fn rename_cascades_to_every_referencing_product() {
    let fixture = boot(Role::Admin).await;
    let electronics = create_category(&fixture.core, "Electronics").await;
    create_category(&fixture.core, "Kitchen").await;

    create_product(&fixture.core, "Monitor", "Electronics", 10, 2).await;
    create_product(&fixture.core, "Keyboard", "Electronics", 10, 2).await;
    create_product(&fixture.core, "Mouse", "Electronics", 10, 2).await;
    create_product(&fixture.core, "Kettle", "Kitchen", 10, 2).await;

    let report = fixture
        .core
        .categories
        .rename_category(&electronics.id, "Gadgets")
        .await
        .expect("rename succeeds");
    assert_eq!(report.old_name, "Electronics");
    assert_eq!(report.new_name, "Gadgets");
    assert_eq!(report.products_updated, 3);
    assert!(report.failed_products.is_empty());

    settle(&fixture.core, |p| p.products_in_category("Gadgets").len() == 3).await;
    assert!(fixture.core.projection.products_in_category("Electronics").is_empty());
    assert_eq!(fixture.core.projection.products_in_category("Kitchen").len(), 1);
    settle(&fixture.core, |p| {
        p.category(&electronics.id)
            .is_some_and(|c| c.name == "Gadgets")
    })
    .await;
}

#[tokio::test]
async fn rename_to_existing_name_fails_but_excludes_self() {
    let fixture = boot(Role::Admin).await;
    let books = create_category(&fixture.core, "Books").await;
    create_category(&fixture.core, "Office").await;

    let err = fixture
        .core
        .categories
        .rename_category(&books.id, "office")
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::DuplicateName { .. });

    // Re-titling a category to its own name (case change) is allowed.
    let report = fixture
        .core
        .categories
        .rename_category(&books.id, "BOOKS")
        .await
        .expect("self-rename allowed");
    assert_eq!(report.products_updated, 0);
}

#[tokio::test]
async fn repeating_a_finished_cascade_changes_nothing() {
    let fixture = boot(Role::Admin).await;
    let category = create_category(&fixture.core, "Sports").await;
    create_product(&fixture.core, "Ball", "Sports", 5, 1).await;

    let first = fixture
        .core
        .categories
        .rename_category(&category.id, "Outdoors")
        .await
        .unwrap();
    assert_eq!(first.products_updated, 1);
    settle(&fixture.core, |p| p.products_in_category("Outdoors").len() == 1).await;

    let second = fixture
        .core
        .categories
        .rename_category(&category.id, "Outdoors")
        .await
        .unwrap();
    assert_eq!(second.products_updated, 0);
    assert_eq!(fixture.core.projection.products_in_category("Outdoors").len(), 1);
}

#[tokio::test]
async fn delete_with_dependents_fails_then_succeeds_once_empty() {
    let fixture = boot(Role::Admin).await;
    let electronics = create_category(&fixture.core, "Electronics").await;

    let p1 = create_product(&fixture.core, "Monitor", "Electronics", 10, 2).await;
    let p2 = create_product(&fixture.core, "Keyboard", "Electronics", 10, 2).await;
    let p3 = create_product(&fixture.core, "Mouse", "Electronics", 10, 2).await;

    let err = fixture
        .core
        .categories
        .delete_category(&electronics.id)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CoreError::ReferentialIntegrityViolation {
            entity: "category",
            dependents: 3,
            ..
        }
    );
    // Category and products are untouched by the refused delete.
    assert!(fixture
        .store
        .get(Collection::Categories, &electronics.id)
        .await
        .unwrap()
        .is_some());
    assert_eq!(fixture.store.len(Collection::Products), 3);

    for product in [&p1, &p2, &p3] {
        fixture
            .core
            .products
            .delete_product(&product.id)
            .await
            .expect("product deleted");
    }

    fixture
        .core
        .categories
        .delete_category(&electronics.id)
        .await
        .expect("delete succeeds once no products reference the category");
    settle(&fixture.core, |p| p.category(&electronics.id).is_none()).await;
}

#[tokio::test]
async fn staff_cannot_delete_categories() {
    let fixture = boot(Role::Staff).await;
    let category = create_category(&fixture.core, "Health").await;

    let err = fixture
        .core
        .categories
        .delete_category(&category.id)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CoreError::PermissionDenied {
            capability: Capability::CanDeleteItems,
            ..
        }
    );
}

#[tokio::test]
async fn update_without_rename_does_not_cascade() {
    let fixture = boot(Role::Admin).await;
    let category = create_category(&fixture.core, "Books").await;
    create_product(&fixture.core, "Novel", "Books", 5, 1).await;

    let report = fixture
        .core
        .categories
        .update_category(
            &category.id,
            UpdateCategoryRequest {
                description: Some("Paper goods".to_string()),
                ..UpdateCategoryRequest::default()
            },
        )
        .await
        .unwrap();
    assert!(report.is_none());

    settle(&fixture.core, |p| {
        p.category(&category.id)
            .is_some_and(|c| c.description == "Paper goods")
    })
    .await;
    assert_eq!(fixture.core.projection.products_in_category("Books").len(), 1);
}
