mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;

#[tokio::test]
async fn single_increment_and_stock_level() {
    let app = TestApp::new().await;
    app.seed_product("A", dec!(100), None, 3).await;
    let inventory = &app.state.services.inventory;

    inventory.increment_orders("A", 2).await.unwrap();
    let level = inventory.stock_level("A").await.unwrap();
    assert_eq!(level.orders, 2);
    assert!(!level.out_of_stock);

    inventory.increment_orders("A", 1).await.unwrap();
    assert!(inventory.stock_level("A").await.unwrap().out_of_stock);

    assert_matches!(
        inventory.increment_orders("A", 0).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        inventory.increment_orders("missing", 1).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        inventory.stock_level("missing").await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn batch_sums_repeated_products() {
    let app = TestApp::new().await;
    app.seed_product("A", dec!(100), None, 50).await;
    app.seed_product("B", dec!(100), None, 50).await;

    let touched = app
        .state
        .services
        .inventory
        .increment_for_order(
            "order_batch",
            &[("A".into(), 2), ("B".into(), 1), ("A".into(), 3)],
        )
        .await
        .unwrap();

    assert_eq!(touched, 2);
    assert_eq!(app.product_orders("A").await, 5);
    assert_eq!(app.product_orders("B").await, 1);
}

#[tokio::test]
async fn batch_with_unknown_product_changes_nothing() {
    let app = TestApp::new().await;
    app.seed_product("A", dec!(100), None, 50).await;

    assert_matches!(
        app.state
            .services
            .inventory
            .increment_for_order("order_bad", &[("A".into(), 2), ("Z".into(), 1)])
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(app.product_orders("A").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_not_lost() {
    let app = TestApp::new().await;
    app.seed_product("A", dec!(100), None, 1000).await;

    let tasks = (0..20).map(|_| {
        let inventory = app.state.services.inventory.clone();
        tokio::spawn(async move { inventory.increment_orders("A", 1).await })
    });
    for joined in futures::future::join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    assert_eq!(app.product_orders("A").await, 20);
}
