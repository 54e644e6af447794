//! Integration tests for the Postgres store.
//!
//! These run against a real Postgres started with testcontainers.
//! Docker must be available, so they are ignored by default:
//!
//! ```sh
//! cargo test --test pg_store -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;

use storefront_orders::clock::SystemClock;
use storefront_orders::domain::inventory::{reserve, ProductId};
use storefront_orders::domain::order::{
    Actor, Address, CreateOrderRequest, LifecycleSettings, Order, OrderError, OrderId, OrderLifecycleService,
    OrderLineRequest, OrderStatus,
};
use storefront_orders::domain::pricing::{PricingCalculator, PricingConfig};
use storefront_orders::store::{OrderStore, PgStore, StoreError};

const CUSTOMER: i64 = 10;

/// Start Postgres, apply the migrations and seed one customer
async fn setup() -> (ContainerAsync<Postgres>, Arc<PgStore>, PgPool) {
    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start postgres container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get postgres port");
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    // The port is mapped before Postgres accepts connections
    let mut pool = None;
    for _ in 0..60 {
        match PgPoolOptions::new().max_connections(5).connect(&url).await {
            Ok(p) => {
                pool = Some(p);
                break;
            }
            Err(_) => tokio::time::sleep(std::time::Duration::from_secs(1)).await,
        }
    }
    let pool = pool.expect("Postgres never became ready");

    let store = PgStore::new(pool.clone());
    store.migrate().await.expect("Failed to run migrations");

    sqlx::query("INSERT INTO users (id, email) VALUES ($1, 'shopper@example.com')")
        .bind(CUSTOMER)
        .execute(&pool)
        .await
        .expect("Failed to seed user");

    (container, Arc::new(store), pool)
}

async fn seed_product(pool: &PgPool, sku: &str, stock: i32) -> ProductId {
    let category_id: i64 = sqlx::query_scalar(
        "INSERT INTO categories (name, slug) VALUES ('Home', $1) RETURNING id",
    )
    .bind(format!("home-{sku}"))
    .fetch_one(pool)
    .await
    .expect("Failed to seed category");

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO products (name, sku, price, stock_quantity, in_stock, images, category_id)
        VALUES ($1, $2, 20.00, $3, $4, '["https://cdn.example.com/lamp.jpg"]'::jsonb, $5)
        RETURNING id
        "#,
    )
    .bind(format!("Lamp {sku}"))
    .bind(sku)
    .bind(stock)
    .bind(stock > 0)
    .bind(category_id)
    .fetch_one(pool)
    .await
    .expect("Failed to seed product");

    ProductId(id)
}

async fn stock_of(pool: &PgPool, id: ProductId) -> (i32, i32, bool) {
    sqlx::query_as("SELECT stock_quantity, sales_count, in_stock FROM products WHERE id = $1")
        .bind(id.0)
        .fetch_one(pool)
        .await
        .expect("Failed to read product")
}

fn service(store: Arc<PgStore>) -> OrderLifecycleService {
    OrderLifecycleService::new(
        store,
        Arc::new(SystemClock),
        PricingCalculator::new(PricingConfig::default()),
        LifecycleSettings::default(),
    )
}

fn address() -> Address {
    Address {
        name: "Wanjiru Kamau".to_string(),
        line1: "12 Moi Avenue".to_string(),
        line2: None,
        city: "Nairobi".to_string(),
        state: None,
        postal_code: "00100".to_string(),
        country: "KE".to_string(),
        phone: Some("+254700000000".to_string()),
    }
}

fn request(product_id: ProductId, quantity: i32, unit_price: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        lines: vec![OrderLineRequest { product_id, quantity, unit_price }],
        payment_method: Some("mpesa".to_string()),
        billing_address: address(),
        shipping_address: address(),
        notes: None,
    }
}

async fn place_order(store: Arc<PgStore>, product_id: ProductId, quantity: i32) -> Order {
    service(store)
        .create_order(Actor::customer(CUSTOMER), request(product_id, quantity, dec!(20.00)))
        .await
        .expect("Failed to place order")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_orders_for_last_units_one_wins() {
    let (_container, store, pool) = setup().await;
    let lamp = seed_product(&pool, "LAMP-1", 3).await;

    let orders = Arc::new(service(store.clone()));
    let first = {
        let orders = orders.clone();
        tokio::spawn(async move {
            orders
                .create_order(Actor::customer(CUSTOMER), request(lamp, 2, dec!(20.00)))
                .await
        })
    };
    let second = {
        let orders = orders.clone();
        tokio::spawn(async move {
            orders
                .create_order(Actor::customer(CUSTOMER), request(lamp, 2, dec!(20.00)))
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let placed = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(OrderError::InsufficientStock { available: 1, .. })))
        .count();

    assert_eq!(placed, 1, "exactly one order should get the stock: {results:?}");
    assert_eq!(short, 1);
    assert_eq!(stock_of(&pool, lamp).await, (1, 2, true));

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rollback_after_stock_save_leaves_stock_unchanged() {
    let (_container, store, pool) = setup().await;
    let lamp = seed_product(&pool, "LAMP-2", 5).await;

    let mut tx = store.begin().await.expect("Failed to begin");
    let mut products = tx.lock_products(&[lamp]).await.expect("Failed to lock");
    assert_eq!(products.len(), 1);
    reserve(&mut products[0], 5).expect("Failed to reserve");
    tx.save_product_stock(&products[0]).await.expect("Failed to save stock");
    tx.rollback().await.expect("Failed to roll back");

    assert_eq!(stock_of(&pool, lamp).await, (5, 0, true));

    let mut tx = store.begin().await.expect("Failed to begin");
    let products = tx.lock_products(&[lamp]).await.expect("Failed to lock");
    assert_eq!(products[0].stock_quantity, 5);
    assert!(products[0].in_stock);
    tx.rollback().await.expect("Failed to roll back");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_order_number_is_a_conflict() {
    let (_container, store, pool) = setup().await;
    let lamp = seed_product(&pool, "LAMP-3", 5).await;
    let existing = place_order(store.clone(), lamp, 1).await;

    let mut twin = existing.clone();
    twin.id = OrderId::generate();

    let mut tx = store.begin().await.expect("Failed to begin");
    assert!(tx
        .order_number_exists(&existing.order_number)
        .await
        .expect("Failed to check order number"));
    let result = tx.insert_order(&twin).await;
    assert!(
        matches!(result, Err(StoreError::Conflict(_))),
        "expected Conflict, got {result:?}"
    );
    tx.rollback().await.expect("Failed to roll back");

    assert!(store.load_order(twin.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stale_expected_version_is_a_conflict() {
    let (_container, store, pool) = setup().await;
    let lamp = seed_product(&pool, "LAMP-4", 5).await;
    let order = place_order(store.clone(), lamp, 1).await;

    let mut confirmed = order.clone();
    confirmed.version += 1;
    confirmed.status = OrderStatus::Confirmed;

    let mut tx = store.begin().await.expect("Failed to begin");
    tx.update_order(&confirmed, order.version)
        .await
        .expect("First writer should succeed");
    tx.commit().await.expect("Failed to commit");

    let mut cancelled = order.clone();
    cancelled.version += 1;
    cancelled.status = OrderStatus::Cancelled;

    let mut tx = store.begin().await.expect("Failed to begin");
    let result = tx.update_order(&cancelled, order.version).await;
    assert!(
        matches!(result, Err(StoreError::Conflict(_))),
        "expected Conflict, got {result:?}"
    );
    tx.rollback().await.expect("Failed to roll back");

    let stored = store.load_order(order.id).await.unwrap().expect("order exists");
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.version, order.version + 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cancel_round_trip_persists_released_flag() {
    let (_container, store, pool) = setup().await;
    let lamp = seed_product(&pool, "LAMP-5", 4).await;
    let orders = service(store.clone());

    let order = orders
        .create_order(Actor::customer(CUSTOMER), request(lamp, 3, dec!(20.00)))
        .await
        .expect("Failed to place order");
    assert_eq!(stock_of(&pool, lamp).await, (1, 3, true));

    let cancelled = orders
        .cancel_order(Actor::customer(CUSTOMER), order.id)
        .await
        .expect("Failed to cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(&pool, lamp).await, (4, 0, true));

    let stored = store.load_order(order.id).await.unwrap().expect("order exists");
    assert!(stored.stock_released);
    assert_eq!(stored.lines.len(), 1);
    assert_eq!(stored.totals, order.totals);

    let outbox: Vec<String> =
        sqlx::query_scalar("SELECT event_type FROM outbox_messages WHERE aggregate_id = $1 ORDER BY sequence_number")
            .bind(order.id.0)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(outbox.len(), 2);
}
