use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{OrderStore, StoreError, StoreTransaction, AGGREGATE_TYPE, ORDER_EVENTS_TOPIC};
use crate::domain::inventory::{Product, ProductId, ProductSnapshot};
use crate::domain::order::{Address, Order, OrderEvent, OrderId, OrderLine, OrderStatus, PaymentStatus, UserId};
use crate::domain::pricing::OrderTotals;
use crate::events::EventEnvelope;

// ============================================================================
// Postgres Store (sqlx)
// ============================================================================
//
// Row locks:
// - products are locked with SELECT ... FOR UPDATE in ascending id order,
//   so two orders touching the same products queue instead of deadlocking
// - cancellation locks the order row first, then its products
//
// ============================================================================

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut *conn, id, false).await
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();

        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.name, p.sku, p.price, p.sale_price, p.stock_quantity,
                   p.manage_stock, p.in_stock, p.sales_count, p.images,
                   c.name AS category_name, b.name AS brand_name
            FROM products p
            JOIN categories c ON c.id = p.category_id
            LEFT JOIN brands b ON b.id = p.brand_id
            WHERE p.id = ANY($1)
            ORDER BY p.id
            FOR UPDATE OF p
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        tracing::debug!(requested = ids.len(), locked = rows.len(), "Locked product rows");

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn save_product_stock(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = $2, sales_count = $3, in_stock = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product.id.0)
        .bind(product.stock_quantity)
        .bind(product.sales_count)
        .bind(product.in_stock)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
            .bind(order_number)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                id, version, order_number, user_id, status, payment_status, payment_method,
                currency, subtotal, tax_rate, tax_amount, shipping_amount, discount_amount,
                total_amount, billing_address, shipping_address, tracking_number, notes,
                admin_notes, stock_released, confirmed_at, shipped_at, delivered_at,
                cancelled_at, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26
            )
            "#,
        )
        .bind(order.id.0)
        .bind(order.version)
        .bind(&order.order_number)
        .bind(order.user_id.0)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_method)
        .bind(&order.currency)
        .bind(order.totals.subtotal)
        .bind(order.totals.tax_rate)
        .bind(order.totals.tax_amount)
        .bind(order.totals.shipping_amount)
        .bind(order.totals.discount_amount)
        .bind(order.totals.total_amount)
        .bind(Json(&order.billing_address))
        .bind(Json(&order.shipping_address))
        .bind(&order.tracking_number)
        .bind(&order.notes)
        .bind(&order.admin_notes)
        .bind(order.stock_released)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await;

        if let Err(sqlx::Error::Database(db)) = &inserted {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return Err(StoreError::Conflict(format!("order number {} taken", order.order_number)));
            }
        }
        inserted?;

        for (line_number, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, line_number, product_id, product_name, product_sku,
                    product_details, quantity, price, total
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(line.id)
            .bind(order.id.0)
            .bind(line_number as i32)
            .bind(line.product_id.0)
            .bind(&line.product_name)
            .bind(&line.product_sku)
            .bind(Json(&line.product_details))
            .bind(line.quantity)
            .bind(line.price)
            .bind(line.total)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        fetch_order(&mut *self.tx, id, true).await
    }

    async fn update_order(&mut self, order: &Order, expected_version: i64) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET version = $3, status = $4, payment_status = $5, tracking_number = $6,
                admin_notes = $7, stock_released = $8, confirmed_at = $9, shipped_at = $10,
                delivered_at = $11, cancelled_at = $12, updated_at = $13
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.0)
        .bind(expected_version)
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.tracking_number)
        .bind(&order.admin_notes)
        .bind(order.stock_released)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {} moved past version {}",
                order.id, expected_version
            )));
        }
        Ok(())
    }

    async fn append_events(&mut self, events: &[EventEnvelope<OrderEvent>]) -> Result<(), StoreError> {
        for envelope in events {
            sqlx::query(
                r#"
                INSERT INTO outbox_messages (
                    id, aggregate_id, aggregate_type, event_id, event_type, event_version,
                    sequence_number, payload, topic, partition_key, causation_id,
                    correlation_id, user_id, metadata, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(envelope.aggregate_id)
            .bind(AGGREGATE_TYPE)
            .bind(envelope.event_id)
            .bind(&envelope.event_type)
            .bind(envelope.event_version)
            .bind(envelope.sequence_number)
            .bind(Json(&envelope.event_data))
            .bind(ORDER_EVENTS_TOPIC)
            .bind(envelope.aggregate_id.to_string())
            .bind(envelope.causation_id)
            .bind(envelope.correlation_id)
            .bind(envelope.user_id)
            .bind(Json(&envelope.metadata))
            .bind(envelope.timestamp)
            .execute(&mut *self.tx)
            .await?;
        }

        tracing::debug!(event_count = events.len(), "Appended events to outbox");
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_order(conn: &mut PgConnection, id: OrderId, for_update: bool) -> Result<Option<Order>, StoreError> {
    let sql = if for_update {
        "SELECT * FROM orders WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM orders WHERE id = $1"
    };

    let Some(row) = sqlx::query_as::<_, OrderRow>(sql)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let lines: Vec<OrderLineRow> = sqlx::query_as(
        r#"
        SELECT id, product_id, product_name, product_sku, product_details, quantity, price, total
        FROM order_items
        WHERE order_id = $1
        ORDER BY line_number
        "#,
    )
    .bind(id.0)
    .fetch_all(&mut *conn)
    .await?;

    row.into_order(lines).map(Some)
}

// ============================================================================
// Row Mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    sku: String,
    price: Decimal,
    sale_price: Option<Decimal>,
    stock_quantity: i32,
    manage_stock: bool,
    in_stock: bool,
    sales_count: i32,
    images: Json<Vec<String>>,
    category_name: String,
    brand_name: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId(row.id),
            name: row.name,
            sku: row.sku,
            price: row.price,
            sale_price: row.sale_price,
            stock_quantity: row.stock_quantity,
            manage_stock: row.manage_stock,
            in_stock: row.in_stock,
            sales_count: row.sales_count,
            images: row.images.0,
            category_name: row.category_name,
            brand_name: row.brand_name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    version: i64,
    order_number: String,
    user_id: i64,
    status: String,
    payment_status: String,
    payment_method: Option<String>,
    currency: String,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    shipping_amount: Decimal,
    discount_amount: Decimal,
    total_amount: Decimal,
    billing_address: Json<Address>,
    shipping_address: Json<Address>,
    tracking_number: Option<String>,
    notes: Option<String>,
    admin_notes: Option<String>,
    stock_released: bool,
    confirmed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: Uuid,
    product_id: i64,
    product_name: String,
    product_sku: String,
    product_details: Json<ProductSnapshot>,
    quantity: i32,
    price: Decimal,
    total: Decimal,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLineRow>) -> Result<Order, StoreError> {
        Ok(Order {
            id: OrderId(self.id),
            version: self.version,
            order_number: self.order_number,
            user_id: UserId(self.user_id),
            status: self.status.parse::<OrderStatus>().map_err(StoreError::InvalidData)?,
            payment_status: self.payment_status.parse::<PaymentStatus>().map_err(StoreError::InvalidData)?,
            payment_method: self.payment_method,
            currency: self.currency,
            totals: OrderTotals {
                subtotal: self.subtotal,
                tax_rate: self.tax_rate,
                tax_amount: self.tax_amount,
                shipping_amount: self.shipping_amount,
                discount_amount: self.discount_amount,
                total_amount: self.total_amount,
            },
            billing_address: self.billing_address.0,
            shipping_address: self.shipping_address.0,
            lines: lines
                .into_iter()
                .map(|line| OrderLine {
                    id: line.id,
                    product_id: ProductId(line.product_id),
                    product_name: line.product_name,
                    product_sku: line.product_sku,
                    product_details: line.product_details.0,
                    quantity: line.quantity,
                    price: line.price,
                    total: line.total,
                })
                .collect(),
            tracking_number: self.tracking_number,
            notes: self.notes,
            admin_notes: self.admin_notes,
            stock_released: self.stock_released,
            confirmed_at: self.confirmed_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
