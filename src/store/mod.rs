use async_trait::async_trait;

use crate::domain::inventory::{Product, ProductId};
use crate::domain::order::{Order, OrderEvent, OrderId};
use crate::events::EventEnvelope;
use crate::utils::IsTransient;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Order Store - Persistence port for the order lifecycle
// ============================================================================
//
// One StoreTransaction per unit of work. Everything written through it
// (stock counters, order header and lines, outbox rows) becomes visible
// on commit or not at all. Dropping a transaction without commit rolls
// it back.
//
// ============================================================================

pub const AGGREGATE_TYPE: &str = "Order";
pub const ORDER_EVENTS_TOPIC: &str = "order-events";

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Read without locking
    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Lock the given products for the rest of the transaction.
    ///
    /// Ids must be distinct and ascending. Unknown ids are absent from the result.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError>;

    /// Persist stock_quantity, sales_count and in_stock of a locked product
    async fn save_product_stock(&mut self, product: &Product) -> Result<(), StoreError>;

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool, StoreError>;

    /// Insert header and lines
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Write the mutable header fields, failing with `Conflict` when the stored
    /// version is no longer `expected_version`
    async fn update_order(&mut self, order: &Order, expected_version: i64) -> Result<(), StoreError>;

    /// Outbox rows for the events of this unit of work
    async fn append_events(&mut self, events: &[EventEnvelope<OrderEvent>]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Outcome unknown to the caller, never retried
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("No free order number after {0} attempts")]
    OrderNumberExhausted(u32),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Store operation timed out")]
    Timeout,
}

/// Postgres error codes worth a fresh transaction
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const LOCK_NOT_AVAILABLE: &str = "55P03";

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::PoolTimedOut) | StoreError::Database(sqlx::Error::Io(_)) => true,
            StoreError::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some(DEADLOCK_DETECTED | SERIALIZATION_FAILURE | LOCK_NOT_AVAILABLE)
            ),
            StoreError::Conflict(_) | StoreError::Timeout => true,
            StoreError::Database(_)
            | StoreError::CommitFailed(_)
            | StoreError::Serialization(_)
            | StoreError::OrderNumberExhausted(_)
            | StoreError::InvalidData(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(StoreError::Timeout.is_transient());
        assert!(StoreError::Conflict("version moved".to_string()).is_transient());

        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::CommitFailed("connection reset".to_string()).is_transient());
        assert!(!StoreError::OrderNumberExhausted(5).is_transient());
        assert!(!StoreError::InvalidData("status".to_string()).is_transient());
    }
}
