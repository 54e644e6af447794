use rust_decimal::Decimal;

use super::value_objects::{OrderId, OrderStatus};
use crate::domain::inventory::{InventoryError, ProductId};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product {product_name} is out of stock: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: i32,
        available: i32,
    },

    #[error("Not allowed to act on this order")]
    Unauthorized,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(i32),

    /// Negative, or finer than whole cents
    #[error("Invalid unit price: {0}")]
    InvalidPrice(Decimal),

    /// The cause is logged where it happens and never surfaced.
    #[error("Order could not be saved, please try again")]
    PersistenceFailure,

    #[error("Aggregate not initialized")]
    NotInitialized,
}

impl From<InventoryError> for OrderError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock { product_id, product_name, requested, available } => {
                OrderError::InsufficientStock { product_id, product_name, requested, available }
            }
            InventoryError::InvalidQuantity(quantity) => OrderError::InvalidQuantity(quantity),
        }
    }
}
