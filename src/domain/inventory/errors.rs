use super::value_objects::ProductId;

// ============================================================================
// Inventory Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InventoryError {
    #[error("Product {product_name} is out of stock: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: i32,
        available: i32,
    },

    #[error("Invalid stock quantity: {0}")]
    InvalidQuantity(i32),
}
