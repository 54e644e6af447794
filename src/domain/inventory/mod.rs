// ============================================================================
// Inventory Domain - Product stock ledger
// ============================================================================
//
// - Value objects (ProductId, Product, ProductSnapshot, StockMovement)
// - Errors (InventoryError)
// - Ledger (reserve / release)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod ledger;

pub use value_objects::*;
pub use errors::*;
pub use ledger::{reserve, release};
