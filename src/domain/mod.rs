// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - inventory: product stock counters and the reserve / release ledger
// - pricing: subtotal, tax, shipping and total for a set of lines
// - order: the order aggregate and the lifecycle service driving it
//
// Persistence lives behind the store traits; nothing here talks SQL.
//
// ============================================================================

pub mod inventory;
pub mod pricing;
pub mod order;
