// ============================================================================
// Pricing Domain - Totals, tax and shipping for an order
// ============================================================================

pub mod calculator;

pub use calculator::*;
