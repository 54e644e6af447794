// ============================================================================
// Order Domain - Order lifecycle and its business rules
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderId, OrderStatus, Address, OrderLine)
// - Events (OrderCreated, OrderStatusChanged, OrderCancelled, ...)
// - Commands (CreateOrder, OrderCommand)
// - Errors (OrderError enum)
// - Aggregate (Order with the transition rules)
// - Order numbers (ORD-YYYYMMDD-XXXXXXXX)
// - Lifecycle service (transactional create / cancel / status updates)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod order_number;
pub mod lifecycle;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::Order;
pub use order_number::{format_order_number, OrderNumberGenerator, RandomOrderNumbers, ORDER_NUMBER_PREFIX};
pub use lifecycle::{LifecycleSettings, OrderLifecycleService};
