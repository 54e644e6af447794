use chrono::{DateTime, Utc};

use super::value_objects::{Address, OrderId, OrderLine, OrderStatus, UserId};
use crate::domain::pricing::OrderTotals;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// Open a new order. Lines are already reserved and priced by the caller.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub currency: String,
    pub payment_method: Option<String>,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Commands against an existing order
#[derive(Debug, Clone)]
pub enum OrderCommand {
    Confirm {
        at: DateTime<Utc>,
    },
    Ship {
        tracking_number: Option<String>,
        at: DateTime<Utc>,
    },
    Deliver {
        at: DateTime<Utc>,
    },
    Cancel {
        requested_by: UserId,
        at: DateTime<Utc>,
    },
    /// Admin status override. Any target is accepted.
    OverrideStatus {
        status: OrderStatus,
        tracking_number: Option<String>,
        admin_notes: Option<String>,
        at: DateTime<Utc>,
    },
}
