use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pricing::OrderTotals;
use crate::events::DomainEvent;
use super::value_objects::{Address, OrderId, OrderLine, OrderStatus, UserId};

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    StatusChanged(OrderStatusChanged),
    AdminNotesUpdated(AdminNotesUpdated),
    Cancelled(OrderCancelled),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::AdminNotesUpdated(_) => "OrderAdminNotesUpdated",
            OrderEvent::Cancelled(_) => "OrderCancelled",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Created - Initial event in order lifecycle, carries the full snapshot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCreated {
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
    pub created_at: DateTime<Utc>,
}

/// Order Status Changed - typed transition or admin override
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Only carried when the target is shipped
    pub tracking_number: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Admin Notes Updated - replaces the notes, None clears them
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdminNotesUpdated {
    pub admin_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Order Cancelled - by the owning customer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCancelled {
    pub from: OrderStatus,
    pub cancelled_by: UserId,
    /// False when an earlier cancellation already returned the stock
    pub releases_stock: bool,
    pub cancelled_at: DateTime<Utc>,
}
