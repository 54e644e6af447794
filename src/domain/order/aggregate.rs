use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pricing::OrderTotals;
use crate::events::Aggregate;
use super::commands::{CreateOrder, OrderCommand};
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{Address, OrderId, OrderLine, OrderStatus, PaymentStatus, UserId};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub version: i64,
    pub order_number: String,
    pub user_id: UserId,

    // Current State (derived from events)
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub currency: String,
    pub totals: OrderTotals,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub lines: Vec<OrderLine>,

    // Optional fields
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,

    /// Set by the first cancellation; the reservation is gone from then on
    pub stock_released: bool,

    // Audit Trail
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validate a new order and emit its first event
    pub fn handle_create(command: &CreateOrder) -> Result<Vec<OrderEvent>, OrderError> {
        validate_lines(&command.lines)?;

        Ok(vec![OrderEvent::Created(OrderCreated {
            order_id: command.order_id,
            order_number: command.order_number.clone(),
            user_id: command.user_id,
            lines: command.lines.clone(),
            totals: command.totals.clone(),
            currency: command.currency.clone(),
            payment_method: command.payment_method.clone(),
            billing_address: command.billing_address.clone(),
            shipping_address: command.shipping_address.clone(),
            notes: command.notes.clone(),
            created_at: command.at,
        })])
    }

    /// Build the aggregate from a create command, returning it with its events
    pub fn create(command: &CreateOrder) -> Result<(Self, Vec<OrderEvent>), OrderError> {
        let events = Self::handle_create(command)?;
        let (first, rest) = events.split_first().ok_or(OrderError::NotInitialized)?;

        let mut order = Self::apply_first_event(first)?;
        for event in rest {
            order.apply_event(event)?;
        }
        Ok((order, events))
    }

    pub fn total_items(&self) -> i64 {
        self.lines.iter().map(|line| i64::from(line.quantity)).sum()
    }

    fn status_changed(&self, to: OrderStatus, tracking_number: Option<String>, at: DateTime<Utc>) -> OrderEvent {
        OrderEvent::StatusChanged(OrderStatusChanged {
            from: self.status,
            to,
            tracking_number: tracking_number.filter(|_| to == OrderStatus::Shipped),
            changed_at: at,
        })
    }

    fn invalid(&self, to: OrderStatus) -> OrderError {
        OrderError::InvalidTransition { from: self.status, to }
    }

    /// First entry into a status stamps it, later entries leave it alone
    fn stamp(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        let slot = match status {
            OrderStatus::Confirmed => &mut self.confirmed_at,
            OrderStatus::Shipped => &mut self.shipped_at,
            OrderStatus::Delivered => &mut self.delivered_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
            _ => return,
        };
        slot.get_or_insert(at);
    }
}

fn validate_lines(lines: &[OrderLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyItems);
    }

    for line in lines {
        if line.quantity <= 0 {
            return Err(OrderError::InvalidQuantity(line.quantity));
        }
        if !is_valid_unit_price(line.price) {
            return Err(OrderError::InvalidPrice(line.price));
        }
    }

    Ok(())
}

/// Prices are stored to the cent, so anything finer would be rounded away
pub fn is_valid_unit_price(price: Decimal) -> bool {
    !price.is_sign_negative() && price.normalize().scale() <= 2
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                id: e.order_id,
                version: 1,
                order_number: e.order_number.clone(),
                user_id: e.user_id,
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::Pending,
                payment_method: e.payment_method.clone(),
                currency: e.currency.clone(),
                totals: e.totals.clone(),
                billing_address: e.billing_address.clone(),
                shipping_address: e.shipping_address.clone(),
                lines: e.lines.clone(),
                tracking_number: None,
                notes: e.notes.clone(),
                admin_notes: None,
                stock_released: false,
                confirmed_at: None,
                shipped_at: None,
                delivered_at: None,
                cancelled_at: None,
                created_at: e.created_at,
                updated_at: e.created_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) => {
                // First event already applied
                return Ok(());
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                self.stamp(e.to, e.changed_at);
                if let Some(tracking) = &e.tracking_number {
                    self.tracking_number = Some(tracking.clone());
                }
                self.updated_at = e.changed_at;
            }
            OrderEvent::AdminNotesUpdated(e) => {
                self.admin_notes = e.admin_notes.clone();
                self.updated_at = e.updated_at;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.stamp(OrderStatus::Cancelled, e.cancelled_at);
                self.stock_released = true;
                self.updated_at = e.cancelled_at;
            }
        }

        self.version += 1;
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Confirm { at } => {
                if self.status != OrderStatus::Pending {
                    return Err(self.invalid(OrderStatus::Confirmed));
                }

                Ok(vec![self.status_changed(OrderStatus::Confirmed, None, *at)])
            }

            OrderCommand::Ship { tracking_number, at } => {
                match self.status {
                    OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing => {}
                    _ => return Err(self.invalid(OrderStatus::Shipped)),
                }

                Ok(vec![self.status_changed(OrderStatus::Shipped, tracking_number.clone(), *at)])
            }

            OrderCommand::Deliver { at } => {
                if self.status == OrderStatus::Delivered {
                    return Err(self.invalid(OrderStatus::Delivered));
                }

                Ok(vec![self.status_changed(OrderStatus::Delivered, None, *at)])
            }

            OrderCommand::Cancel { requested_by, at } => {
                if *requested_by != self.user_id {
                    return Err(OrderError::Unauthorized);
                }
                if !self.status.is_cancellable() {
                    return Err(self.invalid(OrderStatus::Cancelled));
                }

                Ok(vec![OrderEvent::Cancelled(OrderCancelled {
                    from: self.status,
                    cancelled_by: *requested_by,
                    releases_stock: !self.stock_released,
                    cancelled_at: *at,
                })])
            }

            OrderCommand::OverrideStatus { status, tracking_number, admin_notes, at } => Ok(vec![
                self.status_changed(*status, tracking_number.clone(), *at),
                OrderEvent::AdminNotesUpdated(AdminNotesUpdated {
                    admin_notes: admin_notes.clone(),
                    updated_at: *at,
                }),
            ]),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id.0
    }

    fn version(&self) -> i64 {
        self.version
    }
}
