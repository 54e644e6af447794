use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::inventory::{self, InventoryError, Product, ProductId};
use crate::domain::pricing::{PriceLine, PricingCalculator};
use crate::events::{envelopes_for, Aggregate, EventEnvelope};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError, StoreTransaction};
use crate::utils::{retry_on_transient, IsTransient, RetryConfig, RetryResult};

use super::aggregate::{is_valid_unit_price, Order};
use super::commands::{CreateOrder, OrderCommand};
use super::errors::OrderError;
use super::events::OrderEvent;
use super::order_number::{OrderNumberGenerator, RandomOrderNumbers};
use super::value_objects::{Actor, CreateOrderRequest, OrderId, OrderLine, UpdateStatusRequest};

// ============================================================================
// Order Lifecycle Service
// ============================================================================
//
// Orchestrates: Store Tx → Inventory Ledger / Pricing → Aggregate → Outbox
//
// Every write is one store transaction. A rejected command or a store error
// before commit leaves nothing behind; transient store errors re-run the
// whole unit of work in a fresh transaction.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub currency: String,
    /// Order number candidates tried per transaction
    pub order_number_attempts: u32,
    pub retry: RetryConfig,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            currency: "KSH".to_string(),
            order_number_attempts: 5,
            retry: RetryConfig::default(),
        }
    }
}

pub struct OrderLifecycleService {
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    order_numbers: Arc<dyn OrderNumberGenerator>,
    pricing: PricingCalculator,
    settings: LifecycleSettings,
    metrics: Option<Arc<Metrics>>,
}

/// Why one attempt at a unit of work failed
#[derive(Debug)]
enum Failure {
    Rejected(OrderError),
    Store(StoreError),
}

impl From<OrderError> for Failure {
    fn from(err: OrderError) -> Self {
        Failure::Rejected(err)
    }
}

impl From<InventoryError> for Failure {
    fn from(err: InventoryError) -> Self {
        Failure::Rejected(err.into())
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        Failure::Store(err)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Rejected(e) => write!(f, "rejected: {e}"),
            Failure::Store(e) => write!(f, "store: {e}"),
        }
    }
}

impl IsTransient for Failure {
    fn is_transient(&self) -> bool {
        match self {
            Failure::Rejected(_) => false,
            Failure::Store(e) => e.is_transient(),
        }
    }
}

/// Result of a committed unit of work
struct Committed {
    order: Order,
    units_reserved: u64,
    units_released: u64,
}

impl Committed {
    fn order(order: Order) -> Self {
        Self { order, units_reserved: 0, units_released: 0 }
    }
}

impl OrderLifecycleService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
        pricing: PricingCalculator,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            clock,
            order_numbers: Arc::new(RandomOrderNumbers),
            pricing,
            settings,
            metrics: None,
        }
    }

    pub fn with_order_numbers(mut self, order_numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        self.order_numbers = order_numbers;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Reserve stock, price and persist a new pending order
    pub async fn create_order(&self, actor: Actor, request: CreateOrderRequest) -> Result<Order, OrderError> {
        if request.lines.is_empty() {
            return Err(self.reject("create_order", OrderError::EmptyItems));
        }
        if let Some(line) = request.lines.iter().find(|line| line.quantity <= 0) {
            return Err(self.reject("create_order", OrderError::InvalidQuantity(line.quantity)));
        }
        if let Some(line) = request.lines.iter().find(|line| !is_valid_unit_price(line.unit_price)) {
            return Err(self.reject("create_order", OrderError::InvalidPrice(line.unit_price)));
        }

        let work = PlaceOrder { actor, request: &request, correlation_id: Uuid::new_v4() };
        let committed = self.run("create_order", work).await?;

        let order = &committed.order;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            user_id = %order.user_id,
            total = %order.totals.total_amount,
            items = order.total_items(),
            "🛒 Order placed"
        );

        if let Some(metrics) = &self.metrics {
            metrics.orders_created.inc();
            metrics.stock_units_reserved.inc_by(committed.units_reserved);
        }
        Ok(committed.order)
    }

    /// Customer cancellation. Puts every line's stock back.
    pub async fn cancel_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, OrderError> {
        let work = CancelOrder { actor, order_id, correlation_id: Uuid::new_v4() };
        let committed = self.run("cancel_order", work).await?;

        tracing::info!(
            order_id = %order_id,
            user_id = %actor.user_id,
            units_released = committed.units_released,
            "❌ Order cancelled"
        );

        if let Some(metrics) = &self.metrics {
            metrics.orders_cancelled.inc();
            metrics.stock_units_released.inc_by(committed.units_released);
        }
        Ok(committed.order)
    }

    /// Admin override to any status. Stock is never touched.
    pub async fn update_order_status(
        &self,
        actor: Actor,
        order_id: OrderId,
        request: UpdateStatusRequest,
    ) -> Result<Order, OrderError> {
        let command = |at| OrderCommand::OverrideStatus {
            status: request.status,
            tracking_number: request.tracking_number.clone(),
            admin_notes: request.admin_notes.clone(),
            at,
        };
        self.admin_transition("update_order_status", actor, order_id, command).await
    }

    pub async fn confirm_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, OrderError> {
        self.admin_transition("confirm_order", actor, order_id, |at| OrderCommand::Confirm { at })
            .await
    }

    pub async fn ship_order(
        &self,
        actor: Actor,
        order_id: OrderId,
        tracking_number: Option<String>,
    ) -> Result<Order, OrderError> {
        let command = |at| OrderCommand::Ship { tracking_number: tracking_number.clone(), at };
        self.admin_transition("ship_order", actor, order_id, command).await
    }

    pub async fn deliver_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, OrderError> {
        self.admin_transition("deliver_order", actor, order_id, |at| OrderCommand::Deliver { at })
            .await
    }

    /// Read an order as its owner or as an admin
    pub async fn get_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, OrderError> {
        let order = match self.store.load_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return Err(self.reject("get_order", OrderError::OrderNotFound(order_id))),
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to load order");
                self.record_failure("get_order", "persistence");
                return Err(OrderError::PersistenceFailure);
            }
        };

        if !actor.is_admin && !actor.owns(order.user_id) {
            return Err(self.reject("get_order", OrderError::Unauthorized));
        }
        Ok(order)
    }

    // ========================================================================
    // Transaction Bodies
    // ========================================================================

    async fn place_order(
        &self,
        tx: &mut dyn StoreTransaction,
        actor: Actor,
        request: &CreateOrderRequest,
        correlation_id: Uuid,
    ) -> Result<Committed, Failure> {
        let now = self.clock.now();

        let ids: Vec<ProductId> = request
            .lines
            .iter()
            .map(|line| line.product_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut products = by_id(tx.lock_products(&ids).await?);

        if let Some(missing) = request.lines.iter().find(|line| !products.contains_key(&line.product_id)) {
            return Err(OrderError::ProductNotFound(missing.product_id).into());
        }

        // Reserve in caller order; the same product on several lines is cumulative.
        let mut touched = BTreeSet::new();
        let mut units_reserved = 0u64;
        let mut drafts = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = products
                .get_mut(&line.product_id)
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            let movement = inventory::reserve(product, line.quantity)?;
            if movement.applied {
                touched.insert(product.id);
                units_reserved += line.quantity as u64;
            }
            drafts.push((product.clone(), PriceLine { unit_price: line.unit_price, quantity: line.quantity }));
        }

        let priced = self.pricing.price(drafts.iter().map(|(_, price_line)| price_line));

        let lines: Vec<OrderLine> = drafts
            .iter()
            .zip(&priced.line_totals)
            .map(|((product, price_line), total)| OrderLine {
                id: Uuid::new_v4(),
                product_id: product.id,
                product_name: product.name.clone(),
                product_sku: product.sku.clone(),
                product_details: product.snapshot(),
                quantity: price_line.quantity,
                price: price_line.unit_price,
                total: *total,
            })
            .collect();

        let order_number = self.free_order_number(tx, now).await?;

        for id in &touched {
            if let Some(product) = products.get(id) {
                tx.save_product_stock(product).await?;
            }
        }

        let (order, events) = Order::create(&CreateOrder {
            order_id: OrderId::generate(),
            order_number,
            user_id: actor.user_id,
            lines,
            totals: priced.totals,
            currency: self.settings.currency.clone(),
            payment_method: request.payment_method.clone(),
            billing_address: request.billing_address.clone(),
            shipping_address: request.shipping_address.clone(),
            notes: request.notes.clone(),
            at: now,
        })?;

        tx.insert_order(&order).await?;
        tx.append_events(&self.envelopes(&order, events, correlation_id, actor, now)).await?;

        Ok(Committed { order, units_reserved, units_released: 0 })
    }

    async fn cancel(
        &self,
        tx: &mut dyn StoreTransaction,
        actor: Actor,
        order_id: OrderId,
        correlation_id: Uuid,
    ) -> Result<Committed, Failure> {
        let now = self.clock.now();
        let mut order = tx.lock_order(order_id).await?.ok_or(OrderError::OrderNotFound(order_id))?;
        let expected_version = order.version;

        let events = order.execute(&OrderCommand::Cancel { requested_by: actor.user_id, at: now })?;
        let units_released = if releases_stock(&events) {
            self.release_lines(tx, &order).await?
        } else {
            tracing::warn!(order_id = %order_id, "Order stock already returned, cancelling without release");
            0
        };

        tx.update_order(&order, expected_version).await?;
        tx.append_events(&self.envelopes(&order, events, correlation_id, actor, now)).await?;

        Ok(Committed { order, units_reserved: 0, units_released })
    }

    /// Put every line's quantity back, returning the units released
    async fn release_lines(&self, tx: &mut dyn StoreTransaction, order: &Order) -> Result<u64, Failure> {
        let ids: Vec<ProductId> = order
            .lines
            .iter()
            .map(|line| line.product_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut products = by_id(tx.lock_products(&ids).await?);

        let mut touched = BTreeSet::new();
        let mut units_released = 0u64;
        for line in &order.lines {
            let product = products
                .get_mut(&line.product_id)
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            if inventory::release(product, line.quantity)?.applied {
                touched.insert(product.id);
                units_released += line.quantity as u64;
            }
        }

        for id in &touched {
            if let Some(product) = products.get(id) {
                tx.save_product_stock(product).await?;
            }
        }

        Ok(units_released)
    }

    async fn transition<C>(
        &self,
        tx: &mut dyn StoreTransaction,
        actor: Actor,
        order_id: OrderId,
        command: &C,
        correlation_id: Uuid,
    ) -> Result<Committed, Failure>
    where
        C: Fn(DateTime<Utc>) -> OrderCommand + Sync,
    {
        let now = self.clock.now();
        let mut order = tx.lock_order(order_id).await?.ok_or(OrderError::OrderNotFound(order_id))?;
        let expected_version = order.version;

        let events = order.execute(&command(now))?;

        tx.update_order(&order, expected_version).await?;
        tx.append_events(&self.envelopes(&order, events, correlation_id, actor, now)).await?;

        Ok(Committed::order(order))
    }

    async fn admin_transition<C>(
        &self,
        operation: &'static str,
        actor: Actor,
        order_id: OrderId,
        command: C,
    ) -> Result<Order, OrderError>
    where
        C: Fn(DateTime<Utc>) -> OrderCommand + Send + Sync,
    {
        if !actor.is_admin {
            return Err(self.reject(operation, OrderError::Unauthorized));
        }

        let work = Transition { actor, order_id, command, correlation_id: Uuid::new_v4() };
        let committed = self.run(operation, work).await?;

        let order = committed.order;
        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            admin_id = %actor.user_id,
            operation = operation,
            "📦 Order status updated"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_status_update(order.status.as_str());
        }
        Ok(order)
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Run `work` in a fresh transaction, retrying transient store failures.
    async fn run<U: UnitOfWork>(&self, operation: &'static str, work: U) -> Result<Committed, OrderError> {
        let started = Instant::now();
        let last_attempt = AtomicU32::new(0);
        let (work, last_attempt_ref) = (&work, &last_attempt);

        let outcome = retry_on_transient(self.settings.retry.clone(), move |attempt| {
            last_attempt_ref.store(attempt, Ordering::Relaxed);
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt(operation, attempt);
                }
            }
            self.attempt(work)
        })
        .await;

        let retried = last_attempt.load(Ordering::Relaxed) > 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_duration(operation, started.elapsed().as_secs_f64());
        }

        match outcome {
            RetryResult::Success(committed) => {
                if retried {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry_outcome(operation, true);
                    }
                }
                Ok(committed)
            }
            RetryResult::PermanentFailure(Failure::Rejected(err)) | RetryResult::Failed(Failure::Rejected(err)) => {
                Err(self.reject(operation, err))
            }
            RetryResult::PermanentFailure(Failure::Store(err)) | RetryResult::Failed(Failure::Store(err)) => {
                if retried {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry_outcome(operation, false);
                    }
                }
                tracing::error!(operation = operation, error = %err, "Order operation failed in the store");
                self.record_failure(operation, "persistence");
                Err(OrderError::PersistenceFailure)
            }
        }
    }

    /// One attempt: begin, apply, then commit or roll back
    async fn attempt<U: UnitOfWork>(&self, work: &U) -> Result<Committed, Failure> {
        let mut tx = self.store.begin().await?;

        match work.apply(self, tx.as_mut()).await {
            Ok(committed) => {
                tx.commit().await?;
                Ok(committed)
            }
            Err(failure) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "Rollback failed, connection will be discarded");
                }
                Err(failure)
            }
        }
    }

    async fn free_order_number(
        &self,
        tx: &mut dyn StoreTransaction,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let attempts = self.settings.order_number_attempts.max(1);
        for attempt in 1..=attempts {
            let candidate = self.order_numbers.generate(now);
            if !tx.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(order_number = %candidate, attempt = attempt, "Order number taken, regenerating");
        }
        Err(StoreError::OrderNumberExhausted(attempts))
    }

    fn envelopes(
        &self,
        order: &Order,
        events: Vec<OrderEvent>,
        correlation_id: Uuid,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Vec<EventEnvelope<OrderEvent>> {
        // Later events of one command are caused by the one before
        let mut previous: Option<Uuid> = None;
        envelopes_for(order.aggregate_id(), order.version(), events, correlation_id, now)
            .into_iter()
            .map(|envelope| {
                let mut envelope = envelope
                    .with_user(actor.user_id.0)
                    .with_metadata("order_number", order.order_number.as_str());
                if let Some(cause) = previous {
                    envelope = envelope.with_causation(cause);
                }
                previous = Some(envelope.event_id);
                envelope
            })
            .collect()
    }

    fn reject(&self, operation: &'static str, err: OrderError) -> OrderError {
        tracing::warn!(operation = operation, error = %err, "Order operation rejected");
        self.record_failure(operation, failure_reason(&err));
        err
    }

    fn record_failure(&self, operation: &str, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_failure(operation, reason);
        }
    }
}

// ============================================================================
// Units of Work
// ============================================================================

#[async_trait]
trait UnitOfWork: Send + Sync {
    async fn apply(
        &self,
        service: &OrderLifecycleService,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Committed, Failure>;
}

struct PlaceOrder<'r> {
    actor: Actor,
    request: &'r CreateOrderRequest,
    correlation_id: Uuid,
}

#[async_trait]
impl<'r> UnitOfWork for PlaceOrder<'r> {
    async fn apply(
        &self,
        service: &OrderLifecycleService,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Committed, Failure> {
        service.place_order(tx, self.actor, self.request, self.correlation_id).await
    }
}

struct CancelOrder {
    actor: Actor,
    order_id: OrderId,
    correlation_id: Uuid,
}

#[async_trait]
impl UnitOfWork for CancelOrder {
    async fn apply(
        &self,
        service: &OrderLifecycleService,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Committed, Failure> {
        service.cancel(tx, self.actor, self.order_id, self.correlation_id).await
    }
}

struct Transition<C> {
    actor: Actor,
    order_id: OrderId,
    command: C,
    correlation_id: Uuid,
}

#[async_trait]
impl<C> UnitOfWork for Transition<C>
where
    C: Fn(DateTime<Utc>) -> OrderCommand + Send + Sync,
{
    async fn apply(
        &self,
        service: &OrderLifecycleService,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Committed, Failure> {
        service
            .transition(tx, self.actor, self.order_id, &self.command, self.correlation_id)
            .await
    }
}

fn by_id(products: Vec<Product>) -> BTreeMap<ProductId, Product> {
    products.into_iter().map(|product| (product.id, product)).collect()
}

fn releases_stock(events: &[OrderEvent]) -> bool {
    events.iter().any(|event| matches!(event, OrderEvent::Cancelled(e) if e.releases_stock))
}

fn failure_reason(err: &OrderError) -> &'static str {
    match err {
        OrderError::ProductNotFound(_) => "product_not_found",
        OrderError::InsufficientStock { .. } => "insufficient_stock",
        OrderError::Unauthorized => "unauthorized",
        OrderError::InvalidTransition { .. } => "invalid_transition",
        OrderError::OrderNotFound(_) => "order_not_found",
        OrderError::EmptyItems | OrderError::InvalidQuantity(_) | OrderError::InvalidPrice(_) => {
            "invalid_request"
        }
        OrderError::PersistenceFailure => "persistence",
        OrderError::NotInitialized => "not_initialized",
    }
}
