use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{OrderStore, StoreError, StoreTransaction};
use crate::domain::inventory::{Product, ProductId};
use crate::domain::order::{Order, OrderEvent, OrderId};
use crate::events::EventEnvelope;

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Transactions hold the state mutex from begin to commit/rollback and work
// on a private copy, so they are fully serialized: a coarser version of the
// row locks PgStore takes, with the same all-or-nothing visibility.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    outbox: Vec<EventEnvelope<OrderEvent>>,
}

#[derive(Debug, Default)]
struct Faults {
    transient_lock_failures: AtomicU32,
    fail_next_commit: AtomicBool,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.state.lock().await.products.get(&id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn outbox(&self) -> Vec<EventEnvelope<OrderEvent>> {
        self.state.lock().await.outbox.clone()
    }

    /// The next `count` lock_products / lock_order calls fail with a timeout
    pub fn inject_transient_failures(&self, count: u32) {
        self.faults.transient_lock_failures.store(count, Ordering::SeqCst);
    }

    /// The next commit fails after the work was done
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

impl MemoryTransaction {
    fn take_injected_failure(&self) -> Result<(), StoreError> {
        let remaining = &self.faults.transient_lock_failures;
        let took = remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        self.take_injected_failure()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.working.products.get(id).cloned())
            .collect())
    }

    async fn save_product_stock(&mut self, product: &Product) -> Result<(), StoreError> {
        let stored = self
            .working
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown product {}", product.id)))?;

        stored.stock_quantity = product.stock_quantity;
        stored.sales_count = product.sales_count;
        stored.in_stock = product.in_stock;
        Ok(())
    }

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool, StoreError> {
        Ok(self
            .working
            .orders
            .values()
            .any(|order| order.order_number == order_number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.order_number_exists(&order.order_number).await? {
            return Err(StoreError::Conflict(format!("order number {} taken", order.order_number)));
        }
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} exists", order.id)));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.take_injected_failure()?;
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn update_order(&mut self, order: &Order, expected_version: i64) -> Result<(), StoreError> {
        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown order {}", order.id)))?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "order {} at version {}, expected {}",
                order.id, stored.version, expected_version
            )));
        }
        *stored = order.clone();
        Ok(())
    }

    async fn append_events(&mut self, events: &[EventEnvelope<OrderEvent>]) -> Result<(), StoreError> {
        self.working.outbox.extend_from_slice(events);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitFailed("injected commit failure".to_string()));
        }
        let MemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
