// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::{render, start_metrics_server};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order lifecycle outcomes (created, cancelled, status changes, failures)
// - Stock units moved by the inventory ledger
// - Operation latency
// - Retry attempts and outcomes
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the order service
pub struct Metrics {
    registry: Registry,

    // Order Lifecycle Metrics
    pub orders_created: IntCounter,
    pub orders_cancelled: IntCounter,
    pub status_updates: IntCounterVec,
    pub order_failures: IntCounterVec,
    pub operation_duration: HistogramVec,

    // Inventory Metrics
    pub stock_units_reserved: IntCounter,
    pub stock_units_released: IntCounter,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Lifecycle Metrics
        let orders_created = IntCounter::new("orders_created_total", "Total orders placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_cancelled = IntCounter::new("orders_cancelled_total", "Total orders cancelled by customers")?;
        registry.register(Box::new(orders_cancelled.clone()))?;

        let status_updates = IntCounterVec::new(
            Opts::new("order_status_updates_total", "Order status changes by target status"),
            &["status"],
        )?;
        registry.register(Box::new(status_updates.clone()))?;

        let order_failures = IntCounterVec::new(
            Opts::new("order_failures_total", "Rejected or failed order operations"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(order_failures.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        // Inventory Metrics
        let stock_units_reserved = IntCounter::new("stock_units_reserved_total", "Units taken out of managed stock")?;
        registry.register(Box::new(stock_units_reserved.clone()))?;

        let stock_units_released = IntCounter::new("stock_units_released_total", "Units returned to managed stock")?;
        registry.register(Box::new(stock_units_released.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Operations that succeeded after at least one retry"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Total failed retries after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_cancelled,
            status_updates,
            order_failures,
            operation_duration,
            stock_units_reserved,
            stock_units_released,
            retry_attempts_total,
            retry_success,
            retry_failure,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_duration(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_failure(&self, operation: &str, reason: &str) {
        self.order_failures.with_label_values(&[operation, reason]).inc();
    }

    pub fn record_status_update(&self, status: &str) {
        self.status_updates.with_label_values(&[status]).inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    /// Helper to record retry outcome
    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Option<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .and_then(|m| m.metric[0].counter.value)
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_order_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();
        metrics.orders_created.inc();
        metrics.stock_units_reserved.inc_by(5);

        assert_eq!(counter_value(&metrics, "orders_created_total"), Some(2.0));
        assert_eq!(counter_value(&metrics, "stock_units_reserved_total"), Some(5.0));
    }

    #[test]
    fn test_failures_labelled_by_operation_and_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_failure("create_order", "insufficient_stock");
        metrics.record_failure("cancel_order", "unauthorized");
        metrics.record_failure("cancel_order", "unauthorized");

        let gathered = metrics.registry.gather();
        let failures = gathered.iter().find(|m| m.name() == "order_failures_total").unwrap();
        assert_eq!(failures.metric.len(), 2);
    }

    #[test]
    fn test_record_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("create_order", 2);
        metrics.record_retry_attempt("create_order", 3);
        metrics.record_retry_outcome("create_order", true);

        let gathered = metrics.registry.gather();
        let attempts = gathered.iter().find(|m| m.name() == "retry_attempts_total").unwrap();
        assert_eq!(attempts.metric.len(), 2); // Two different attempt labels
        assert_eq!(counter_value(&metrics, "retry_success_total"), Some(1.0));
    }
}
