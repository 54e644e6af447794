// ============================================================================
// Storefront Orders - order lifecycle and inventory reservation
// ============================================================================
//
// Layering:
//   domain   → inventory ledger, pricing, order aggregate + lifecycle service
//   events   → Aggregate trait and outbox envelopes
//   store    → persistence port with Postgres and in-memory adapters
//   metrics  → Prometheus registry and the /metrics endpoint
//   utils    → retry with backoff
//
// ============================================================================

pub mod clock;
pub mod config;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod store;
pub mod utils;
