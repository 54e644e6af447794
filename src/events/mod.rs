// ============================================================================
// Aggregate & Event Infrastructure
// ============================================================================
//
// Generic, reusable pieces shared by every aggregate:
// - the Aggregate trait (command -> events -> apply)
// - the outbox EventEnvelope and DomainEvent trait
//
// Domain-specific code lives in src/domain/
//
// ============================================================================

pub mod aggregate;
pub mod event;

pub use aggregate::Aggregate;
pub use event::{DomainEvent, EventEnvelope, envelopes_for};
