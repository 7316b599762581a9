//! Delivery ledger: per-attempt delivery state, webhook normalization,
//! and reconciliation of asynchronous provider callbacks.
//!
//! The ledger records one row per outbound attempt and folds provider
//! webhooks into it as monotonic state joins. Provider callbacks arrive
//! late, duplicated, and out of order; [`state::apply_event`] is a pure
//! transition function that absorbs all three without ever moving a
//! record backwards, and [`service::LedgerService`] serializes
//! concurrent events for the same attempt behind a per-key lock.

pub mod error;
pub mod normalize;
pub mod providers;
pub mod service;
pub mod state;

pub use error::LedgerError;
pub use normalize::{NormalizeError, WebhookNormalizer};
pub use service::{ApplyOutcome, AttemptStore, LedgerService};
pub use state::{DeliveryRecord, Transition};
