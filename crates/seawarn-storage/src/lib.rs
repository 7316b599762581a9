//! Persistence layer for alerts, contacts, escalation policies, and the
//! delivery ledger.
//!
//! A single [`store::Store`] owns the SeaORM connection to the SQLite
//! database (WAL mode) and exposes one async method set per table, with
//! plain `Row` structs at the boundary so callers never touch entity
//! models.

pub mod entities;
pub mod store;


pub use store::{
    AlertFilter, AlertRow, AttemptFilter, ContactRow, PolicyRow, StepRow, Store,
};
