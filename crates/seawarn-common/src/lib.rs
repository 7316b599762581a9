//! Shared domain types for the seawarn alert escalation system.

pub mod id;
pub mod types;
