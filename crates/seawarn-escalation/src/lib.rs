//! Escalation policy engine.
//!
//! Drives an alert through its policy's ordered steps: resolve the
//! contacts for the current step, dispatch to them concurrently, arm a
//! timeout, and either stop on acknowledgement or advance until the
//! policy is exhausted. Timers are armed independently of dispatch
//! outcomes, so a step whose every dispatch fails still advances on
//! schedule.

pub mod engine;
pub mod error;
pub mod plan;
pub mod policy;

pub use engine::EscalationEngine;
pub use error::EscalationError;
pub use plan::{EscalationPlan, PlannedDispatch, SkippedContact, StepPlan};
