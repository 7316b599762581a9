pub mod alert;
pub mod contact;
pub mod delivery_attempt;
pub mod escalation_policy;
pub mod escalation_step;
