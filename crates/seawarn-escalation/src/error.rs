/// Errors surfaced by the escalation engine.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// No alert with the given ID exists.
    #[error("Escalation: alert not found: {0}")]
    AlertNotFound(String),

    /// A policy could not be used: zero steps, sparse step indexes, or
    /// an invalid step definition.
    #[error("Escalation: policy resolution failed: {0}")]
    PolicyResolution(String),

    /// The alert is in a state the requested operation does not apply
    /// to.
    #[error("Escalation: invalid alert state: {0}")]
    InvalidState(String),

    /// Underlying storage failed.
    #[error("Escalation: storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EscalationError>;
