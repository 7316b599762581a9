use seawarn_common::types::Channel;

/// Errors that can occur when dispatching an outbound message.
///
/// The escalation engine does not retry within a step; a transient
/// failure is recorded on the ledger entry and escalation advancement is
/// the retry mechanism.
///
/// # Examples
///
/// ```rust
/// use seawarn_dispatch::DispatchError;
/// use seawarn_common::types::Channel;
///
/// let err = DispatchError::ProviderUnconfigured(Channel::Voice);
/// assert!(err.to_string().contains("voice"));
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Provider timeout, 5xx, 429, or transport failure. Retryable in
    /// principle; in practice the next escalation step is the retry.
    #[error("Dispatch: transient provider error: {0}")]
    TransientProvider(String),

    /// The recipient address was permanently rejected by the provider.
    #[error("Dispatch: invalid address '{0}'")]
    InvalidAddress(String),

    /// No provider is configured for the requested channel.
    #[error("Dispatch: no provider configured for channel '{0}'")]
    ProviderUnconfigured(Channel),

    /// Channel configuration is missing a required field or contains an
    /// invalid value.
    #[error("Dispatch: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The provider accepted the request but returned a response the
    /// dispatcher could not extract a message ID from.
    #[error("Dispatch: malformed provider response: {0}")]
    MalformedResponse(String),
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DispatchError::TransientProvider(_))
    }
}

/// Convenience `Result` alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
