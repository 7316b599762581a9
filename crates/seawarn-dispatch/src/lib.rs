//! Outbound channel dispatchers with pluggable provider support.
//!
//! A [`ChannelDispatcher`] performs exactly one outbound message attempt
//! against a provider (SMS/voice gateway, WhatsApp API, SMTP) and returns
//! the provider-assigned message identifier. Dispatchers never touch the
//! delivery ledger; recording the attempt is the caller's responsibility,
//! which keeps the dispatcher side-effect-free beyond the network call.

pub mod channels;
pub mod error;
pub mod plugin;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use seawarn_common::types::{Channel, MessageContent};
use std::collections::HashMap;
use std::sync::Arc;

pub use error::DispatchError;

/// Receipt returned by a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// Opaque provider-assigned message identifier. This is the only
    /// correlation key for asynchronous delivery webhooks, so it must be
    /// unique within the channel's ID namespace.
    pub provider_message_id: String,
}

/// A single outbound notification channel (SMS gateway, WhatsApp API,
/// SMTP, ...).
///
/// Implementations are created by the corresponding
/// [`plugin::DispatcherPlugin`] from JSON configuration. Callers bound
/// each `dispatch` with `tokio::time::timeout` and treat an elapsed
/// timeout as [`DispatchError::TransientProvider`]; the dispatcher itself
/// does not retry.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    /// Performs exactly one outbound attempt to `address`.
    ///
    /// # Errors
    ///
    /// `TransientProvider` for 5xx/429/transport failures (the caller may
    /// reach the recipient via a later escalation step), `InvalidAddress`
    /// for permanent 4xx rejections of the recipient address.
    async fn dispatch(
        &self,
        address: &str,
        content: &MessageContent,
    ) -> Result<DispatchReceipt, DispatchError>;

    /// The channel this dispatcher serves.
    fn channel(&self) -> Channel;
}

/// The set of configured dispatchers, keyed by channel.
///
/// A channel with no configured provider is simply absent; callers map
/// that to [`DispatchError::ProviderUnconfigured`].
#[derive(Clone, Default)]
pub struct DispatcherSet {
    dispatchers: HashMap<Channel, Arc<dyn ChannelDispatcher>>,
}

impl DispatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dispatcher: Arc<dyn ChannelDispatcher>) {
        self.dispatchers.insert(dispatcher.channel(), dispatcher);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelDispatcher>> {
        self.dispatchers.get(&channel).cloned()
    }

    pub fn configured_channels(&self) -> Vec<Channel> {
        self.dispatchers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}
