use crate::error::LedgerError;
use crate::state::{self, DeliveryRecord, Transition};
use async_trait::async_trait;
use seawarn_common::types::{CanonicalEvent, Channel};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing;

/// Persistence interface the ledger needs from the storage layer.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Looks up the attempt a webhook event refers to. Provider message
    /// IDs are opaque and may collide across providers, so the lookup
    /// is scoped by channel.
    async fn load_by_provider_id(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Option<DeliveryRecord>, LedgerError>;

    /// Persists an updated attempt record.
    async fn save(&self, record: &DeliveryRecord) -> Result<(), LedgerError>;
}

/// Result of reconciling one webhook event against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The attempt's status advanced.
    Applied,
    /// Status unchanged; the record gained a timestamp or metadata.
    Metadata,
    /// Duplicate, stale, or post-terminal event; nothing changed.
    Duplicate,
    /// No attempt matches the provider message ID; event dropped.
    Discarded,
}

/// Applies normalized delivery events to stored attempt records.
///
/// Events for the same attempt are serialized behind a per-key async
/// lock, so two concurrent webhook deliveries for one message cannot
/// interleave their read-modify-write cycles. Events for different
/// attempts proceed in parallel.
pub struct LedgerService<S> {
    store: Arc<S>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: AttemptStore> LedgerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map only ever holds keys for in-flight webhooks plus a
        // bounded residue; entries are cheap and reused on redelivery.
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Reconciles one canonical event against the ledger.
    ///
    /// Unknown provider message IDs are discarded with a warning rather
    /// than erroring: providers redeliver webhooks for attempts that
    /// may have been pruned, and a webhook endpoint must stay cheap to
    /// satisfy.
    pub async fn apply(
        &self,
        channel: Channel,
        event: &CanonicalEvent,
    ) -> Result<ApplyOutcome, LedgerError> {
        let key = format!("{channel}:{}", event.provider_message_id);
        let entry_lock = self.lock_for(&key);
        let _guard = entry_lock.lock().await;

        let Some(mut record) = self
            .store
            .load_by_provider_id(channel, &event.provider_message_id)
            .await?
        else {
            tracing::warn!(
                channel = %channel,
                provider_message_id = %event.provider_message_id,
                kind = %event.kind,
                "Delivery event for unknown attempt discarded"
            );
            return Ok(ApplyOutcome::Discarded);
        };

        match state::apply_event(&mut record, event) {
            Transition::Advanced { from, to } => {
                self.store.save(&record).await?;
                tracing::info!(
                    attempt_id = %record.id,
                    alert_id = %record.alert_id,
                    channel = %channel,
                    from = %from,
                    to = %to,
                    "Delivery attempt advanced"
                );
                Ok(ApplyOutcome::Applied)
            }
            Transition::MetadataOnly => {
                self.store.save(&record).await?;
                Ok(ApplyOutcome::Metadata)
            }
            Transition::NoOp => Ok(ApplyOutcome::Duplicate),
            Transition::Frozen => {
                tracing::debug!(
                    attempt_id = %record.id,
                    channel = %channel,
                    kind = %event.kind,
                    "Event for terminal attempt discarded"
                );
                Ok(ApplyOutcome::Duplicate)
            }
        }
    }
}
