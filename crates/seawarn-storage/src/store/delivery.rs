use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use seawarn_common::types::{Channel, DeliveryStatus};
use seawarn_ledger::state::{self, DeliveryRecord};
use seawarn_ledger::{AttemptStore, LedgerError};

use crate::entities::delivery_attempt::{self, Column as AttCol, Entity as AttEntity};
use crate::store::Store;

/// Delivery attempt list filter (operator ledger view).
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub alert_id: Option<String>,
    pub channel_eq: Option<Channel>,
    pub status_eq: Option<DeliveryStatus>,
    pub contact_id: Option<String>,
}

fn model_to_record(m: delivery_attempt::Model) -> Result<DeliveryRecord> {
    Ok(DeliveryRecord {
        id: m.id,
        alert_id: m.alert_id,
        step_index: m.step_index,
        contact_id: m.contact_id,
        channel: m.channel.parse().map_err(anyhow::Error::msg)?,
        address: m.address,
        provider_message_id: m.provider_message_id,
        status: m.status.parse().map_err(anyhow::Error::msg)?,
        queued_at: m.queued_at.with_timezone(&Utc),
        sent_at: m.sent_at.map(|t| t.with_timezone(&Utc)),
        delivered_at: m.delivered_at.map(|t| t.with_timezone(&Utc)),
        read_at: m.read_at.map(|t| t.with_timezone(&Utc)),
        acknowledged_at: m.acknowledged_at.map(|t| t.with_timezone(&Utc)),
        closed_at: m.closed_at.map(|t| t.with_timezone(&Utc)),
        error_code: m.error_code,
        error_message: m.error_message,
        metadata: m
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
    })
}

fn record_to_active(record: &DeliveryRecord) -> Result<delivery_attempt::ActiveModel> {
    Ok(delivery_attempt::ActiveModel {
        id: Set(record.id.clone()),
        alert_id: Set(record.alert_id.clone()),
        step_index: Set(record.step_index),
        contact_id: Set(record.contact_id.clone()),
        channel: Set(record.channel.to_string()),
        address: Set(record.address.clone()),
        provider_message_id: Set(record.provider_message_id.clone()),
        status: Set(record.status.to_string()),
        queued_at: Set(record.queued_at.fixed_offset()),
        sent_at: Set(record.sent_at.map(|t| t.fixed_offset())),
        delivered_at: Set(record.delivered_at.map(|t| t.fixed_offset())),
        read_at: Set(record.read_at.map(|t| t.fixed_offset())),
        acknowledged_at: Set(record.acknowledged_at.map(|t| t.fixed_offset())),
        closed_at: Set(record.closed_at.map(|t| t.fixed_offset())),
        error_code: Set(record.error_code.clone()),
        error_message: Set(record.error_message.clone()),
        metadata: Set(record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?),
        updated_at: Set(Utc::now().fixed_offset()),
    })
}

impl Store {
    pub async fn insert_attempt(&self, record: &DeliveryRecord) -> Result<()> {
        record_to_active(record)?.insert(self.db()).await?;
        Ok(())
    }

    pub async fn save_attempt(&self, record: &DeliveryRecord) -> Result<()> {
        record_to_active(record)?.update(self.db()).await?;
        Ok(())
    }

    pub async fn get_attempt_by_id(&self, id: &str) -> Result<Option<DeliveryRecord>> {
        let model = AttEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_record).transpose()
    }

    /// Webhook correlation lookup, scoped by channel because provider
    /// ID spaces are opaque and may collide across providers.
    pub async fn get_attempt_by_provider_id(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Option<DeliveryRecord>> {
        let model = AttEntity::find()
            .filter(AttCol::Channel.eq(channel.to_string()))
            .filter(AttCol::ProviderMessageId.eq(provider_message_id))
            .one(self.db())
            .await?;
        model.map(model_to_record).transpose()
    }

    pub async fn list_attempts_for_alert(&self, alert_id: &str) -> Result<Vec<DeliveryRecord>> {
        let rows = AttEntity::find()
            .filter(AttCol::AlertId.eq(alert_id))
            .order_by(AttCol::StepIndex, Order::Asc)
            .order_by(AttCol::QueuedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_record).collect()
    }

    pub async fn list_attempts(
        &self,
        filter: &AttemptFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeliveryRecord>> {
        let rows = attempt_query(filter)
            .order_by(AttCol::QueuedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_record).collect()
    }

    pub async fn count_attempts(&self, filter: &AttemptFilter) -> Result<u64> {
        Ok(attempt_query(filter).count(self.db()).await?)
    }

    /// Closes every non-terminal attempt of an alert as acknowledged.
    /// Returns how many rows changed.
    pub async fn close_open_attempts(&self, alert_id: &str, at: DateTime<Utc>) -> Result<u64> {
        let open = self.list_attempts_for_alert(alert_id).await?;
        let mut closed = 0u64;
        for mut record in open {
            if record.status.is_terminal() {
                continue;
            }
            state::acknowledge(&mut record, at);
            self.save_attempt(&record).await?;
            closed += 1;
        }
        Ok(closed)
    }
}

fn attempt_query(filter: &AttemptFilter) -> sea_orm::Select<AttEntity> {
    let mut q = AttEntity::find();
    if let Some(ref alert_id) = filter.alert_id {
        q = q.filter(AttCol::AlertId.eq(alert_id.as_str()));
    }
    if let Some(channel) = filter.channel_eq {
        q = q.filter(AttCol::Channel.eq(channel.to_string()));
    }
    if let Some(status) = filter.status_eq {
        q = q.filter(AttCol::Status.eq(status.to_string()));
    }
    if let Some(ref contact_id) = filter.contact_id {
        q = q.filter(AttCol::ContactId.eq(contact_id.as_str()));
    }
    q
}

#[async_trait::async_trait]
impl AttemptStore for Store {
    async fn load_by_provider_id(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Option<DeliveryRecord>, LedgerError> {
        Ok(self
            .get_attempt_by_provider_id(channel, provider_message_id)
            .await?)
    }

    async fn save(&self, record: &DeliveryRecord) -> Result<(), LedgerError> {
        Ok(self.save_attempt(record).await?)
    }
}
