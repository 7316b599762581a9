use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use seawarn_common::types::{AlertStatus, Severity};
use serde::{Deserialize, Serialize};

use crate::entities::alert::{self, Column as AlertCol, Entity as AlertEntity};
use crate::store::Store;

/// Alert data row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: String,
    pub event_type: String,
    pub severity: Severity,
    pub headline: String,
    pub recommendation: Option<String>,
    /// Target descriptor: a vessel ID or an ad hoc contact-set tag.
    pub target: Option<String>,
    pub status: AlertStatus,
    pub policy_id: Option<String>,
    pub escalation_step: i32,
    pub escalation_started: bool,
    pub exhausted: bool,
    pub acknowledged_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Alert list filter.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status_eq: Option<AlertStatus>,
    pub severity_eq: Option<Severity>,
    pub event_type_eq: Option<String>,
}

fn model_to_alert(m: alert::Model) -> Result<AlertRow> {
    Ok(AlertRow {
        id: m.id,
        event_type: m.event_type,
        severity: m.severity.parse().map_err(anyhow::Error::msg)?,
        headline: m.headline,
        recommendation: m.recommendation,
        target: m.target,
        status: m.status.parse().map_err(anyhow::Error::msg)?,
        policy_id: m.policy_id,
        escalation_step: m.escalation_step,
        escalation_started: m.escalation_started,
        exhausted: m.exhausted,
        acknowledged_by: m.acknowledged_by,
        created_at: m.created_at.with_timezone(&Utc),
        sent_at: m.sent_at.map(|t| t.with_timezone(&Utc)),
        acknowledged_at: m.acknowledged_at.map(|t| t.with_timezone(&Utc)),
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
        expires_at: m.expires_at.map(|t| t.with_timezone(&Utc)),
    })
}

impl Store {
    pub async fn insert_alert(&self, row: &AlertRow) -> Result<AlertRow> {
        let now = Utc::now().fixed_offset();
        let am = alert::ActiveModel {
            id: Set(row.id.clone()),
            event_type: Set(row.event_type.clone()),
            severity: Set(row.severity.to_string()),
            headline: Set(row.headline.clone()),
            recommendation: Set(row.recommendation.clone()),
            target: Set(row.target.clone()),
            status: Set(row.status.to_string()),
            policy_id: Set(row.policy_id.clone()),
            escalation_step: Set(row.escalation_step),
            escalation_started: Set(row.escalation_started),
            exhausted: Set(row.exhausted),
            acknowledged_by: Set(row.acknowledged_by.clone()),
            created_at: Set(row.created_at.fixed_offset()),
            sent_at: Set(row.sent_at.map(|t| t.fixed_offset())),
            acknowledged_at: Set(row.acknowledged_at.map(|t| t.fixed_offset())),
            resolved_at: Set(row.resolved_at.map(|t| t.fixed_offset())),
            expires_at: Set(row.expires_at.map(|t| t.fixed_offset())),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        model_to_alert(model)
    }

    pub async fn get_alert_by_id(&self, id: &str) -> Result<Option<AlertRow>> {
        let model = AlertEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_alert).transpose()
    }

    pub async fn list_alerts(
        &self,
        filter: &AlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRow>> {
        let mut q = AlertEntity::find();
        if let Some(status) = filter.status_eq {
            q = q.filter(AlertCol::Status.eq(status.to_string()));
        }
        if let Some(sev) = filter.severity_eq {
            q = q.filter(AlertCol::Severity.eq(sev.to_string()));
        }
        if let Some(ref et) = filter.event_type_eq {
            q = q.filter(AlertCol::EventType.eq(et.as_str()));
        }
        let rows = q
            .order_by(AlertCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_alert).collect()
    }

    pub async fn count_alerts(&self, filter: &AlertFilter) -> Result<u64> {
        let mut q = AlertEntity::find();
        if let Some(status) = filter.status_eq {
            q = q.filter(AlertCol::Status.eq(status.to_string()));
        }
        if let Some(sev) = filter.severity_eq {
            q = q.filter(AlertCol::Severity.eq(sev.to_string()));
        }
        if let Some(ref et) = filter.event_type_eq {
            q = q.filter(AlertCol::EventType.eq(et.as_str()));
        }
        Ok(q.count(self.db()).await?)
    }

    /// Alerts whose escalation was live when the process last stopped.
    /// Used to resume timers on startup.
    pub async fn list_escalating_alerts(&self) -> Result<Vec<AlertRow>> {
        let rows = AlertEntity::find()
            .filter(AlertCol::Status.eq(AlertStatus::Sent.to_string()))
            .filter(AlertCol::EscalationStarted.eq(true))
            .order_by(AlertCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_alert).collect()
    }

    /// Marks the alert sent and records when its first step started.
    pub async fn mark_alert_sent(&self, id: &str, at: DateTime<Utc>) -> Result<Option<AlertRow>> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert::ActiveModel = model.into();
        am.status = Set(AlertStatus::Sent.to_string());
        am.escalation_started = Set(true);
        am.sent_at = Set(Some(at.fixed_offset()));
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    /// Advances the monotonic escalation step index. A stale advance
    /// (target at or below the current step) is ignored.
    pub async fn set_alert_step(&self, id: &str, step: i32) -> Result<Option<AlertRow>> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        if step <= model.escalation_step && model.escalation_step != 0 {
            return model_to_alert(model).map(Some);
        }
        let mut am: alert::ActiveModel = model.into();
        am.escalation_step = Set(step);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    /// Marks the policy exhausted: every step timed out unacknowledged.
    /// The alert stays `sent` for operator follow-up.
    pub async fn mark_alert_exhausted(&self, id: &str) -> Result<Option<AlertRow>> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert::ActiveModel = model.into();
        am.exhausted = Set(true);
        am.escalation_started = Set(false);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    /// Acknowledges the alert. Idempotent: a second acknowledgement
    /// returns the row unchanged, keeping the original actor and time.
    pub async fn acknowledge_alert(
        &self,
        id: &str,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<AlertRow>> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        if model.status == AlertStatus::Acknowledged.to_string() {
            return model_to_alert(model).map(Some);
        }
        let mut am: alert::ActiveModel = model.into();
        am.status = Set(AlertStatus::Acknowledged.to_string());
        am.acknowledged_by = Set(Some(by.to_string()));
        am.acknowledged_at = Set(Some(at.fixed_offset()));
        am.escalation_started = Set(false);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }

    pub async fn resolve_alert(&self, id: &str, at: DateTime<Utc>) -> Result<Option<AlertRow>> {
        let Some(model) = AlertEntity::find_by_id(id).one(self.db()).await? else {
            return Ok(None);
        };
        let mut am: alert::ActiveModel = model.into();
        am.status = Set(AlertStatus::Resolved.to_string());
        am.resolved_at = Set(Some(at.fixed_offset()));
        am.escalation_started = Set(false);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_alert(updated).map(Some)
    }
}
