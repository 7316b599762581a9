use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use seawarn_common::types::{Channel, Severity};
use serde::{Deserialize, Serialize};

use crate::entities::escalation_policy::{self, Column as PolicyCol, Entity as PolicyEntity};
use crate::entities::escalation_step::{self, Column as StepCol, Entity as StepEntity};
use crate::store::Store;

/// Escalation policy data row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRow {
    pub id: String,
    pub name: String,
    /// Glob matched against alert event types.
    pub event_type: String,
    /// Severities this policy covers.
    pub severities: Vec<Severity>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// One escalation step. Steps are dense and 0-based within a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRow {
    pub id: String,
    pub policy_id: String,
    pub step_index: i32,
    /// Glob matched against contact roles.
    pub role_pattern: String,
    /// Contacts with a priority above this are excluded; `None` means
    /// no cap.
    pub max_priority: Option<i32>,
    /// Channels dispatched concurrently for this step.
    pub channels: Vec<Channel>,
    pub timeout_secs: i64,
}

fn model_to_policy(m: escalation_policy::Model) -> Result<PolicyRow> {
    Ok(PolicyRow {
        id: m.id,
        name: m.name,
        event_type: m.event_type,
        severities: serde_json::from_str(&m.severities)?,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn model_to_step(m: escalation_step::Model) -> Result<StepRow> {
    Ok(StepRow {
        id: m.id,
        policy_id: m.policy_id,
        step_index: m.step_index,
        role_pattern: m.role_pattern,
        max_priority: m.max_priority,
        channels: serde_json::from_str(&m.channels)?,
        timeout_secs: m.timeout_secs,
    })
}

impl Store {
    /// Inserts a policy together with its ordered steps.
    pub async fn insert_policy(&self, policy: &PolicyRow, steps: &[StepRow]) -> Result<PolicyRow> {
        let now = Utc::now().fixed_offset();
        let am = escalation_policy::ActiveModel {
            id: Set(policy.id.clone()),
            name: Set(policy.name.clone()),
            event_type: Set(policy.event_type.clone()),
            severities: Set(serde_json::to_string(&policy.severities)?),
            enabled: Set(policy.enabled),
            created_at: Set(policy.created_at.fixed_offset()),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;

        for step in steps {
            let am = escalation_step::ActiveModel {
                id: Set(step.id.clone()),
                policy_id: Set(policy.id.clone()),
                step_index: Set(step.step_index),
                role_pattern: Set(step.role_pattern.clone()),
                max_priority: Set(step.max_priority),
                channels: Set(serde_json::to_string(&step.channels)?),
                timeout_secs: Set(step.timeout_secs),
                created_at: Set(now),
            };
            am.insert(self.db()).await?;
        }
        model_to_policy(model)
    }

    pub async fn get_policy_by_id(&self, id: &str) -> Result<Option<PolicyRow>> {
        let model = PolicyEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_policy).transpose()
    }

    pub async fn list_enabled_policies(&self) -> Result<Vec<PolicyRow>> {
        let rows = PolicyEntity::find()
            .filter(PolicyCol::Enabled.eq(true))
            .order_by(PolicyCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_policy).collect()
    }

    pub async fn count_policies(&self) -> Result<u64> {
        Ok(PolicyEntity::find().count(self.db()).await?)
    }

    /// Steps of a policy in escalation order.
    pub async fn steps_for_policy(&self, policy_id: &str) -> Result<Vec<StepRow>> {
        let rows = StepEntity::find()
            .filter(StepCol::PolicyId.eq(policy_id))
            .order_by(StepCol::StepIndex, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_step).collect()
    }
}
