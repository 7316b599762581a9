use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use seawarn_common::types::Channel;
use serde::{Deserialize, Serialize};

use crate::entities::contact::{self, Column as ContactCol, Entity as ContactEntity};
use crate::store::Store;

/// Contact data row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: String,
    pub name: String,
    /// Role tag matched by escalation step patterns, e.g. `bridge.officer`.
    pub role: String,
    /// Lower priority is paged earlier.
    pub priority: i32,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    /// Channel preference order; empty means the system default order.
    pub preferred_channels: Vec<Channel>,
    pub created_at: DateTime<Utc>,
}

impl ContactRow {
    /// The address this contact uses on `channel`, if they have one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Sms | Channel::Voice => self.phone.as_deref(),
            Channel::Whatsapp => self.whatsapp.as_deref(),
            Channel::Email => self.email.as_deref(),
        }
    }
}

fn model_to_contact(m: contact::Model) -> Result<ContactRow> {
    let preferred_channels = match m.preferred_channels {
        Some(ref json) => serde_json::from_str(json)?,
        None => Vec::new(),
    };
    Ok(ContactRow {
        id: m.id,
        name: m.name,
        role: m.role,
        priority: m.priority,
        phone: m.phone,
        email: m.email,
        whatsapp: m.whatsapp,
        preferred_channels,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl Store {
    pub async fn insert_contact(&self, row: &ContactRow) -> Result<ContactRow> {
        let now = Utc::now().fixed_offset();
        let preferred = if row.preferred_channels.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&row.preferred_channels)?)
        };
        let am = contact::ActiveModel {
            id: Set(row.id.clone()),
            name: Set(row.name.clone()),
            role: Set(row.role.clone()),
            priority: Set(row.priority),
            phone: Set(row.phone.clone()),
            email: Set(row.email.clone()),
            whatsapp: Set(row.whatsapp.clone()),
            preferred_channels: Set(preferred),
            created_at: Set(row.created_at.fixed_offset()),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        model_to_contact(model)
    }

    pub async fn get_contact_by_id(&self, id: &str) -> Result<Option<ContactRow>> {
        let model = ContactEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_contact).transpose()
    }

    /// All contacts ordered by priority then name. Step patterns are
    /// globs, so role filtering happens in the escalation engine.
    pub async fn list_all_contacts(&self) -> Result<Vec<ContactRow>> {
        let rows = ContactEntity::find()
            .order_by(ContactCol::Priority, Order::Asc)
            .order_by(ContactCol::Name, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_contact).collect()
    }

    pub async fn list_contacts_paged(
        &self,
        role_eq: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContactRow>> {
        let mut q = ContactEntity::find();
        if let Some(role) = role_eq {
            q = q.filter(ContactCol::Role.eq(role));
        }
        let rows = q
            .order_by(ContactCol::Priority, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_contact).collect()
    }

    pub async fn count_contacts(&self, role_eq: Option<&str>) -> Result<u64> {
        let mut q = ContactEntity::find();
        if let Some(role) = role_eq {
            q = q.filter(ContactCol::Role.eq(role));
        }
        Ok(q.count(self.db()).await?)
    }
}
