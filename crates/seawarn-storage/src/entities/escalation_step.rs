use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "escalation_steps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub policy_id: String,
    pub step_index: i32,
    /// Glob over contact roles, e.g. `bridge.*`.
    pub role_pattern: String,
    /// Contacts with priority above this value are excluded. NULL means
    /// no cap.
    pub max_priority: Option<i32>,
    /// JSON array of channel names, dispatched concurrently.
    pub channels: String,
    pub timeout_secs: i64,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
