use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 100,
    phone TEXT,
    email TEXT,
    whatsapp TEXT,
    preferred_channels TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contacts_role ON contacts(role);
CREATE INDEX IF NOT EXISTS idx_contacts_priority ON contacts(priority);

CREATE TABLE IF NOT EXISTS escalation_policies (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    event_type TEXT NOT NULL,
    severities TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_escalation_policies_enabled ON escalation_policies(enabled);

CREATE TABLE IF NOT EXISTS escalation_steps (
    id TEXT PRIMARY KEY NOT NULL,
    policy_id TEXT NOT NULL,
    step_index INTEGER NOT NULL,
    role_pattern TEXT NOT NULL,
    max_priority INTEGER,
    channels TEXT NOT NULL,
    timeout_secs INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_escalation_steps_policy_index
    ON escalation_steps(policy_id, step_index);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    event_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    headline TEXT NOT NULL,
    recommendation TEXT,
    target TEXT,
    status TEXT NOT NULL,
    policy_id TEXT,
    escalation_step INTEGER NOT NULL DEFAULT 0,
    escalation_started INTEGER NOT NULL DEFAULT 0,
    exhausted INTEGER NOT NULL DEFAULT 0,
    acknowledged_by TEXT,
    created_at TEXT NOT NULL,
    sent_at TEXT,
    acknowledged_at TEXT,
    resolved_at TEXT,
    expires_at TEXT,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status);
CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_alerts_policy ON alerts(policy_id);

CREATE TABLE IF NOT EXISTS delivery_attempts (
    id TEXT PRIMARY KEY NOT NULL,
    alert_id TEXT NOT NULL,
    step_index INTEGER NOT NULL,
    contact_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    address TEXT NOT NULL,
    provider_message_id TEXT,
    status TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    sent_at TEXT,
    delivered_at TEXT,
    read_at TEXT,
    acknowledged_at TEXT,
    closed_at TEXT,
    error_code TEXT,
    error_message TEXT,
    metadata TEXT,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_delivery_attempts_alert
    ON delivery_attempts(alert_id, step_index);
CREATE INDEX IF NOT EXISTS idx_delivery_attempts_status ON delivery_attempts(status);
CREATE UNIQUE INDEX IF NOT EXISTS uq_delivery_attempts_provider
    ON delivery_attempts(channel, provider_message_id)
    WHERE provider_message_id IS NOT NULL;
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS delivery_attempts;
DROP TABLE IF EXISTS alerts;
DROP TABLE IF EXISTS escalation_steps;
DROP TABLE IF EXISTS escalation_policies;
DROP TABLE IF EXISTS contacts;
";
