//! Seed loading for the contact directory and escalation policies.
//!
//! Used by the `init-directory` subcommand to bootstrap a fresh
//! install from a JSON file. Existing rows are matched by name and
//! skipped, so re-running a seed is safe.

use anyhow::Result;
use chrono::Utc;
use seawarn_common::types::{Channel, Severity};
use seawarn_escalation::policy::validate_steps;
use seawarn_storage::{ContactRow, PolicyRow, StepRow, Store};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub contacts: Vec<SeedContact>,
    #[serde(default)]
    pub policies: Vec<SeedPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedContact {
    pub name: String,
    pub role: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub preferred_channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPolicy {
    pub name: String,
    pub event_type: String,
    pub severities: Vec<Severity>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub steps: Vec<SeedStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedStep {
    pub role_pattern: String,
    #[serde(default)]
    pub max_priority: Option<i32>,
    pub channels: Vec<Channel>,
    pub timeout_secs: i64,
}

fn default_priority() -> i32 {
    100
}

fn default_enabled() -> bool {
    true
}

/// Imports contacts and policies from a JSON seed file.
pub async fn init_from_seed_file(store: &Store, seed_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: SeedFile = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let existing_contacts: HashSet<String> = store
        .list_all_contacts()
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();

    let mut contacts_created = 0u32;
    let mut contacts_skipped = 0u32;
    for c in &seed.contacts {
        if existing_contacts.contains(&c.name) {
            tracing::warn!(name = %c.name, "Contact already exists, skipping");
            contacts_skipped += 1;
            continue;
        }
        let row = ContactRow {
            id: seawarn_common::id::next_id(),
            name: c.name.clone(),
            role: c.role.clone(),
            priority: c.priority,
            phone: c.phone.clone(),
            email: c.email.clone(),
            whatsapp: c.whatsapp.clone(),
            preferred_channels: c.preferred_channels.clone(),
            created_at: Utc::now(),
        };
        match store.insert_contact(&row).await {
            Ok(inserted) => {
                tracing::info!(name = %c.name, id = %inserted.id, "Contact created");
                contacts_created += 1;
            }
            Err(e) => {
                tracing::error!(name = %c.name, error = %e, "Failed to create contact");
            }
        }
    }

    let existing_policies: HashSet<String> = store
        .list_enabled_policies()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();

    let mut policies_created = 0u32;
    let mut policies_skipped = 0u32;
    for p in &seed.policies {
        if existing_policies.contains(&p.name) {
            tracing::warn!(name = %p.name, "Policy already exists, skipping");
            policies_skipped += 1;
            continue;
        }
        let policy = PolicyRow {
            id: seawarn_common::id::next_id(),
            name: p.name.clone(),
            event_type: p.event_type.clone(),
            severities: p.severities.clone(),
            enabled: p.enabled,
            created_at: Utc::now(),
        };
        let steps: Vec<StepRow> = p
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepRow {
                id: seawarn_common::id::next_id(),
                policy_id: policy.id.clone(),
                step_index: i as i32,
                role_pattern: s.role_pattern.clone(),
                max_priority: s.max_priority,
                channels: s.channels.clone(),
                timeout_secs: s.timeout_secs,
            })
            .collect();
        if let Err(e) = validate_steps(&policy.name, &steps) {
            tracing::error!(name = %p.name, error = %e, "Seed policy rejected");
            continue;
        }
        match store.insert_policy(&policy, &steps).await {
            Ok(inserted) => {
                tracing::info!(
                    name = %p.name,
                    id = %inserted.id,
                    steps = steps.len(),
                    "Policy created"
                );
                policies_created += 1;
            }
            Err(e) => {
                tracing::error!(name = %p.name, error = %e, "Failed to create policy");
            }
        }
    }

    tracing::info!(
        contacts_created,
        contacts_skipped,
        policies_created,
        policies_skipped,
        "init-directory completed"
    );
    Ok(())
}
