use crate::policy;
use seawarn_common::types::Channel;
use seawarn_storage::{ContactRow, StepRow};
use serde::Serialize;

/// One outbound message a step would produce.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PlannedDispatch {
    pub contact_id: String,
    pub contact_name: String,
    pub channel: Channel,
    pub address: String,
}

/// A contact a step addresses but cannot reach.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SkippedContact {
    pub contact_id: String,
    pub contact_name: String,
    pub reason: String,
}

/// Resolved view of one escalation step.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct StepPlan {
    pub step_index: i32,
    pub timeout_secs: i64,
    pub dispatches: Vec<PlannedDispatch>,
    pub skipped: Vec<SkippedContact>,
}

/// Full escalation preview for an alert. Produced by the dry-run
/// endpoint; the live engine resolves each step through the same
/// [`plan_step`] function, so the preview is what would actually run.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct EscalationPlan {
    pub alert_id: String,
    pub policy_id: String,
    pub policy_name: String,
    pub steps: Vec<StepPlan>,
}

/// Resolves one step against the contact directory and the configured
/// channels.
///
/// Each selected contact is dispatched on every step channel they have
/// an address for. A contact with a preference order gets their
/// channels reordered accordingly; the step's channel list still
/// bounds what is used. Contacts with no usable channel are reported
/// as skipped, not silently dropped.
pub fn plan_step(
    step: &StepRow,
    contacts: &[ContactRow],
    configured_channels: &[Channel],
) -> StepPlan {
    let mut dispatches = Vec::new();
    let mut skipped = Vec::new();

    for contact in policy::select_contacts(step, contacts) {
        let channels = ordered_channels(step, contact);
        let mut reached = false;
        let mut unconfigured = false;
        for channel in channels {
            if contact.address_for(channel).is_none() {
                continue;
            }
            if !configured_channels.contains(&channel) {
                unconfigured = true;
                continue;
            }
            let address = contact
                .address_for(channel)
                .map(str::to_string)
                .unwrap_or_default();
            dispatches.push(PlannedDispatch {
                contact_id: contact.id.clone(),
                contact_name: contact.name.clone(),
                channel,
                address,
            });
            reached = true;
        }
        if !reached {
            let reason = if unconfigured {
                "no provider configured for any reachable channel".to_string()
            } else {
                format!("no address for step channels {:?}", step.channels)
            };
            skipped.push(SkippedContact {
                contact_id: contact.id.clone(),
                contact_name: contact.name.clone(),
                reason,
            });
        }
    }

    StepPlan {
        step_index: step.step_index,
        timeout_secs: step.timeout_secs,
        dispatches,
        skipped,
    }
}

/// Step channels reordered by the contact's preference; channels the
/// step does not include are never added.
fn ordered_channels(step: &StepRow, contact: &ContactRow) -> Vec<Channel> {
    if contact.preferred_channels.is_empty() {
        return step.channels.clone();
    }
    let mut ordered: Vec<Channel> = contact
        .preferred_channels
        .iter()
        .copied()
        .filter(|c| step.channels.contains(c))
        .collect();
    for c in &step.channels {
        if !ordered.contains(c) {
            ordered.push(*c);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn step(channels: Vec<Channel>) -> StepRow {
        StepRow {
            id: "s0".to_string(),
            policy_id: "p1".to_string(),
            step_index: 0,
            role_pattern: "*".to_string(),
            max_priority: None,
            channels,
            timeout_secs: 120,
        }
    }

    fn contact(name: &str, phone: Option<&str>, email: Option<&str>) -> ContactRow {
        ContactRow {
            id: format!("c-{name}"),
            name: name.to_string(),
            role: "bridge.officer".to_string(),
            priority: 10,
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
            whatsapp: None,
            preferred_channels: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dispatches_every_reachable_channel() {
        let contacts = vec![contact("reyes", Some("+15550001"), Some("r@example.com"))];
        let plan = plan_step(
            &step(vec![Channel::Sms, Channel::Email]),
            &contacts,
            &[Channel::Sms, Channel::Email],
        );
        assert_eq!(plan.dispatches.len(), 2);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn contact_without_address_is_skipped_with_reason() {
        let contacts = vec![contact("reyes", None, None)];
        let plan = plan_step(&step(vec![Channel::Sms]), &contacts, &[Channel::Sms]);
        assert!(plan.dispatches.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert!(plan.skipped[0].reason.contains("no address"));
    }

    #[test]
    fn unconfigured_provider_reported_distinctly() {
        let contacts = vec![contact("reyes", Some("+15550001"), None)];
        let plan = plan_step(&step(vec![Channel::Sms]), &contacts, &[Channel::Email]);
        assert!(plan.dispatches.is_empty());
        assert!(plan.skipped[0].reason.contains("no provider configured"));
    }

    #[test]
    fn preference_order_bounds_to_step_channels() {
        let mut c = contact("reyes", Some("+15550001"), Some("r@example.com"));
        c.preferred_channels = vec![Channel::Email, Channel::Voice, Channel::Sms];
        let ordered = ordered_channels(&step(vec![Channel::Sms, Channel::Email]), &c);
        assert_eq!(ordered, vec![Channel::Email, Channel::Sms]);
    }
}
