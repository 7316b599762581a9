use crate::error::EscalationError;
use glob_match::glob_match;
use seawarn_common::types::Severity;
use seawarn_storage::{ContactRow, PolicyRow, StepRow};

/// Whether a policy applies to an alert.
///
/// The event type is matched as a glob (`tsunami.*` covers
/// `tsunami.warning`) and the severity must be in the policy's set.
pub fn matches(policy: &PolicyRow, event_type: &str, severity: Severity) -> bool {
    policy.enabled
        && glob_match(&policy.event_type, event_type)
        && policy.severities.contains(&severity)
}

/// Picks the policy for an alert: the first enabled match in creation
/// order. Returns `None` when nothing matches; the caller leaves the
/// alert pending and surfaces it.
pub fn resolve<'a>(
    policies: &'a [PolicyRow],
    event_type: &str,
    severity: Severity,
) -> Option<&'a PolicyRow> {
    policies.iter().find(|p| matches(p, event_type, severity))
}

/// Rejects step lists an escalation cannot run: empty, sparse or
/// unordered indexes, non-positive timeouts, or a step with no
/// channels.
pub fn validate_steps(policy_name: &str, steps: &[StepRow]) -> Result<(), EscalationError> {
    if steps.is_empty() {
        return Err(EscalationError::PolicyResolution(format!(
            "policy '{policy_name}' has no steps"
        )));
    }
    for (i, step) in steps.iter().enumerate() {
        if step.step_index != i as i32 {
            return Err(EscalationError::PolicyResolution(format!(
                "policy '{policy_name}' steps are not dense 0-based (found index {} at position {i})",
                step.step_index
            )));
        }
        if step.timeout_secs <= 0 {
            return Err(EscalationError::PolicyResolution(format!(
                "policy '{policy_name}' step {i} has non-positive timeout"
            )));
        }
        if step.channels.is_empty() {
            return Err(EscalationError::PolicyResolution(format!(
                "policy '{policy_name}' step {i} has no channels"
            )));
        }
    }
    Ok(())
}

/// Contacts a step addresses: role glob match plus the optional
/// priority cap. Input order (priority ascending) is preserved.
pub fn select_contacts<'a>(step: &StepRow, contacts: &'a [ContactRow]) -> Vec<&'a ContactRow> {
    contacts
        .iter()
        .filter(|c| glob_match(&step.role_pattern, &c.role))
        .filter(|c| step.max_priority.map_or(true, |cap| c.priority <= cap))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use seawarn_common::types::Channel;

    fn policy(event_type: &str, severities: Vec<Severity>, enabled: bool) -> PolicyRow {
        PolicyRow {
            id: "p1".to_string(),
            name: "test".to_string(),
            event_type: event_type.to_string(),
            severities,
            enabled,
            created_at: Utc::now(),
        }
    }

    fn step(index: i32, role_pattern: &str, max_priority: Option<i32>) -> StepRow {
        StepRow {
            id: format!("s{index}"),
            policy_id: "p1".to_string(),
            step_index: index,
            role_pattern: role_pattern.to_string(),
            max_priority,
            channels: vec![Channel::Sms],
            timeout_secs: 120,
        }
    }

    fn contact(role: &str, priority: i32) -> ContactRow {
        ContactRow {
            id: format!("c-{role}-{priority}"),
            name: role.to_string(),
            role: role.to_string(),
            priority,
            phone: Some("+15550001".to_string()),
            email: None,
            whatsapp: None,
            preferred_channels: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn event_type_glob_and_severity_set() {
        let p = policy("tsunami.*", vec![Severity::High, Severity::Critical], true);
        assert!(matches(&p, "tsunami.warning", Severity::Critical));
        assert!(!matches(&p, "tsunami.warning", Severity::Low));
        assert!(!matches(&p, "seismic.swarm", Severity::Critical));
    }

    #[test]
    fn disabled_policy_never_matches() {
        let p = policy("*", vec![Severity::Critical], false);
        assert!(!matches(&p, "tsunami.warning", Severity::Critical));
    }

    #[test]
    fn resolve_takes_first_match_in_order() {
        let broad = policy("*", vec![Severity::Critical], true);
        let mut narrow = policy("tsunami.*", vec![Severity::Critical], true);
        narrow.id = "p2".to_string();
        let policies = vec![broad, narrow];
        let hit = resolve(&policies, "tsunami.warning", Severity::Critical).unwrap();
        assert_eq!(hit.id, "p1");
    }

    #[test]
    fn empty_and_sparse_step_lists_rejected() {
        assert!(validate_steps("t", &[]).is_err());
        assert!(validate_steps("t", &[step(1, "*", None)]).is_err());
        assert!(validate_steps("t", &[step(0, "*", None), step(2, "*", None)]).is_err());
        assert!(validate_steps("t", &[step(0, "*", None), step(1, "*", None)]).is_ok());
    }

    #[test]
    fn step_without_channels_rejected() {
        let mut s = step(0, "*", None);
        s.channels.clear();
        assert!(validate_steps("t", &[s]).is_err());
    }

    #[test]
    fn contact_selection_respects_glob_and_priority_cap() {
        let contacts = vec![
            contact("bridge.captain", 1),
            contact("bridge.officer", 20),
            contact("shore.dispatch", 5),
        ];
        let selected = select_contacts(&step(0, "bridge.*", Some(10)), &contacts);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].role, "bridge.captain");

        let all_bridge = select_contacts(&step(0, "bridge.*", None), &contacts);
        assert_eq!(all_bridge.len(), 2);
    }
}
