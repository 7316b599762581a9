use crate::normalize::{verify_signature, NormalizeError, WebhookNormalizer};
use chrono::DateTime;
use seawarn_common::types::{CanonicalEvent, Channel, EventError, EventKind};
use serde::Deserialize;

/// Callback from the WhatsApp Cloud API.
///
/// One POST carries a batch of status objects. Timestamps arrive as
/// unix-second strings.
pub struct WhatsappNormalizer {
    secret: Option<String>,
}

#[derive(Deserialize)]
struct WhatsappCallback {
    #[serde(default)]
    statuses: Vec<WhatsappStatus>,
}

#[derive(Deserialize)]
struct WhatsappStatus {
    id: String,
    status: String,
    timestamp: String,
    #[serde(default)]
    errors: Vec<WhatsappError>,
}

#[derive(Deserialize)]
struct WhatsappError {
    code: i64,
    #[serde(default)]
    title: String,
}

impl WhatsappNormalizer {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl WebhookNormalizer for WhatsappNormalizer {
    fn provider(&self) -> &'static str {
        "whatsapp"
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), NormalizeError> {
        verify_signature(self.provider(), self.secret.as_deref(), body, signature)
    }

    fn normalize(&self, body: &[u8]) -> Result<Vec<(Channel, CanonicalEvent)>, NormalizeError> {
        let cb: WhatsappCallback = serde_json::from_slice(body)
            .map_err(|e| NormalizeError::Malformed(format!("whatsapp: {e}")))?;

        let mut events = Vec::with_capacity(cb.statuses.len());
        for status in cb.statuses {
            let secs: i64 = status.timestamp.parse().map_err(|_| {
                NormalizeError::Malformed(format!(
                    "whatsapp: non-numeric timestamp '{}'",
                    status.timestamp
                ))
            })?;
            let timestamp = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                NormalizeError::Malformed(format!("whatsapp: timestamp {secs} out of range"))
            })?;

            let kind = match status.status.as_str() {
                "sent" => EventKind::Sent,
                "delivered" => EventKind::Delivered,
                "read" => EventKind::Read,
                "failed" => EventKind::Failed,
                other => EventKind::Other(other.to_string()),
            };

            let mut event = CanonicalEvent::new(status.id, kind, timestamp);
            if let Some(err) = status.errors.first() {
                event.error = Some(EventError {
                    code: Some(err.code.to_string()),
                    message: err.title.clone(),
                });
            }
            events.push((Channel::Whatsapp, event));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_of_statuses_parses() {
        let n = WhatsappNormalizer::new(None);
        let body = serde_json::json!({
            "statuses": [
                {"id": "wamid.A", "status": "sent", "timestamp": "1700000100"},
                {"id": "wamid.A", "status": "delivered", "timestamp": "1700000105"},
                {"id": "wamid.B", "status": "read", "timestamp": "1700000110"},
            ]
        });
        let events = n.normalize(body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].1.kind, EventKind::Sent);
        assert_eq!(events[1].1.kind, EventKind::Delivered);
        assert_eq!(events[2].1.provider_message_id, "wamid.B");
        assert_eq!(events[2].1.kind, EventKind::Read);
        assert!(events.iter().all(|(c, _)| *c == Channel::Whatsapp));
    }

    #[test]
    fn failed_status_carries_error() {
        let n = WhatsappNormalizer::new(None);
        let body = serde_json::json!({
            "statuses": [{
                "id": "wamid.C",
                "status": "failed",
                "timestamp": "1700000200",
                "errors": [{"code": 131026, "title": "Message undeliverable"}]
            }]
        });
        let events = n.normalize(body.to_string().as_bytes()).unwrap();
        let err = events[0].1.error.as_ref().unwrap();
        assert_eq!(err.code.as_deref(), Some("131026"));
        assert_eq!(err.message, "Message undeliverable");
    }

    #[test]
    fn body_without_statuses_yields_no_events() {
        let n = WhatsappNormalizer::new(None);
        let events = n.normalize(b"{}").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn non_numeric_timestamp_is_malformed() {
        let n = WhatsappNormalizer::new(None);
        let body = serde_json::json!({
            "statuses": [{"id": "wamid.D", "status": "sent", "timestamp": "yesterday"}]
        });
        assert!(matches!(
            n.normalize(body.to_string().as_bytes()),
            Err(NormalizeError::Malformed(_))
        ));
    }
}
