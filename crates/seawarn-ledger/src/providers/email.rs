use crate::normalize::{verify_signature, NormalizeError, WebhookNormalizer};
use chrono::DateTime;
use seawarn_common::types::{CanonicalEvent, Channel, EventError, EventKind};
use serde::Deserialize;

/// Callback from the mail provider's event webhook.
///
/// The provider posts a JSON array of events correlated by the RFC 5322
/// Message-ID the dispatcher assigned at send time. An `open` counts as
/// read; a hard bounce is terminal.
pub struct EmailNormalizer {
    secret: Option<String>,
}

#[derive(Deserialize)]
struct EmailEvent {
    event: String,
    message_id: String,
    timestamp: i64,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl EmailNormalizer {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl WebhookNormalizer for EmailNormalizer {
    fn provider(&self) -> &'static str {
        "email"
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), NormalizeError> {
        verify_signature(self.provider(), self.secret.as_deref(), body, signature)
    }

    fn normalize(&self, body: &[u8]) -> Result<Vec<(Channel, CanonicalEvent)>, NormalizeError> {
        let raw: Vec<EmailEvent> = serde_json::from_slice(body)
            .map_err(|e| NormalizeError::Malformed(format!("email: {e}")))?;

        let mut events = Vec::with_capacity(raw.len());
        for ev in raw {
            let timestamp = DateTime::from_timestamp(ev.timestamp, 0).ok_or_else(|| {
                NormalizeError::Malformed(format!("email: timestamp {} out of range", ev.timestamp))
            })?;

            let kind = match ev.event.as_str() {
                "processed" => EventKind::Sent,
                "delivered" => EventKind::Delivered,
                "open" => EventKind::Read,
                "bounce" => EventKind::Bounced,
                "dropped" => EventKind::Failed,
                other => EventKind::Other(other.to_string()),
            };

            let mut event = CanonicalEvent::new(ev.message_id, kind, timestamp);
            if matches!(event.kind, EventKind::Bounced | EventKind::Failed) {
                event.error = Some(EventError {
                    code: None,
                    message: ev
                        .reason
                        .unwrap_or_else(|| format!("mail provider reported '{}'", ev.event)),
                });
            } else if let Some(url) = ev.url {
                event.extra = Some(serde_json::json!({ "url": url }));
            }
            events.push((Channel::Email, event));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_and_open_events_parse() {
        let n = EmailNormalizer::new(None);
        let body = serde_json::json!([
            {"event": "delivered", "message_id": "<1@seawarn.example>", "timestamp": 1700000100},
            {"event": "open", "message_id": "<1@seawarn.example>", "timestamp": 1700000160},
        ]);
        let events = n.normalize(body.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1.kind, EventKind::Delivered);
        assert_eq!(events[1].1.kind, EventKind::Read);
        assert_eq!(events[0].0, Channel::Email);
    }

    #[test]
    fn bounce_carries_reason() {
        let n = EmailNormalizer::new(None);
        let body = serde_json::json!([
            {"event": "bounce", "message_id": "<2@seawarn.example>", "timestamp": 1700000200,
             "reason": "550 mailbox unavailable"},
        ]);
        let events = n.normalize(body.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].1.kind, EventKind::Bounced);
        assert_eq!(
            events[0].1.error.as_ref().unwrap().message,
            "550 mailbox unavailable"
        );
    }

    #[test]
    fn click_tracking_is_unmapped_with_extra() {
        let n = EmailNormalizer::new(None);
        let body = serde_json::json!([
            {"event": "click", "message_id": "<3@seawarn.example>", "timestamp": 1700000300,
             "url": "https://seawarn.example/ack/123"},
        ]);
        let events = n.normalize(body.to_string().as_bytes()).unwrap();
        assert_eq!(events[0].1.kind, EventKind::Other("click".to_string()));
        assert_eq!(
            events[0].1.extra.as_ref().unwrap()["url"],
            "https://seawarn.example/ack/123"
        );
    }
}
