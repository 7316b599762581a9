use crate::normalize::{verify_signature, NormalizeError, WebhookNormalizer};
use chrono::DateTime;
use seawarn_common::types::{CanonicalEvent, Channel, EventError, EventKind};
use serde::Deserialize;

/// Callback from the SMS/voice gateway.
///
/// The gateway posts one form-encoded event per request and uses the
/// same shape for text messages and calls, so one normalizer serves
/// both channels; the channel is fixed at registration (one instance
/// per webhook route).
pub struct SmsGatewayNormalizer {
    channel: Channel,
    secret: Option<String>,
}

#[derive(Deserialize)]
struct GatewayCallback {
    message_id: String,
    status: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    ts: i64,
}

impl SmsGatewayNormalizer {
    pub fn new(channel: Channel, secret: Option<String>) -> Self {
        Self { channel, secret }
    }

    fn map_status(&self, status: &str) -> EventKind {
        match status {
            "sent" => EventKind::Sent,
            "delivered" => EventKind::Delivered,
            "failed" | "undelivered" => EventKind::Failed,
            // Voice call progress: an answered or completed call counts
            // as delivered, an unanswered one as failed.
            "answered" | "completed" => EventKind::Delivered,
            "no-answer" | "busy" => EventKind::Failed,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl WebhookNormalizer for SmsGatewayNormalizer {
    fn provider(&self) -> &'static str {
        match self.channel {
            Channel::Voice => "voice_gateway",
            _ => "sms_gateway",
        }
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), NormalizeError> {
        verify_signature(self.provider(), self.secret.as_deref(), body, signature)
    }

    fn normalize(&self, body: &[u8]) -> Result<Vec<(Channel, CanonicalEvent)>, NormalizeError> {
        let cb: GatewayCallback = serde_urlencoded::from_bytes(body)
            .map_err(|e| NormalizeError::Malformed(format!("{}: {e}", self.provider())))?;

        let timestamp = DateTime::from_timestamp(cb.ts, 0).ok_or_else(|| {
            NormalizeError::Malformed(format!("{}: timestamp {} out of range", self.provider(), cb.ts))
        })?;

        let kind = self.map_status(&cb.status);
        let mut event = CanonicalEvent::new(cb.message_id, kind, timestamp);
        if matches!(event.kind, EventKind::Failed) {
            event.error = Some(EventError {
                code: cb.error_code,
                message: cb
                    .error_description
                    .unwrap_or_else(|| format!("gateway reported status '{}'", cb.status)),
            });
        }

        Ok(vec![(self.channel, event)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivered_callback_parses() {
        let n = SmsGatewayNormalizer::new(Channel::Sms, None);
        let body = b"message_id=gw-42&status=delivered&ts=1700000100";
        let events = n.normalize(body).unwrap();
        assert_eq!(events.len(), 1);
        let (channel, event) = &events[0];
        assert_eq!(*channel, Channel::Sms);
        assert_eq!(event.provider_message_id, "gw-42");
        assert_eq!(event.kind, EventKind::Delivered);
        assert_eq!(event.timestamp.timestamp(), 1_700_000_100);
    }

    #[test]
    fn undelivered_maps_to_failure_with_error() {
        let n = SmsGatewayNormalizer::new(Channel::Sms, None);
        let body =
            b"message_id=gw-43&status=undelivered&error_code=E212&error_description=blocked&ts=1700000200";
        let events = n.normalize(body).unwrap();
        let event = &events[0].1;
        assert_eq!(event.kind, EventKind::Failed);
        let err = event.error.as_ref().unwrap();
        assert_eq!(err.code.as_deref(), Some("E212"));
        assert_eq!(err.message, "blocked");
    }

    #[test]
    fn voice_answered_maps_to_delivered() {
        let n = SmsGatewayNormalizer::new(Channel::Voice, None);
        let body = b"message_id=call-7&status=answered&ts=1700000300";
        let events = n.normalize(body).unwrap();
        assert_eq!(events[0].0, Channel::Voice);
        assert_eq!(events[0].1.kind, EventKind::Delivered);
    }

    #[test]
    fn unknown_status_becomes_unmapped_event() {
        let n = SmsGatewayNormalizer::new(Channel::Sms, None);
        let body = b"message_id=gw-44&status=carrier_queued&ts=1700000400";
        let events = n.normalize(body).unwrap();
        assert_eq!(
            events[0].1.kind,
            EventKind::Other("carrier_queued".to_string())
        );
    }

    #[test]
    fn garbage_body_is_malformed() {
        let n = SmsGatewayNormalizer::new(Channel::Sms, None);
        assert!(matches!(
            n.normalize(b"status=delivered"),
            Err(NormalizeError::Malformed(_))
        ));
    }
}
