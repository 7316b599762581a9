use crate::channels::{classify_status, classify_transport};
use crate::plugin::DispatcherPlugin;
use crate::{ChannelDispatcher, DispatchError, DispatchReceipt};
use async_trait::async_trait;
use seawarn_common::types::{Channel, MessageContent};
use serde::Deserialize;
use serde_json::Value;
use tracing;

/// Voice-call dispatcher backed by the same gateway family as SMS.
///
/// Queues one text-to-speech call; the gateway reads the message body to
/// the recipient. Call progress arrives later via the gateway webhook.
pub struct VoiceDispatcher {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
    caller_id: String,
}

impl VoiceDispatcher {
    pub fn new(gateway_url: &str, api_key: &str, caller_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.to_string(),
            api_key: api_key.to_string(),
            caller_id: caller_id.to_string(),
        }
    }
}

#[async_trait]
impl ChannelDispatcher for VoiceDispatcher {
    async fn dispatch(
        &self,
        address: &str,
        content: &MessageContent,
    ) -> Result<DispatchReceipt, DispatchError> {
        let payload = serde_json::json!({
            "from": self.caller_id,
            "to": address,
            "say": format!("{}. {}", content.subject, content.body),
        });

        let resp = self
            .client
            .post(&self.gateway_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_transport("voice gateway", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status("voice gateway", status, address));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| DispatchError::MalformedResponse(format!("voice gateway: {e}")))?;
        let call_id = body.get("call_id").and_then(|v| v.as_str()).ok_or_else(|| {
            DispatchError::MalformedResponse("voice gateway response missing call_id".into())
        })?;

        tracing::debug!(to = %address, call_id, "Voice call queued by gateway");
        Ok(DispatchReceipt {
            provider_message_id: call_id.to_string(),
        })
    }

    fn channel(&self) -> Channel {
        Channel::Voice
    }
}

// Plugin

#[derive(Deserialize)]
struct VoiceConfig {
    gateway_url: String,
    api_key: String,
    caller_id: String,
}

pub struct VoicePlugin;

impl DispatcherPlugin for VoicePlugin {
    fn name(&self) -> &str {
        "voice"
    }

    fn channel(&self) -> Channel {
        Channel::Voice
    }

    fn validate_config(&self, config: &Value) -> Result<(), DispatchError> {
        serde_json::from_value::<VoiceConfig>(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("voice: {e}")))?;
        Ok(())
    }

    fn create_dispatcher(
        &self,
        config: &Value,
    ) -> Result<Box<dyn ChannelDispatcher>, DispatchError> {
        let cfg: VoiceConfig = serde_json::from_value(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("voice: {e}")))?;
        Ok(Box::new(VoiceDispatcher::new(
            &cfg.gateway_url,
            &cfg.api_key,
            &cfg.caller_id,
        )))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("api_key") {
                obj.insert("api_key".to_string(), Value::String("***".to_string()));
            }
        }
        redacted
    }
}
