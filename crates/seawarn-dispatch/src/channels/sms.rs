use crate::channels::{classify_status, classify_transport};
use crate::plugin::DispatcherPlugin;
use crate::{ChannelDispatcher, DispatchError, DispatchReceipt};
use async_trait::async_trait;
use seawarn_common::types::{Channel, MessageContent};
use serde::Deserialize;
use serde_json::Value;
use tracing;

/// SMS dispatcher backed by an HTTP message gateway.
///
/// One POST per attempt; the gateway's JSON response carries the
/// provider-assigned message ID used for webhook correlation.
pub struct SmsDispatcher {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
    sender_id: String,
}

impl SmsDispatcher {
    pub fn new(gateway_url: &str, api_key: &str, sender_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: gateway_url.to_string(),
            api_key: api_key.to_string(),
            sender_id: sender_id.to_string(),
        }
    }

    fn format_message(content: &MessageContent) -> String {
        format!("{}\n{}", content.subject, content.body)
    }
}

#[async_trait]
impl ChannelDispatcher for SmsDispatcher {
    async fn dispatch(
        &self,
        address: &str,
        content: &MessageContent,
    ) -> Result<DispatchReceipt, DispatchError> {
        let payload = serde_json::json!({
            "from": self.sender_id,
            "to": address,
            "body": Self::format_message(content),
        });

        let resp = self
            .client
            .post(&self.gateway_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_transport("sms gateway", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status("sms gateway", status, address));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| DispatchError::MalformedResponse(format!("sms gateway: {e}")))?;
        let message_id = body
            .get("message_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DispatchError::MalformedResponse("sms gateway response missing message_id".into())
            })?;

        tracing::debug!(to = %address, message_id, "SMS accepted by gateway");
        Ok(DispatchReceipt {
            provider_message_id: message_id.to_string(),
        })
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }
}

// Plugin

#[derive(Deserialize)]
struct SmsConfig {
    gateway_url: String,
    api_key: String,
    sender_id: String,
}

pub struct SmsPlugin;

impl DispatcherPlugin for SmsPlugin {
    fn name(&self) -> &str {
        "sms"
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn validate_config(&self, config: &Value) -> Result<(), DispatchError> {
        serde_json::from_value::<SmsConfig>(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("sms: {e}")))?;
        Ok(())
    }

    fn create_dispatcher(
        &self,
        config: &Value,
    ) -> Result<Box<dyn ChannelDispatcher>, DispatchError> {
        let cfg: SmsConfig = serde_json::from_value(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("sms: {e}")))?;
        Ok(Box::new(SmsDispatcher::new(
            &cfg.gateway_url,
            &cfg.api_key,
            &cfg.sender_id,
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
