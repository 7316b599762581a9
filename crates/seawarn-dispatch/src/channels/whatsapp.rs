use crate::channels::{classify_status, classify_transport};
use crate::plugin::DispatcherPlugin;
use crate::{ChannelDispatcher, DispatchError, DispatchReceipt};
use async_trait::async_trait;
use seawarn_common::types::{Channel, MessageContent};
use serde::Deserialize;
use serde_json::Value;
use tracing;

/// WhatsApp dispatcher speaking the Cloud-API message shape.
///
/// Sends one text message per attempt. Status progression (sent,
/// delivered, read) arrives asynchronously on the WhatsApp webhook keyed
/// by the returned message ID.
pub struct WhatsappDispatcher {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl WhatsappDispatcher {
    pub fn new(api_url: &str, access_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            access_token: access_token.to_string(),
        }
    }
}

#[async_trait]
impl ChannelDispatcher for WhatsappDispatcher {
    async fn dispatch(
        &self,
        address: &str,
        content: &MessageContent,
    ) -> Result<DispatchReceipt, DispatchError> {
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": address,
            "type": "text",
            "text": {
                "body": format!("*{}*\n{}", content.subject, content.body),
            },
        });

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_transport("whatsapp api", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status("whatsapp api", status, address));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| DispatchError::MalformedResponse(format!("whatsapp api: {e}")))?;
        let message_id = body
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DispatchError::MalformedResponse(
                    "whatsapp api response missing messages[0].id".into(),
                )
            })?;

        tracing::debug!(to = %address, message_id, "WhatsApp message accepted");
        Ok(DispatchReceipt {
            provider_message_id: message_id.to_string(),
        })
    }

    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }
}

// Plugin

#[derive(Deserialize)]
struct WhatsappConfig {
    api_url: String,
    access_token: String,
}

pub struct WhatsappPlugin;

impl DispatcherPlugin for WhatsappPlugin {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    fn validate_config(&self, config: &Value) -> Result<(), DispatchError> {
        serde_json::from_value::<WhatsappConfig>(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("whatsapp: {e}")))?;
        Ok(())
    }

    fn create_dispatcher(
        &self,
        config: &Value,
    ) -> Result<Box<dyn ChannelDispatcher>, DispatchError> {
        let cfg: WhatsappConfig = serde_json::from_value(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("whatsapp: {e}")))?;
        Ok(Box::new(WhatsappDispatcher::new(
            &cfg.api_url,
            &cfg.access_token,
        )))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("access_token") {
                obj.insert("access_token".to_string(), Value::String("***".to_string()));
            }
        }
        redacted
    }
}
