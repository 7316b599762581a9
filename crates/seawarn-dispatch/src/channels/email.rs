use crate::plugin::DispatcherPlugin;
use crate::{ChannelDispatcher, DispatchError, DispatchReceipt};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use seawarn_common::types::{Channel, MessageContent};
use serde::Deserialize;
use serde_json::Value;
use tracing;

/// Email dispatcher over async SMTP.
///
/// SMTP has no provider-assigned receipt, so the dispatcher assigns its
/// own RFC 5322 Message-ID before handing the message to the relay. Bounce
/// and delivery webhooks from the mail provider echo that Message-ID back,
/// which makes it the correlation key for the ledger.
pub struct EmailDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    message_id_domain: String,
}

impl EmailDispatcher {
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
        message_id_domain: &str,
    ) -> Result<Self, DispatchError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| DispatchError::InvalidConfig(format!("email: {e}")))?
            .port(smtp_port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
            message_id_domain: message_id_domain.to_string(),
        })
    }

    fn next_message_id(&self) -> String {
        format!("<{}@{}>", seawarn_common::id::next_id(), self.message_id_domain)
    }
}

#[async_trait]
impl ChannelDispatcher for EmailDispatcher {
    async fn dispatch(
        &self,
        address: &str,
        content: &MessageContent,
    ) -> Result<DispatchReceipt, DispatchError> {
        let message_id = self.next_message_id();

        let from = self
            .from
            .parse()
            .map_err(|e| DispatchError::InvalidConfig(format!("email from address: {e}")))?;
        let to = address
            .parse()
            .map_err(|e| DispatchError::InvalidAddress(format!("{address}: {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(&content.subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN)
            .body(content.body.clone())
            .map_err(|e| DispatchError::InvalidAddress(format!("{address}: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DispatchError::TransientProvider(format!("smtp relay: {e}")))?;

        tracing::debug!(to = %address, message_id = %message_id, "Email handed to SMTP relay");
        Ok(DispatchReceipt {
            provider_message_id: message_id,
        })
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}

// Plugin

#[derive(Deserialize)]
struct EmailConfig {
    smtp_host: String,
    smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    from: String,
    message_id_domain: String,
}

pub struct EmailPlugin;

impl DispatcherPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn validate_config(&self, config: &Value) -> Result<(), DispatchError> {
        serde_json::from_value::<EmailConfig>(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("email: {e}")))?;
        Ok(())
    }

    fn create_dispatcher(
        &self,
        config: &Value,
    ) -> Result<Box<dyn ChannelDispatcher>, DispatchError> {
        let cfg: EmailConfig = serde_json::from_value(config.clone())
            .map_err(|e| DispatchError::InvalidConfig(format!("email: {e}")))?;
        let dispatcher = EmailDispatcher::new(
            &cfg.smtp_host,
            cfg.smtp_port,
            cfg.smtp_username.as_deref(),
            cfg.smtp_password.as_deref(),
            &cfg.from,
            &cfg.message_id_domain,
        )?;
        Ok(Box::new(dispatcher))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("smtp_password") {
                obj.insert(
                    "smtp_password".to_string(),
                    Value::String("***".to_string()),
                );
            }
        }
        redacted
    }
}
