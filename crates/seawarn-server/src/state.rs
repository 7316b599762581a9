use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use seawarn_dispatch::plugin::DispatcherRegistry;
use seawarn_dispatch::DispatcherSet;
use seawarn_escalation::EscalationEngine;
use seawarn_ledger::providers::{EmailNormalizer, SmsGatewayNormalizer, WhatsappNormalizer};
use seawarn_ledger::{LedgerService, WebhookNormalizer};
use seawarn_common::types::Channel;
use seawarn_ratelimit::RateLimitGuard;
use seawarn_storage::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A pending verification code for one address.
#[derive(Debug, Clone)]
pub struct OtpEntry {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<EscalationEngine>,
    pub ledger: Arc<LedgerService<Store>>,
    pub dispatchers: DispatcherSet,
    pub normalizers: Arc<HashMap<&'static str, Arc<dyn WebhookNormalizer>>>,
    pub guard: Arc<RateLimitGuard>,
    pub otp_codes: Arc<Mutex<HashMap<String, OtpEntry>>>,
    pub jwt_secret: Arc<String>,
    pub token_expire_secs: u64,
    pub otp_ttl_secs: u64,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

/// Instantiates configured dispatchers through the plugin registry.
/// A bad entry disables that channel and is logged; it never takes the
/// server down.
pub fn build_dispatchers(config: &ServerConfig) -> DispatcherSet {
    let registry = DispatcherRegistry::default();
    let mut set = DispatcherSet::new();
    for entry in &config.dispatchers {
        if !entry.enabled {
            tracing::info!(plugin = %entry.type_name, "Dispatcher disabled in config");
            continue;
        }
        match registry.create_dispatcher(&entry.type_name, &entry.config) {
            Ok(dispatcher) => {
                tracing::info!(
                    plugin = %entry.type_name,
                    channel = %dispatcher.channel(),
                    "Dispatcher configured"
                );
                set.insert(dispatcher.into());
            }
            Err(e) => {
                tracing::error!(plugin = %entry.type_name, error = %e, "Dispatcher config rejected");
            }
        }
    }
    set
}

/// One normalizer per provider callback route.
pub fn build_normalizers(
    config: &ServerConfig,
) -> HashMap<&'static str, Arc<dyn WebhookNormalizer>> {
    let mut map: HashMap<&'static str, Arc<dyn WebhookNormalizer>> = HashMap::new();
    map.insert(
        "sms_gateway",
        Arc::new(SmsGatewayNormalizer::new(
            Channel::Sms,
            config.webhooks.sms_gateway.clone(),
        )),
    );
    map.insert(
        "voice_gateway",
        Arc::new(SmsGatewayNormalizer::new(
            Channel::Voice,
            config.webhooks.voice_gateway.clone(),
        )),
    );
    map.insert(
        "whatsapp",
        Arc::new(WhatsappNormalizer::new(config.webhooks.whatsapp.clone())),
    );
    map.insert(
        "email",
        Arc::new(EmailNormalizer::new(config.webhooks.email.clone())),
    );
    map
}

impl AppState {
    /// Wires the full application state from config and an open store.
    pub fn build(config: ServerConfig, store: Arc<Store>) -> Self {
        let dispatchers = build_dispatchers(&config);
        let engine = Arc::new(EscalationEngine::new(
            Arc::clone(&store),
            dispatchers.clone(),
            Duration::from_secs(config.dispatch_timeout_secs),
        ));
        let ledger = Arc::new(LedgerService::new(Arc::clone(&store)));
        let normalizers = Arc::new(build_normalizers(&config));
        let guard = Arc::new(RateLimitGuard::new(config.rate_limit.clone()));

        let jwt_secret = match &config.auth.jwt_secret {
            Some(secret) => Arc::new(secret.clone()),
            None => {
                tracing::warn!(
                    "No jwt_secret configured. A random secret was generated and will change on restart. Set [auth].jwt_secret in config for production use."
                );
                Arc::new(crate::auth::random_secret())
            }
        };

        Self {
            store,
            engine,
            ledger,
            dispatchers,
            normalizers,
            guard,
            otp_codes: Arc::new(Mutex::new(HashMap::new())),
            jwt_secret,
            token_expire_secs: config.auth.token_expire_secs,
            otp_ttl_secs: config.auth.otp_ttl_secs,
            start_time: Utc::now(),
            config: Arc::new(config),
        }
    }
}
