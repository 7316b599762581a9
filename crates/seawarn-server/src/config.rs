use seawarn_ratelimit::GuardConfig;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Upper bound on a single provider dispatch call.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: GuardConfig,
    #[serde(default)]
    pub webhooks: WebhookSecrets,
    /// Outbound providers, instantiated through the dispatcher plugin
    /// registry. A channel with no entry here is unconfigured.
    #[serde(default)]
    pub dispatchers: Vec<DispatcherConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Random secret is generated (and logged as a warning) when unset.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_expire_secs")]
    pub token_expire_secs: u64,
    /// How long a requested verification code stays valid.
    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expire_secs: default_token_expire_secs(),
            otp_ttl_secs: default_otp_ttl_secs(),
        }
    }
}

/// Per-provider webhook signing secrets. A missing secret puts that
/// provider's endpoint in degraded mode: events are accepted and every
/// request is logged as unverified.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookSecrets {
    #[serde(default)]
    pub sms_gateway: Option<String>,
    #[serde(default)]
    pub voice_gateway: Option<String>,
    #[serde(default)]
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Plugin type name: `sms`, `voice`, `whatsapp`, or `email`.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "default_dispatcher_enabled")]
    pub enabled: bool,
    pub config: Value,
}

fn default_http_port() -> u16 {
    8080
}

fn default_db_url() -> String {
    "sqlite://data/seawarn.db?mode=rwc".to_string()
}

fn default_dispatch_timeout_secs() -> u64 {
    15
}

fn default_token_expire_secs() -> u64 {
    86400
}

fn default_otp_ttl_secs() -> u64 {
    300
}

fn default_dispatcher_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_url: default_db_url(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            auth: AuthConfig::default(),
            rate_limit: GuardConfig::default(),
            webhooks: WebhookSecrets::default(),
            dispatchers: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
