use crate::{ChannelDispatcher, DispatchError};
use seawarn_common::types::Channel;
use serde_json::Value;
use std::collections::HashMap;

/// Factory for creating [`ChannelDispatcher`] instances from JSON
/// configuration.
///
/// Each plugin is registered in the [`DispatcherRegistry`] by its
/// `name()`. When the server initializes the dispatcher set, the registry
/// validates and instantiates dispatchers through the matching plugin.
pub trait DispatcherPlugin: Send + Sync {
    /// Returns the plugin type name (e.g., `"sms"`, `"whatsapp"`).
    fn name(&self) -> &str;

    /// The channel this plugin's dispatchers serve.
    fn channel(&self) -> Channel;

    /// Validates a JSON config blob against this plugin's expected schema.
    fn validate_config(&self, config: &Value) -> Result<(), DispatchError>;

    /// Creates a configured dispatcher from a validated JSON config.
    fn create_dispatcher(&self, config: &Value) -> Result<Box<dyn ChannelDispatcher>, DispatchError>;

    /// Returns a copy of `config` with secrets redacted (e.g., API keys
    /// replaced with `"***"`). Used for API responses and logs.
    fn redact_config(&self, config: &Value) -> Value {
        config.clone()
    }
}

/// Registry of available [`DispatcherPlugin`]s, used to instantiate
/// dispatchers from configuration.
///
/// # Examples
///
/// ```
/// use seawarn_dispatch::plugin::DispatcherRegistry;
///
/// let registry = DispatcherRegistry::default();
/// assert!(registry.has_plugin("sms"));
/// assert!(registry.has_plugin("voice"));
/// assert!(registry.has_plugin("whatsapp"));
/// assert!(registry.has_plugin("email"));
/// assert!(!registry.has_plugin("nonexistent"));
/// ```
pub struct DispatcherRegistry {
    plugins: HashMap<String, Box<dyn DispatcherPlugin>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn DispatcherPlugin>) {
        let name = plugin.name().to_string();
        self.plugins.insert(name, plugin);
    }

    pub fn create_dispatcher(
        &self,
        type_name: &str,
        config: &Value,
    ) -> Result<Box<dyn ChannelDispatcher>, DispatchError> {
        let plugin = self.plugins.get(type_name).ok_or_else(|| {
            DispatchError::InvalidConfig(format!("unknown dispatcher plugin type: {type_name}"))
        })?;
        plugin.validate_config(config)?;
        plugin.create_dispatcher(config)
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn DispatcherPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for DispatcherRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::channels::sms::SmsPlugin));
        registry.register(Box::new(crate::channels::voice::VoicePlugin));
        registry.register(Box::new(crate::channels::whatsapp::WhatsappPlugin));
        registry.register(Box::new(crate::channels::email::EmailPlugin));
        registry
    }
}
