use crate::channels::classify_status;
use crate::plugin::DispatcherRegistry;
use crate::{DispatchError, DispatcherSet};
use reqwest::StatusCode;
use seawarn_common::types::Channel;
use serde_json::json;

#[test]
fn test_registry_has_default_plugins() {
    let registry = DispatcherRegistry::default();
    assert!(registry.has_plugin("sms"));
    assert!(registry.has_plugin("voice"));
    assert!(registry.has_plugin("whatsapp"));
    assert!(registry.has_plugin("email"));
    assert!(!registry.has_plugin("pager"));

    let mut names = registry.plugin_names();
    names.sort();
    assert_eq!(names, vec!["email", "sms", "voice", "whatsapp"]);
}

#[test]
fn test_sms_config_validation() {
    let registry = DispatcherRegistry::default();
    let plugin = registry.get_plugin("sms").unwrap();

    let valid = json!({
        "gateway_url": "https://gw.example.com/sms",
        "api_key": "k-123",
        "sender_id": "SEAWARN",
    });
    assert!(plugin.validate_config(&valid).is_ok());

    let missing_key = json!({
        "gateway_url": "https://gw.example.com/sms",
        "sender_id": "SEAWARN",
    });
    let err = plugin.validate_config(&missing_key).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConfig(_)));
}

#[test]
fn test_whatsapp_config_validation() {
    let registry = DispatcherRegistry::default();
    let plugin = registry.get_plugin("whatsapp").unwrap();

    let valid = json!({
        "api_url": "https://graph.example.com/v19.0/123/messages",
        "access_token": "t-456",
    });
    assert!(plugin.validate_config(&valid).is_ok());
    assert!(plugin.validate_config(&json!({"api_url": "x"})).is_err());
}

#[test]
fn test_email_config_validation() {
    let registry = DispatcherRegistry::default();
    let plugin = registry.get_plugin("email").unwrap();

    let valid = json!({
        "smtp_host": "smtp.example.com",
        "smtp_port": 587,
        "smtp_username": "alerts",
        "smtp_password": "secret",
        "from": "alerts@example.com",
        "message_id_domain": "example.com",
    });
    assert!(plugin.validate_config(&valid).is_ok());

    // Credentials are optional for unauthenticated relays.
    let no_auth = json!({
        "smtp_host": "smtp.example.com",
        "smtp_port": 25,
        "from": "alerts@example.com",
        "message_id_domain": "example.com",
    });
    assert!(plugin.validate_config(&no_auth).is_ok());
}

#[test]
fn test_redact_config_masks_secrets() {
    let registry = DispatcherRegistry::default();

    let sms = registry.get_plugin("sms").unwrap();
    let redacted = sms.redact_config(&json!({
        "gateway_url": "https://gw.example.com/sms",
        "api_key": "k-123",
        "sender_id": "SEAWARN",
    }));
    assert_eq!(redacted["api_key"], "***");
    assert_eq!(redacted["gateway_url"], "https://gw.example.com/sms");

    let email = registry.get_plugin("email").unwrap();
    let redacted = email.redact_config(&json!({
        "smtp_host": "smtp.example.com",
        "smtp_password": "secret",
    }));
    assert_eq!(redacted["smtp_password"], "***");

    let whatsapp = registry.get_plugin("whatsapp").unwrap();
    let redacted = whatsapp.redact_config(&json!({"access_token": "t-456"}));
    assert_eq!(redacted["access_token"], "***");
}

#[test]
fn test_create_dispatcher_unknown_plugin() {
    let registry = DispatcherRegistry::default();
    let Err(err) = registry.create_dispatcher("pager", &json!({})) else {
        panic!("unknown plugin type must not produce a dispatcher");
    };
    assert!(err.to_string().contains("pager"));
}

#[test]
fn test_classify_status_taxonomy() {
    let transient = classify_status("sms gateway", StatusCode::TOO_MANY_REQUESTS, "+15550001");
    assert!(transient.is_transient());

    let transient = classify_status("sms gateway", StatusCode::BAD_GATEWAY, "+15550001");
    assert!(transient.is_transient());

    let permanent = classify_status("sms gateway", StatusCode::BAD_REQUEST, "+15550001");
    assert!(!permanent.is_transient());
    assert!(matches!(permanent, DispatchError::InvalidAddress(_)));
}

#[test]
fn test_dispatcher_set_lookup() {
    let registry = DispatcherRegistry::default();
    let sms = registry
        .create_dispatcher(
            "sms",
            &json!({
                "gateway_url": "https://gw.example.com/sms",
                "api_key": "k-123",
                "sender_id": "SEAWARN",
            }),
        )
        .unwrap();

    let mut set = DispatcherSet::new();
    assert!(set.is_empty());
    set.insert(sms.into());

    assert!(set.get(Channel::Sms).is_some());
    assert!(set.get(Channel::Voice).is_none());
    assert_eq!(set.configured_channels(), vec![Channel::Sms]);
}
