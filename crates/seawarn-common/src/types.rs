use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use seawarn_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "moderate" => Ok(Severity::Moderate),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Outbound notification channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Voice,
    Whatsapp,
    Email,
}

impl Channel {
    /// All channels, in the default preference order used when a contact
    /// has not configured one.
    pub const ALL: [Channel; 4] = [
        Channel::Sms,
        Channel::Voice,
        Channel::Whatsapp,
        Channel::Email,
    ];
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Voice => write!(f, "voice"),
            Channel::Whatsapp => write!(f, "whatsapp"),
            Channel::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sms" => Ok(Channel::Sms),
            "voice" => Ok(Channel::Voice),
            "whatsapp" => Ok(Channel::Whatsapp),
            "email" => Ok(Channel::Email),
            _ => Err(format!("unknown channel: {s}")),
        }
    }
}

/// Alert lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Sent,
    Acknowledged,
    Resolved,
    Expired,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Pending => write!(f, "pending"),
            AlertStatus::Sent => write!(f, "sent"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AlertStatus::Pending),
            "sent" => Ok(AlertStatus::Sent),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            "expired" => Ok(AlertStatus::Expired),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// Canonical delivery status of one outbound attempt.
///
/// Forward transitions only move along
/// `queued -> sent -> delivered -> read -> acknowledged`, with `failed`
/// and `bounced` as terminal side exits from any non-terminal state.
/// `rank()` orders the forward lifecycle so updates can be applied as
/// monotonic joins rather than overwrites.
///
/// # Examples
///
/// ```
/// use seawarn_common::types::DeliveryStatus;
///
/// assert!(DeliveryStatus::Delivered.rank() > DeliveryStatus::Sent.rank());
/// assert!(DeliveryStatus::Failed.is_terminal());
/// assert!(!DeliveryStatus::Read.is_terminal());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Acknowledged,
    Failed,
    Bounced,
}

impl DeliveryStatus {
    /// Position in the forward lifecycle. `Failed`/`Bounced` are side
    /// exits, not part of the forward ordering.
    pub fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::Queued => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered => 2,
            DeliveryStatus::Read => 3,
            DeliveryStatus::Acknowledged => 4,
            DeliveryStatus::Failed | DeliveryStatus::Bounced => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Acknowledged | DeliveryStatus::Failed | DeliveryStatus::Bounced
        )
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Read => write!(f, "read"),
            DeliveryStatus::Acknowledged => write!(f, "acknowledged"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Bounced => write!(f, "bounced"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(DeliveryStatus::Queued),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            "acknowledged" => Ok(DeliveryStatus::Acknowledged),
            "failed" => Ok(DeliveryStatus::Failed),
            "bounced" => Ok(DeliveryStatus::Bounced),
            _ => Err(format!("unknown delivery status: {s}")),
        }
    }
}

/// Provider-agnostic delivery event kind, produced by webhook normalizers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sent,
    Delivered,
    Read,
    Failed,
    Bounced,
    /// Provider event the normalizer does not map to a canonical
    /// transition (e.g. click tracking). Stored in attempt metadata,
    /// never changes status.
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Sent => write!(f, "sent"),
            EventKind::Delivered => write!(f, "delivered"),
            EventKind::Read => write!(f, "read"),
            EventKind::Failed => write!(f, "failed"),
            EventKind::Bounced => write!(f, "bounced"),
            EventKind::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Error detail carried by a failure/bounce event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub code: Option<String>,
    pub message: String,
}

/// A normalized, provider-agnostic delivery status change.
///
/// The provider message ID is the only correlation key between a
/// webhook callback and a ledger entry; it is scoped per channel when
/// looked up, since opaque ID spaces may collide across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub provider_message_id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub error: Option<EventError>,
    /// Channel-specific extras (e.g. click URL) preserved in metadata.
    pub extra: Option<serde_json::Value>,
}

impl CanonicalEvent {
    pub fn new(provider_message_id: impl Into<String>, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
            kind,
            timestamp,
            error: None,
            extra: None,
        }
    }
}

/// Rendered message content handed to a channel dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    /// Short headline (email subject, first SMS line).
    pub subject: String,
    /// Full body text.
    pub body: String,
}
