//! Serde types for Instagram Messaging webhook payloads.
//!
//! Meta sends more fields than the bot cares about and omits others per
//! event type, so every field defaults and unknown keys are ignored.

use serde::Deserialize;

/// Top-level body of a webhook `POST`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One business account's batch of messaging events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    /// The business account id. Events whose sender carries this id were
    /// sent by the business side, not by an end user.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// A single sender-to-recipient event inside an entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Party,
    #[serde(default)]
    pub recipient: Party,
    #[serde(default)]
    pub timestamp: i64,
    /// Absent for delivery receipts, reactions, and other non-message
    /// events.
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Party {
    #[serde(default)]
    pub id: String,
}

/// Message content of an event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// True when the provider is replaying a message the business side sent.
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    /// Attachment type as sent by Meta: `audio`, `image`, `video`, `share`.
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: AttachmentPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentPayload {
    /// Signed CDN link; expires shortly after delivery.
    #[serde(default)]
    pub url: Option<String>,
}
