//! Instagram Messaging channel: webhook intake and Graph API outbound.
//!
//! Inbound, this crate turns raw Meta webhook payloads into routed work:
//! signature and subscription verification, payload types, and the
//! [`IngressRouter`] that tells business-side echoes apart from end-user
//! messages and feeds the latter to the turn coalescer. Outbound, the
//! [`InstagramClient`] wraps the `me/messages` send API and attachment
//! downloads.

mod error;
mod router;
mod send;
mod types;
mod webhook;

pub use {
    error::{Error, Result},
    router::{DiscardReason, InboundEvent, IngressRouter, classify},
    send::{InstagramClient, MAX_MESSAGE_CHARS},
    types::{
        Attachment, AttachmentPayload, Entry, EventMessage, MessagingEvent, Party, WebhookPayload,
    },
    webhook::{verify_signature, verify_webhook_subscription},
};
