//! Human-takeover suppression for automated conversations.
//!
//! When a human operator answers from the inbox UI, the provider replays
//! their message to the webhook as an echo. Observing one engages an
//! *interaction lock* for that conversation: a TTL-bounded record whose
//! presence silences the bot, so the operator and the agent never talk over
//! each other. The bot's own deliveries also come back as echoes; those are
//! told apart through short-lived outbound markers and never engage the lock.

use std::time::Duration;

use {
    async_trait::async_trait,
    sha2::{Digest, Sha256},
};

mod error;
mod memory;
mod sqlite;

pub use {
    error::{Error, Result},
    memory::MemoryHandoffStore,
    sqlite::SqliteHandoffStore,
};

/// How long a human takeover suppresses the bot.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

/// How long an outbound reply is recognizable as the bot's own echo.
pub const DEFAULT_ECHO_MARKER_TTL: Duration = Duration::from_secs(120);

/// Result of [`HandoffStore::mark_operator_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A new lock was created for the conversation.
    Engaged,
    /// An unexpired lock already existed; its TTL is left untouched.
    AlreadyEngaged,
}

/// Durable interaction-lock state, keyed by conversation identifier.
///
/// Storage failures must propagate: callers treat an unknown lock state as
/// "do not respond", never as "not blocked".
#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Engage the lock unless an unexpired one already exists. Re-observing
    /// an operator while active does not extend the TTL.
    async fn mark_operator_active(&self, conversation_id: &str) -> Result<MarkOutcome>;

    /// Whether an unexpired lock exists for the conversation.
    async fn is_active(&self, conversation_id: &str) -> Result<bool>;

    /// Drop the lock unconditionally. Returns whether one existed.
    async fn release(&self, conversation_id: &str) -> Result<bool>;

    /// Time left on the active lock, if any.
    async fn remaining(&self, conversation_id: &str) -> Result<Option<Duration>>;

    /// Record that the bot just delivered `text` to this conversation, so the
    /// provider's echo of it can be recognized and ignored.
    async fn note_outbound_reply(&self, conversation_id: &str, text: &str) -> Result<()>;

    /// Consume a pending outbound marker matching `text`. Returns true when
    /// the echo was the bot's own; each marker matches at most once.
    async fn consume_own_echo(&self, conversation_id: &str, text: &str) -> Result<bool>;
}

/// Digest used to pair an outbound reply with its later echo. Whitespace at
/// the edges is ignored because the provider trims delivered text.
#[must_use]
pub fn echo_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hex::encode(hasher.finalize())
}
