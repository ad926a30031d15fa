//! The conversational sales agent and its lead-registration side effect.
//!
//! The flush path hands the agent one coalesced turn at a time. The agent
//! either produces final reply text or asks for the lead-registration side
//! effect; the caller executes it, feeds the indicator string back in, and
//! invokes again, bounded by [`MAX_AGENT_ROUNDS`]. Registration itself is
//! guarded by a persisted notify-once transition so a lead is announced to
//! the sales team exactly once per conversation.

use async_trait::async_trait;

mod error;
mod lead;
mod memory;
mod openai;
mod prompt;
mod registrar;
mod sqlite;

pub use {
    error::{Error, Result},
    lead::{Lead, LeadError, LeadSubmission},
    memory::MemoryLeadStore,
    openai::OpenAiAgent,
    registrar::{
        FAILURE_INDICATOR, LeadNotifier, LeadRegistrar, NotifyOnceRegistrar, SUCCESS_INDICATOR,
    },
    sqlite::SqliteLeadStore,
};

/// Upper bound on model rounds per flush. One round answers most turns; a
/// second covers the registration round trip; the third is slack for the
/// model acknowledging a failed registration.
pub const MAX_AGENT_ROUNDS: usize = 3;

/// Who said a past message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One past message of the conversation, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

impl HistoryEntry {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            text: text.into(),
        }
    }
}

/// A completed lead-registration round trip, replayed to the model on the
/// next round so it can react to the indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectResult {
    pub submission: LeadSubmission,
    pub indicator: String,
}

/// What the model decided to do with a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    /// Final reply text for the user.
    Reply(String),
    /// Request to run the lead-registration side effect.
    RegisterLead(LeadSubmission),
}

/// The conversational model behind the flush path. Injected as a trait
/// object so tests can script its behavior.
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    async fn invoke(
        &self,
        history: &[HistoryEntry],
        turn_text: &str,
        effects: &[EffectResult],
    ) -> Result<AgentAction>;
}

/// A lead together with its notification status.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLead {
    pub lead: Lead,
    pub notified: bool,
}

/// Durable storage for captured leads, keyed by conversation.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert or refresh the lead for a conversation. A refresh never
    /// resets `notified`.
    async fn upsert(&self, conversation_id: &str, lead: &Lead) -> Result<()>;

    /// Claim the one notification for this conversation. Returns `true`
    /// exactly once; every later call returns `false`.
    async fn begin_notification(&self, conversation_id: &str) -> Result<bool>;

    /// Fetch the stored lead, if any.
    async fn get(&self, conversation_id: &str) -> Result<Option<StoredLead>>;
}
