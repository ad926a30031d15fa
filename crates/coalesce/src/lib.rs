//! Turn coalescing for bursty chat input.
//!
//! Instagram users send one thought across several quick messages. Replying
//! to each one separately produces a bot that interrupts. This crate buffers
//! inbound fragments per conversation and closes the *turn* only after a
//! quiet period with no new fragment, delivering the whole burst downstream
//! exactly once.
//!
//! The buffer and its flush deadline are durable: a restart between a
//! fragment and its deadline re-arms the timer from storage instead of
//! stranding the turn.

use async_trait::async_trait;

mod coalescer;
mod error;
mod sqlite;
mod store;

pub use {
    coalescer::TurnCoalescer,
    error::{Error, Result},
    sqlite::SqliteTurnStore,
    store::{MemoryTurnStore, PendingBuffer, TurnStore},
};

/// Default quiet period: how long a conversation must stay silent before its
/// buffered fragments become one turn.
pub const DEFAULT_QUIET_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

/// One buffered message from a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Plain message text.
    Text(String),
    /// An audio attachment, kept as its URL and resolved to text out of band
    /// at flush time.
    AudioUrl(String),
}

impl Fragment {
    /// Storage tag for the fragment variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::AudioUrl(_) => "audio",
        }
    }

    /// The stored payload: message text or attachment URL.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::AudioUrl(u) => u,
        }
    }

    /// Rebuild a fragment from its stored parts.
    #[must_use]
    pub fn from_parts(kind: &str, body: String) -> Option<Self> {
        match kind {
            "text" => Some(Self::Text(body)),
            "audio" => Some(Self::AudioUrl(body)),
            _ => None,
        }
    }
}

/// A closed turn: every fragment buffered for one conversation, in arrival
/// order, handed downstream exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedTurn {
    pub conversation_id: String,
    pub fragments: Vec<Fragment>,
}

impl CoalescedTurn {
    /// Fragment bodies joined with newlines, the turn's combined text when no
    /// out-of-band resolution is needed.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.fragments
            .iter()
            .map(Fragment::body)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether any fragment still needs transcription.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.fragments
            .iter()
            .any(|f| matches!(f, Fragment::AudioUrl(_)))
    }
}

/// Errors crossing the flush boundary; the coalescer logs them and moves on.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Downstream consumer of closed turns.
///
/// `deliver` is called at most once per flushed fragment set. By the time it
/// runs the buffer is already cleared, so a failure loses the turn rather
/// than replaying it later against a moved-on conversation.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn deliver(&self, turn: CoalescedTurn) -> std::result::Result<(), BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_parts_round_trip() {
        let text = Fragment::Text("oi".into());
        assert_eq!(
            Fragment::from_parts(text.kind(), text.body().to_owned()),
            Some(text)
        );

        let audio = Fragment::AudioUrl("https://cdn.example.com/a.m4a".into());
        assert_eq!(
            Fragment::from_parts(audio.kind(), audio.body().to_owned()),
            Some(audio)
        );

        assert_eq!(Fragment::from_parts("video", String::new()), None);
    }

    #[test]
    fn joined_text_preserves_arrival_order() {
        let turn = CoalescedTurn {
            conversation_id: "u1".into(),
            fragments: vec![
                Fragment::Text("oi".into()),
                Fragment::Text("quero saber de motos".into()),
            ],
        };
        assert_eq!(turn.joined_text(), "oi\nquero saber de motos");
        assert!(!turn.has_audio());
    }
}
