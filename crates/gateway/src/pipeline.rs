//! The flush path: what happens to a turn after the coalescer closes it.
//!
//! Audio fragments are resolved to text first, at flush time, so one burst
//! costs one batch of downloads. Then the agent loop runs: the model either
//! answers or asks for a lead registration, and registrations are executed
//! and replayed back until it answers. The reply leaves through the Graph
//! API, spoken instead of written when the user sent audio and synthesis is
//! available.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use {
    garupa_agent::{
        AgentAction, ConversationAgent, EffectResult, HistoryEntry, LeadRegistrar,
        MAX_AGENT_ROUNDS,
    },
    garupa_coalesce::{BoxError, CoalescedTurn, Fragment, TurnSink},
    garupa_common::text::{id_suffix, truncate_chars},
    garupa_handoff::HandoffStore,
    garupa_instagram::{InstagramClient, MAX_MESSAGE_CHARS},
    garupa_voice::{
        AudioReplyStore, SpeechSynthesizer, Transcriber, attachment_file_name, trim_for_speech,
    },
};

/// Most recent messages kept per conversation as model context.
const HISTORY_LIMIT: usize = 20;

/// Sent when a turn was audio only and nothing could be transcribed.
const TRANSCRIPTION_FALLBACK: &str =
    "Recebi seu audio, mas nao consegui transcrever agora. Pode enviar em texto?";

/// In-process conversation memory: the last few exchanges per conversation,
/// fed to the model as context. A restart starts blank; only buffers, locks,
/// and leads are durable.
#[derive(Default)]
struct ConversationHistory {
    entries: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl ConversationHistory {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, VecDeque<HistoryEntry>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self, conversation_id: &str) -> Vec<HistoryEntry> {
        self.lock_entries()
            .get(conversation_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, conversation_id: &str, user_text: &str, reply: &str) {
        let mut map = self.lock_entries();
        let entries = map.entry(conversation_id.to_string()).or_default();
        entries.push_back(HistoryEntry::user(user_text));
        entries.push_back(HistoryEntry::assistant(reply));
        while entries.len() > HISTORY_LIMIT {
            entries.pop_front();
        }
    }
}

/// The sink behind the coalescer. One instance serves every conversation;
/// per-conversation ordering comes from the coalescer's gates.
pub struct TurnPipeline {
    agent: Arc<dyn ConversationAgent>,
    registrar: Arc<dyn LeadRegistrar>,
    instagram: InstagramClient,
    handoff: Arc<dyn HandoffStore>,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    media: AudioReplyStore,
    history: ConversationHistory,
    /// Base URL reply audio is hosted under; audio replies stay off without
    /// it even when enabled.
    public_base_url: Option<String>,
    audio_replies_enabled: bool,
}

impl TurnPipeline {
    #[must_use]
    pub fn new(
        agent: Arc<dyn ConversationAgent>,
        registrar: Arc<dyn LeadRegistrar>,
        instagram: InstagramClient,
        handoff: Arc<dyn HandoffStore>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        media: AudioReplyStore,
    ) -> Self {
        Self {
            agent,
            registrar,
            instagram,
            handoff,
            transcriber,
            synthesizer,
            media,
            history: ConversationHistory::default(),
            public_base_url: None,
            audio_replies_enabled: false,
        }
    }

    /// Turn on spoken replies for turns that contained audio.
    #[must_use]
    pub fn with_voice_replies(mut self, public_base_url: Option<String>) -> Self {
        self.audio_replies_enabled = true;
        self.public_base_url = public_base_url;
        self
    }

    async fn handle_turn(&self, turn: CoalescedTurn) -> anyhow::Result<()> {
        let conversation_id = turn.conversation_id.clone();
        let had_audio = turn.has_audio();

        let Some(turn_text) = self.resolve_turn_text(&turn).await else {
            if had_audio {
                // Nothing transcribed. Asking for text beats silence.
                self.deliver_text(&conversation_id, TRANSCRIPTION_FALLBACK)
                    .await?;
            }
            return Ok(());
        };

        let reply = self.run_agent(&conversation_id, &turn_text).await?;
        // Meta delivers (and later echoes) the truncated text, so everything
        // downstream of this point works with the truncation.
        let reply = truncate_chars(&reply, MAX_MESSAGE_CHARS);

        let spoke = had_audio && self.try_voice_reply(&conversation_id, reply).await;
        if !spoke {
            self.deliver_text(&conversation_id, reply).await?;
        }

        self.history.record(&conversation_id, &turn_text, reply);
        Ok(())
    }

    /// Resolve the turn's fragments to its combined text. Audio attachments
    /// are fetched and transcribed here; a fragment that cannot be resolved
    /// is dropped rather than sinking the rest of the turn. Returns `None`
    /// when nothing resolved to text.
    async fn resolve_turn_text(&self, turn: &CoalescedTurn) -> Option<String> {
        let mut parts = Vec::with_capacity(turn.fragments.len());
        for fragment in &turn.fragments {
            match fragment {
                Fragment::Text(text) => parts.push(text.clone()),
                Fragment::AudioUrl(url) => match self.transcribe_attachment(url).await {
                    Ok(text) if !text.trim().is_empty() => parts.push(text),
                    Ok(_) => {
                        debug!(
                            conversation = id_suffix(&turn.conversation_id),
                            "attachment transcribed to nothing, skipped"
                        );
                    },
                    Err(e) => {
                        warn!(
                            conversation = id_suffix(&turn.conversation_id),
                            error = %e,
                            "dropping audio fragment that failed to transcribe"
                        );
                    },
                },
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    async fn transcribe_attachment(&self, url: &str) -> anyhow::Result<String> {
        if !self.transcriber.is_configured() {
            bail!("no transcription provider configured");
        }
        let audio = self.instagram.fetch_media(url).await?;
        let file_name = attachment_file_name(url);
        self.transcriber.transcribe(audio, &file_name).await
    }

    /// The model loop: up to [`MAX_AGENT_ROUNDS`] rounds, executing each
    /// requested lead registration and replaying its indicator, until the
    /// model settles on a reply.
    async fn run_agent(&self, conversation_id: &str, turn_text: &str) -> anyhow::Result<String> {
        let history = self.history.snapshot(conversation_id);
        let mut effects = Vec::new();

        for _ in 0..MAX_AGENT_ROUNDS {
            let action = self
                .agent
                .invoke(&history, turn_text, &effects)
                .await
                .context("conversation agent failed")?;
            match action {
                AgentAction::Reply(text) => return Ok(text),
                AgentAction::RegisterLead(submission) => {
                    let indicator = self.registrar.register(conversation_id, &submission).await;
                    effects.push(EffectResult {
                        submission,
                        indicator,
                    });
                },
            }
        }
        bail!("agent requested effects for {MAX_AGENT_ROUNDS} rounds without replying")
    }

    /// Try to answer with synthesized speech. Returns whether audio went
    /// out; any failure leaves the text path to deliver instead.
    async fn try_voice_reply(&self, conversation_id: &str, reply: &str) -> bool {
        if !self.audio_replies_enabled || !self.synthesizer.is_configured() {
            return false;
        }
        let Some(base) = &self.public_base_url else {
            debug!("audio replies enabled without a public base URL, replying in text");
            return false;
        };

        let speech = trim_for_speech(reply);
        let audio = match self.synthesizer.synthesize(&speech).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "speech synthesis failed, falling back to text");
                return false;
            },
        };
        let file_name = match self.media.put(audio).await {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "failed to store reply audio, falling back to text");
                return false;
            },
        };

        let url = format!("{}/media/audio/{file_name}", base.trim_end_matches('/'));
        match self.instagram.send_audio(conversation_id, &url).await {
            Ok(()) => {
                info!(
                    conversation = id_suffix(conversation_id),
                    "voice reply delivered"
                );
                true
            },
            Err(e) => {
                warn!(
                    conversation = id_suffix(conversation_id),
                    error = %e,
                    "audio send failed, falling back to text"
                );
                false
            },
        }
    }

    async fn deliver_text(&self, conversation_id: &str, text: &str) -> anyhow::Result<()> {
        self.instagram
            .send_text(conversation_id, text)
            .await
            .context("reply send failed")?;

        let sent = truncate_chars(text, MAX_MESSAGE_CHARS);
        if let Err(e) = self.handoff.note_outbound_reply(conversation_id, sent).await {
            // Without the marker this reply's echo will read as operator
            // activity and pause the bot for the lock TTL.
            warn!(
                conversation = id_suffix(conversation_id),
                error = %e,
                "failed to record outbound echo marker"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl TurnSink for TurnPipeline {
    async fn deliver(&self, turn: CoalescedTurn) -> Result<(), BoxError> {
        self.handle_turn(turn).await.map_err(Into::into)
    }
}
