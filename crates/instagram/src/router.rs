//! Ingress routing: decide what each webhook event means before any storage
//! is touched, then act on it.
//!
//! Business-side events (operator replies and the bot's own echoes) manage
//! the interaction lock and never reach the coalescer. End-user fragments
//! are buffered unless the conversation is under human control. Routing one
//! conversation never blocks another; per-conversation ordering comes from
//! the coalescer's gates.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use {
    garupa_coalesce::{Fragment, TurnCoalescer},
    garupa_common::text::id_suffix,
    garupa_handoff::{HandoffStore, MarkOutcome},
};

use crate::types::{MessagingEvent, WebhookPayload};

/// What one messaging event means for routing. Produced by [`classify`]
/// without consulting any store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Sent by the business side: an echo, or a message whose sender is the
    /// business account itself. The conversation id is the end-user thread
    /// it went to.
    Business {
        conversation_id: String,
        text: Option<String>,
    },
    /// End-user content to buffer, in payload order.
    User {
        conversation_id: String,
        fragments: Vec<Fragment>,
    },
    /// Nothing for the bot.
    Discarded { reason: DiscardReason },
}

/// Why an event produced no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Delivery receipt, reaction, or another event without a `message`.
    NoMessage,
    /// A message with neither usable text nor a usable attachment.
    EmptyContent,
    /// Conversation ids must be non-empty ASCII digits.
    MalformedId,
    /// Only attachments the bot does not handle (image, video, share).
    UnsupportedAttachments,
}

fn is_plausible_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

fn trimmed_text(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Classify one messaging event against the entry's business account id.
#[must_use]
pub fn classify(entry_id: &str, event: &MessagingEvent) -> InboundEvent {
    let Some(message) = &event.message else {
        return InboundEvent::Discarded {
            reason: DiscardReason::NoMessage,
        };
    };

    let business = message.is_echo || event.sender.id == entry_id;
    // For business events the sender is the account itself; the end-user
    // thread is whoever received the message.
    let conversation_id = if business {
        event.recipient.id.clone()
    } else {
        event.sender.id.clone()
    };

    if !is_plausible_id(&conversation_id) {
        return InboundEvent::Discarded {
            reason: DiscardReason::MalformedId,
        };
    }

    if business {
        return InboundEvent::Business {
            conversation_id,
            text: trimmed_text(message.text.as_deref()),
        };
    }

    let mut fragments = Vec::new();
    if let Some(text) = trimmed_text(message.text.as_deref()) {
        fragments.push(Fragment::Text(text));
    }

    let mut unsupported = 0usize;
    for attachment in &message.attachments {
        let url = attachment.payload.url.as_deref().unwrap_or_default();
        if attachment.kind == "audio" && !url.is_empty() {
            fragments.push(Fragment::AudioUrl(url.to_string()));
        } else {
            unsupported += 1;
        }
    }

    if fragments.is_empty() {
        let reason = if unsupported > 0 {
            DiscardReason::UnsupportedAttachments
        } else {
            DiscardReason::EmptyContent
        };
        return InboundEvent::Discarded { reason };
    }

    InboundEvent::User {
        conversation_id,
        fragments,
    }
}

/// Routes classified events into the handoff store and the coalescer.
#[derive(Clone)]
pub struct IngressRouter {
    handoff: Arc<dyn HandoffStore>,
    coalescer: TurnCoalescer,
}

impl IngressRouter {
    pub fn new(handoff: Arc<dyn HandoffStore>, coalescer: TurnCoalescer) -> Self {
        Self { handoff, coalescer }
    }

    /// Route every event in a webhook payload. Per-event problems are
    /// logged; the rest of the batch still routes.
    pub async fn process(&self, payload: WebhookPayload) {
        for entry in payload.entry {
            for event in &entry.messaging {
                self.route(&entry.id, event).await;
            }
        }
    }

    async fn route(&self, entry_id: &str, event: &MessagingEvent) {
        match classify(entry_id, event) {
            InboundEvent::Business {
                conversation_id,
                text,
            } => self.route_business(&conversation_id, text.as_deref()).await,
            InboundEvent::User {
                conversation_id,
                fragments,
            } => self.route_user(&conversation_id, fragments).await,
            InboundEvent::Discarded { reason } => {
                debug!(?reason, "inbound event discarded");
            },
        }
    }

    /// A business-side message. The bot's own deliveries come back here as
    /// echoes; anything else means a human is typing in the inbox UI.
    async fn route_business(&self, conversation_id: &str, text: Option<&str>) {
        let Some(text) = text else {
            debug!(
                conversation = id_suffix(conversation_id),
                "business event without text, ignored"
            );
            return;
        };

        match self.handoff.consume_own_echo(conversation_id, text).await {
            Ok(true) => {
                debug!(
                    conversation = id_suffix(conversation_id),
                    "own reply echoed back, ignored"
                );
                return;
            },
            Ok(false) => {},
            Err(e) => {
                // Unknown marker state resolves the same way as every other
                // handoff uncertainty: toward suppression.
                error!(
                    conversation = id_suffix(conversation_id),
                    error = %e,
                    "echo marker lookup failed, treating echo as operator activity"
                );
            },
        }

        match self.handoff.mark_operator_active(conversation_id).await {
            Ok(MarkOutcome::Engaged) => {
                info!(
                    conversation = id_suffix(conversation_id),
                    "human operator replied, bot paused for this conversation"
                );
            },
            Ok(MarkOutcome::AlreadyEngaged) => {
                debug!(
                    conversation = id_suffix(conversation_id),
                    "operator still active, lock left as is"
                );
            },
            Err(e) => {
                error!(
                    conversation = id_suffix(conversation_id),
                    error = %e,
                    "failed to engage interaction lock"
                );
            },
        }
    }

    /// End-user fragments. Dropped whenever the lock is active or its state
    /// cannot be read: the bot must never talk over a human.
    async fn route_user(&self, conversation_id: &str, fragments: Vec<Fragment>) {
        match self.handoff.is_active(conversation_id).await {
            Ok(false) => {},
            Ok(true) => {
                let remaining = match self.handoff.remaining(conversation_id).await {
                    Ok(r) => r,
                    Err(_) => None,
                };
                info!(
                    conversation = id_suffix(conversation_id),
                    remaining_s = remaining.map(|d| d.as_secs()),
                    "conversation under human control, dropping fragments"
                );
                return;
            },
            Err(e) => {
                error!(
                    conversation = id_suffix(conversation_id),
                    error = %e,
                    "interaction lock state unknown, dropping fragments"
                );
                return;
            },
        }

        for fragment in fragments {
            if let Err(e) = self
                .coalescer
                .add_fragment(conversation_id, fragment)
                .await
            {
                warn!(
                    conversation = id_suffix(conversation_id),
                    error = %e,
                    "failed to buffer fragment"
                );
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use {async_trait::async_trait, rstest::rstest};

    use {
        garupa_coalesce::{
            BoxError, CoalescedTurn, MemoryTurnStore, TurnSink, TurnStore,
        },
        garupa_handoff::MemoryHandoffStore,
    };

    use {
        super::*,
        crate::types::{Attachment, AttachmentPayload, EventMessage, Party},
    };

    const BUSINESS: &str = "17841400000000000";
    const USER: &str = "1234567890";

    fn event(
        sender: &str,
        recipient: &str,
        text: Option<&str>,
        is_echo: bool,
        attachments: Vec<Attachment>,
    ) -> MessagingEvent {
        MessagingEvent {
            sender: Party { id: sender.into() },
            recipient: Party {
                id: recipient.into(),
            },
            timestamp: 0,
            message: Some(EventMessage {
                mid: Some("m_1".into()),
                text: text.map(str::to_string),
                is_echo,
                attachments,
            }),
        }
    }

    fn attachment(kind: &str, url: Option<&str>) -> Attachment {
        Attachment {
            kind: kind.into(),
            payload: AttachmentPayload {
                url: url.map(str::to_string),
            },
        }
    }

    #[test]
    fn user_text_is_classified_with_sender_as_conversation() {
        let classified = classify(BUSINESS, &event(USER, BUSINESS, Some("oi"), false, vec![]));
        assert_eq!(classified, InboundEvent::User {
            conversation_id: USER.into(),
            fragments: vec![Fragment::Text("oi".into())],
        });
    }

    #[test]
    fn echo_is_keyed_by_recipient() {
        let classified = classify(
            BUSINESS,
            &event(BUSINESS, USER, Some("bom dia!"), true, vec![]),
        );
        assert_eq!(classified, InboundEvent::Business {
            conversation_id: USER.into(),
            text: Some("bom dia!".into()),
        });
    }

    #[test]
    fn business_sender_without_echo_flag_is_still_business() {
        let classified = classify(
            BUSINESS,
            &event(BUSINESS, USER, Some("respondo eu"), false, vec![]),
        );
        assert!(matches!(classified, InboundEvent::Business { .. }));
    }

    #[test]
    fn audio_attachment_becomes_a_url_fragment() {
        let classified = classify(
            BUSINESS,
            &event(
                USER,
                BUSINESS,
                None,
                false,
                vec![attachment("audio", Some("https://cdn.example.com/a.m4a"))],
            ),
        );
        assert_eq!(classified, InboundEvent::User {
            conversation_id: USER.into(),
            fragments: vec![Fragment::AudioUrl("https://cdn.example.com/a.m4a".into())],
        });
    }

    #[test]
    fn text_and_audio_in_one_event_keep_payload_order() {
        let classified = classify(
            BUSINESS,
            &event(
                USER,
                BUSINESS,
                Some("escuta isso"),
                false,
                vec![attachment("audio", Some("https://cdn.example.com/b.m4a"))],
            ),
        );
        assert_eq!(classified, InboundEvent::User {
            conversation_id: USER.into(),
            fragments: vec![
                Fragment::Text("escuta isso".into()),
                Fragment::AudioUrl("https://cdn.example.com/b.m4a".into()),
            ],
        });
    }

    #[rstest]
    #[case::image_only(vec![attachment("image", Some("https://cdn.example.com/p.jpg"))], DiscardReason::UnsupportedAttachments)]
    #[case::share_only(vec![attachment("share", None)], DiscardReason::UnsupportedAttachments)]
    #[case::audio_without_url(vec![attachment("audio", None)], DiscardReason::UnsupportedAttachments)]
    #[case::nothing(vec![], DiscardReason::EmptyContent)]
    fn unroutable_user_content_is_discarded(
        #[case] attachments: Vec<Attachment>,
        #[case] expected: DiscardReason,
    ) {
        let classified = classify(BUSINESS, &event(USER, BUSINESS, None, false, attachments));
        assert_eq!(classified, InboundEvent::Discarded { reason: expected });
    }

    #[rstest]
    #[case::empty("")]
    #[case::alpha("not-digits")]
    #[case::mixed("123abc")]
    fn implausible_sender_ids_are_discarded(#[case] sender: &str) {
        let classified = classify(BUSINESS, &event(sender, BUSINESS, Some("oi"), false, vec![]));
        assert_eq!(classified, InboundEvent::Discarded {
            reason: DiscardReason::MalformedId,
        });
    }

    #[test]
    fn whitespace_only_text_is_empty_content() {
        let classified = classify(BUSINESS, &event(USER, BUSINESS, Some("   "), false, vec![]));
        assert_eq!(classified, InboundEvent::Discarded {
            reason: DiscardReason::EmptyContent,
        });
    }

    #[test]
    fn events_without_message_are_discarded() {
        let read_receipt = MessagingEvent {
            sender: Party { id: USER.into() },
            recipient: Party {
                id: BUSINESS.into(),
            },
            timestamp: 0,
            message: None,
        };
        assert_eq!(classify(BUSINESS, &read_receipt), InboundEvent::Discarded {
            reason: DiscardReason::NoMessage,
        });
    }

    // ── Router behavior over real stores ─────────────────────────────────

    #[derive(Default)]
    struct RecordingSink {
        turns: Mutex<Vec<CoalescedTurn>>,
    }

    #[async_trait]
    impl TurnSink for RecordingSink {
        async fn deliver(&self, turn: CoalescedTurn) -> Result<(), BoxError> {
            self.turns.lock().unwrap().push(turn);
            Ok(())
        }
    }

    struct Fixture {
        router: IngressRouter,
        handoff: Arc<MemoryHandoffStore>,
        store: Arc<MemoryTurnStore>,
    }

    fn fixture_with_ttl(lock_ttl: Duration) -> Fixture {
        let handoff = Arc::new(MemoryHandoffStore::new(lock_ttl));
        let store = Arc::new(MemoryTurnStore::default());
        let coalescer = TurnCoalescer::new(
            Arc::clone(&store) as Arc<dyn TurnStore>,
            Arc::new(RecordingSink::default()),
            Duration::from_secs(5),
        );
        Fixture {
            router: IngressRouter::new(
                Arc::clone(&handoff) as Arc<dyn HandoffStore>,
                coalescer,
            ),
            handoff,
            store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_ttl(Duration::from_secs(300))
    }

    fn payload(entry_id: &str, events: Vec<MessagingEvent>) -> WebhookPayload {
        WebhookPayload {
            object: "instagram".into(),
            entry: vec![crate::types::Entry {
                id: entry_id.into(),
                time: 0,
                messaging: events,
            }],
        }
    }

    #[tokio::test]
    async fn user_text_lands_in_the_buffer() {
        let fx = fixture();
        fx.router
            .process(payload(BUSINESS, vec![event(
                USER,
                BUSINESS,
                Some("oi"),
                false,
                vec![],
            )]))
            .await;

        let fragments = fx.store.take(USER).await.unwrap();
        assert_eq!(fragments, vec![Fragment::Text("oi".into())]);
    }

    #[tokio::test]
    async fn operator_echo_engages_the_lock_and_buffers_nothing() {
        let fx = fixture();
        fx.router
            .process(payload(BUSINESS, vec![event(
                BUSINESS,
                USER,
                Some("deixa comigo"),
                true,
                vec![],
            )]))
            .await;

        assert!(fx.handoff.is_active(USER).await.unwrap());
        assert!(fx.store.take(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn own_echo_does_not_engage_the_lock() {
        let fx = fixture();
        fx.handoff
            .note_outbound_reply(USER, "Bom dia! Como posso ajudar?")
            .await
            .unwrap();

        fx.router
            .process(payload(BUSINESS, vec![event(
                BUSINESS,
                USER,
                Some("Bom dia! Como posso ajudar?"),
                true,
                vec![],
            )]))
            .await;

        assert!(!fx.handoff.is_active(USER).await.unwrap());
    }

    #[tokio::test]
    async fn locked_conversation_drops_user_fragments() {
        let fx = fixture();
        fx.handoff.mark_operator_active(USER).await.unwrap();

        fx.router
            .process(payload(BUSINESS, vec![event(
                USER,
                BUSINESS,
                Some("alguem ai?"),
                false,
                vec![],
            )]))
            .await;

        assert!(fx.store.take(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_lock_lets_fragments_through() {
        let fx = fixture_with_ttl(Duration::from_millis(30));
        fx.handoff.mark_operator_active(USER).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        fx.router
            .process(payload(BUSINESS, vec![event(
                USER,
                BUSINESS,
                Some("e agora?"),
                false,
                vec![],
            )]))
            .await;

        assert_eq!(fx.store.take(USER).await.unwrap(), vec![Fragment::Text(
            "e agora?".into()
        )]);
    }

    #[tokio::test]
    async fn one_bad_event_does_not_stop_the_batch() {
        let fx = fixture();
        fx.router
            .process(payload(BUSINESS, vec![
                event("not-digits", BUSINESS, Some("?"), false, vec![]),
                event(USER, BUSINESS, Some("oi"), false, vec![]),
            ]))
            .await;

        assert_eq!(fx.store.take(USER).await.unwrap(), vec![Fragment::Text(
            "oi".into()
        )]);
    }
}
