//! The turn coalescer: per-conversation debounce with durable state.
//!
//! Every conversation gets its own gate in a concurrent map, so two users
//! never serialize against each other. Inside one gate, appends and the
//! drain phase of a flush hold the same mutex; the downstream delivery runs
//! outside it so new fragments keep flowing while the agent thinks.

use std::{
    sync::Arc,
    time::Duration,
};

use {
    dashmap::DashMap,
    garupa_common::{text::id_suffix, time},
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, error, info, warn},
};

use crate::{CoalescedTurn, Fragment, Result, TurnSink, TurnStore};

/// Debounces fragments into turns and delivers each turn to the sink exactly
/// once. Cheap to clone; clones share the same buffers and timers.
#[derive(Clone)]
pub struct TurnCoalescer {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TurnStore>,
    sink: Arc<dyn TurnSink>,
    quiet_period: Duration,
    gates: DashMap<String, Arc<Gate>>,
}

/// Per-conversation serialization.
#[derive(Default)]
struct Gate {
    /// Guards the buffer and the armed timer. Held while appending and while
    /// a flush drains the store, never across the sink call.
    timer: Mutex<TimerSlot>,
    /// Held across the whole flush including the sink call, so one
    /// conversation has at most one delivery in flight.
    flush: Mutex<()>,
}

#[derive(Default)]
struct TimerSlot {
    /// Monotonic per-conversation counter; only the latest armed timer may
    /// flush. A superseded timer that already woke finds a newer generation
    /// and stands down.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Cancel whatever timer is armed and claim the next generation.
    fn supersede(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.generation
    }
}

impl TurnCoalescer {
    pub fn new(store: Arc<dyn TurnStore>, sink: Arc<dyn TurnSink>, quiet_period: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                sink,
                quiet_period,
                gates: DashMap::new(),
            }),
        }
    }

    /// Buffer a fragment and reset the conversation's quiet-period deadline.
    /// The flush fires only if nothing else arrives within the window.
    pub async fn add_fragment(&self, conversation_id: &str, fragment: Fragment) -> Result<()> {
        let gate = self.inner.gate(conversation_id);
        let mut slot = gate.timer.lock().await;

        let due_at_ms = time::unix_ms_now() + self.inner.quiet_period.as_millis() as i64;
        self.inner
            .store
            .append(conversation_id, &fragment, due_at_ms)
            .await?;

        let generation = slot.supersede();
        slot.task = Some(Inner::spawn_flush_timer(
            Arc::clone(&self.inner),
            conversation_id.to_owned(),
            generation,
            self.inner.quiet_period,
        ));
        debug!(
            conversation = id_suffix(conversation_id),
            kind = fragment.kind(),
            quiet_ms = self.inner.quiet_period.as_millis() as u64,
            "fragment buffered, deadline reset"
        );
        Ok(())
    }

    /// Re-arm timers for buffers persisted before a restart. Overdue buffers
    /// flush immediately. Returns how many buffers were found.
    pub async fn resume(&self) -> Result<usize> {
        let pending = self.inner.store.pending().await?;
        let count = pending.len();
        for buffer in pending {
            let gate = self.inner.gate(&buffer.conversation_id);
            let mut slot = gate.timer.lock().await;
            let delay = time::until_unix_ms(buffer.flush_due_at_ms).unwrap_or(Duration::ZERO);
            let generation = slot.supersede();
            slot.task = Some(Inner::spawn_flush_timer(
                Arc::clone(&self.inner),
                buffer.conversation_id.clone(),
                generation,
                delay,
            ));
        }
        if count > 0 {
            info!(buffers = count, "re-armed pending turn buffers");
        }
        Ok(count)
    }

    /// Drive a flush attempt directly, standing in for a timer firing.
    #[cfg(test)]
    pub(crate) async fn flush_now(&self, conversation_id: &str, generation: u64) {
        self.inner.flush_due(conversation_id, generation).await;
    }

    /// Current timer generation, for tests that simulate stale timers.
    #[cfg(test)]
    pub(crate) async fn current_generation(&self, conversation_id: &str) -> u64 {
        self.inner.gate(conversation_id).timer.lock().await.generation
    }
}

impl Inner {
    fn gate(&self, conversation_id: &str) -> Arc<Gate> {
        self.gates
            .entry(conversation_id.to_owned())
            .or_default()
            .clone()
    }

    fn spawn_flush_timer(
        inner: Arc<Inner>,
        conversation_id: String,
        generation: u64,
        delay: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.flush_due(&conversation_id, generation).await;
        })
    }

    /// Flush the conversation if `generation` is still the armed timer.
    async fn flush_due(&self, conversation_id: &str, generation: u64) {
        let gate = self.gate(conversation_id);
        let _flush = gate.flush.lock().await;

        // Drain under the timer lock so an append can never slip between the
        // generation check and the read-and-clear.
        let fragments = {
            let mut slot = gate.timer.lock().await;
            if slot.generation != generation {
                debug!(
                    conversation = id_suffix(conversation_id),
                    stale = generation,
                    current = slot.generation,
                    "superseded timer stood down"
                );
                return;
            }
            slot.task = None;
            match self.store.take(conversation_id).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    error!(
                        conversation = id_suffix(conversation_id),
                        error = %e,
                        "failed to drain turn buffer, turn lost"
                    );
                    return;
                },
            }
        };

        if fragments.is_empty() {
            debug!(
                conversation = id_suffix(conversation_id),
                "flush found an empty buffer"
            );
            return;
        }

        info!(
            conversation = id_suffix(conversation_id),
            fragments = fragments.len(),
            "turn closed, delivering"
        );
        let turn = CoalescedTurn {
            conversation_id: conversation_id.to_owned(),
            fragments,
        };
        if let Err(e) = self.sink.deliver(turn).await {
            // At-most-once: the buffer is already cleared, the turn is gone.
            warn!(
                conversation = id_suffix(conversation_id),
                error = %e,
                "turn delivery failed, fragments were already cleared and are not retried"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        async_trait::async_trait,
        tokio::sync::Semaphore,
    };

    use {
        super::*,
        crate::{BoxError, MemoryTurnStore, SqliteTurnStore},
    };

    #[derive(Default)]
    struct RecordingSink {
        turns: std::sync::Mutex<Vec<CoalescedTurn>>,
    }

    impl RecordingSink {
        fn turns(&self) -> Vec<CoalescedTurn> {
            self.turns.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TurnSink for RecordingSink {
        async fn deliver(&self, turn: CoalescedTurn) -> std::result::Result<(), BoxError> {
            self.turns.lock().unwrap().push(turn);
            Ok(())
        }
    }

    /// Sink that parks deliveries until the test releases them.
    struct HoldingSink {
        gate: Semaphore,
        turns: std::sync::Mutex<Vec<CoalescedTurn>>,
    }

    impl HoldingSink {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                turns: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn release_one(&self) {
            self.gate.add_permits(1);
        }

        fn turns(&self) -> Vec<CoalescedTurn> {
            self.turns.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TurnSink for HoldingSink {
        async fn deliver(&self, turn: CoalescedTurn) -> std::result::Result<(), BoxError> {
            let permit = self.gate.acquire().await?;
            permit.forget();
            self.turns.lock().unwrap().push(turn);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl TurnSink for FailingSink {
        async fn deliver(&self, _turn: CoalescedTurn) -> std::result::Result<(), BoxError> {
            Err("agent unavailable".into())
        }
    }

    fn coalescer_with(sink: Arc<dyn TurnSink>, quiet: Duration) -> TurnCoalescer {
        TurnCoalescer::new(Arc::new(MemoryTurnStore::default()), sink, quiet)
    }

    fn text(s: &str) -> Fragment {
        Fragment::Text(s.into())
    }

    #[tokio::test(start_paused = true)]
    async fn burst_flushes_once_after_quiet_period() {
        let sink = Arc::new(RecordingSink::default());
        let coalescer = coalescer_with(sink.clone(), Duration::from_secs(5));

        coalescer.add_fragment("u1", text("oi")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        coalescer
            .add_fragment("u1", text("quero saber de motos"))
            .await
            .unwrap();

        // t=5.5: the original deadline passed but was superseded at t=2.
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(sink.turns().is_empty(), "deadline must move with the burst");

        // t=7.5: quiet since t=2, the turn closes.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let turns = sink.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].conversation_id, "u1");
        assert_eq!(turns[0].joined_text(), "oi\nquero saber de motos");
    }

    #[tokio::test(start_paused = true)]
    async fn single_fragment_flushes_at_the_deadline() {
        let sink = Arc::new(RecordingSink::default());
        let coalescer = coalescer_with(sink.clone(), Duration::from_secs(5));

        coalescer.add_fragment("u1", text("oi")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(sink.turns().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.turns().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conversations_do_not_serialize_each_other() {
        let sink = Arc::new(RecordingSink::default());
        let coalescer = coalescer_with(sink.clone(), Duration::from_secs(5));

        coalescer.add_fragment("u1", text("oi")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        coalescer.add_fragment("u2", text("bom dia")).await.unwrap();

        // u1 quiet since t=0, flushes at t=5; u2 at t=8.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let turns = sink.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].conversation_id, "u1");

        tokio::time::sleep(Duration::from_secs(3)).await;
        let turns = sink.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].conversation_id, "u2");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_never_flushes() {
        let sink = Arc::new(RecordingSink::default());
        let coalescer = coalescer_with(sink.clone(), Duration::from_secs(5));

        coalescer.add_fragment("u1", text("oi")).await.unwrap();
        let stale = coalescer.current_generation("u1").await;
        coalescer.add_fragment("u1", text("tem cg 160?")).await.unwrap();

        // The first timer fires anyway (simulating an abort that lost the
        // race); it must stand down without draining the refreshed buffer.
        coalescer.flush_now("u1", stale).await;
        assert!(sink.turns().is_empty());

        let current = coalescer.current_generation("u1").await;
        coalescer.flush_now("u1", current).await;
        let turns = sink.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].joined_text(), "oi\ntem cg 160?");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_flushes_deliver_at_most_once() {
        let sink = Arc::new(RecordingSink::default());
        let coalescer = coalescer_with(sink.clone(), Duration::from_secs(5));

        coalescer.add_fragment("u1", text("oi")).await.unwrap();
        let generation = coalescer.current_generation("u1").await;

        // Two fires for the same armed timer: the second finds the buffer
        // already drained and no-ops.
        tokio::join!(
            coalescer.flush_now("u1", generation),
            coalescer.flush_now("u1", generation),
        );
        assert_eq!(sink.turns().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fragment_during_delivery_starts_a_fresh_turn() {
        let sink = Arc::new(HoldingSink::new());
        let coalescer = TurnCoalescer::new(
            Arc::new(MemoryTurnStore::default()),
            sink.clone(),
            Duration::from_secs(5),
        );

        coalescer.add_fragment("u1", text("primeira")).await.unwrap();
        // Let the timer fire; delivery parks inside the sink.
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(sink.turns().is_empty());

        // The flush already cleared the buffer, so this starts a new cycle.
        coalescer.add_fragment("u1", text("segunda")).await.unwrap();
        sink.release_one();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let turns = sink.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].joined_text(), "primeira");

        sink.release_one();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        let turns = sink.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].joined_text(), "segunda");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_is_not_retried() {
        let store = Arc::new(MemoryTurnStore::default());
        let coalescer =
            TurnCoalescer::new(store.clone(), Arc::new(FailingSink), Duration::from_secs(5));

        coalescer.add_fragment("u1", text("oi")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;

        // The buffer was cleared before the sink failed; nothing is re-queued.
        assert!(store.take("u1").await.unwrap().is_empty());
        assert!(store.pending().await.unwrap().is_empty());
    }

    // Real time here: the SQLite worker runs off-runtime, and a paused clock
    // would auto-advance past the flush while it is still in the database.
    #[tokio::test]
    async fn resume_rearms_persisted_deadlines() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteTurnStore::init(&pool).await.unwrap();
        let store = Arc::new(SqliteTurnStore::new(pool));

        // Buffered before "the restart": deadline already in the past.
        store
            .append("u1", &text("ficou pendente"), time::unix_ms_now() - 1_000)
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let coalescer = TurnCoalescer::new(store, sink.clone(), Duration::from_secs(5));
        assert_eq!(coalescer.resume().await.unwrap(), 1);

        // Overdue buffers flush as soon as their zero-delay timer runs.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let turns = sink.turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].joined_text(), "ficou pendente");
    }
}
