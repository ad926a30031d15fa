//! Durable buffer storage behind the coalescer.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{Fragment, Result};

/// A buffer with fragments waiting for its deadline, as seen at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBuffer {
    pub conversation_id: String,
    pub flush_due_at_ms: i64,
}

/// Per-conversation fragment buffer with a persisted flush deadline.
///
/// `take` is the atomic read-and-clear the flush path relies on: two
/// concurrent takes for one conversation must never both see the same
/// fragment, and an append racing a take lands in a fresh buffer.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Append a fragment and move the buffer's deadline to `flush_due_at_ms`.
    async fn append(
        &self,
        conversation_id: &str,
        fragment: &Fragment,
        flush_due_at_ms: i64,
    ) -> Result<()>;

    /// Remove and return the buffered fragments in arrival order. An empty
    /// result means another flush already drained the buffer.
    async fn take(&self, conversation_id: &str) -> Result<Vec<Fragment>>;

    /// Every buffer still waiting for its deadline.
    async fn pending(&self) -> Result<Vec<PendingBuffer>>;
}

/// [`TurnStore`] held in process memory, for tests and local runs. Buffered
/// turns do not survive restarts.
#[derive(Default)]
pub struct MemoryTurnStore {
    buffers: Mutex<HashMap<String, BufferEntry>>,
}

struct BufferEntry {
    flush_due_at_ms: i64,
    fragments: Vec<Fragment>,
}

impl MemoryTurnStore {
    fn lock_buffers(&self) -> std::sync::MutexGuard<'_, HashMap<String, BufferEntry>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn append(
        &self,
        conversation_id: &str,
        fragment: &Fragment,
        flush_due_at_ms: i64,
    ) -> Result<()> {
        let mut buffers = self.lock_buffers();
        let entry = buffers
            .entry(conversation_id.to_owned())
            .or_insert_with(|| BufferEntry {
                flush_due_at_ms,
                fragments: Vec::new(),
            });
        entry.flush_due_at_ms = flush_due_at_ms;
        entry.fragments.push(fragment.clone());
        Ok(())
    }

    async fn take(&self, conversation_id: &str) -> Result<Vec<Fragment>> {
        let mut buffers = self.lock_buffers();
        Ok(buffers
            .remove(conversation_id)
            .map(|entry| entry.fragments)
            .unwrap_or_default())
    }

    async fn pending(&self) -> Result<Vec<PendingBuffer>> {
        let buffers = self.lock_buffers();
        let mut pending: Vec<PendingBuffer> = buffers
            .iter()
            .map(|(conversation_id, entry)| PendingBuffer {
                conversation_id: conversation_id.clone(),
                flush_due_at_ms: entry.flush_due_at_ms,
            })
            .collect();
        pending.sort_by_key(|p| p.flush_due_at_ms);
        Ok(pending)
    }
}
