//! In-memory store for tests and local development runs.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use {
    async_trait::async_trait,
    garupa_common::time,
    tracing::info,
};

use crate::{
    DEFAULT_ECHO_MARKER_TTL, DEFAULT_LOCK_TTL, HandoffStore, MarkOutcome, Result, echo_digest,
};

/// [`HandoffStore`] held in process memory. State does not survive restarts;
/// use the SQLite store for real deployments.
pub struct MemoryHandoffStore {
    lock_ttl: Duration,
    echo_ttl: Duration,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// conversation id -> lock expiry (unix ms).
    locks: HashMap<String, i64>,
    /// (conversation id, digest) -> marker expiry (unix ms).
    echoes: HashMap<(String, String), i64>,
}

impl MemoryHandoffStore {
    #[must_use]
    pub fn new(lock_ttl: Duration) -> Self {
        Self {
            lock_ttl,
            echo_ttl: DEFAULT_ECHO_MARKER_TTL,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Override the outbound-marker TTL.
    #[must_use]
    pub fn with_echo_ttl(mut self, echo_ttl: Duration) -> Self {
        self.echo_ttl = echo_ttl;
        self
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryHandoffStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TTL)
    }
}

#[async_trait]
impl HandoffStore for MemoryHandoffStore {
    async fn mark_operator_active(&self, conversation_id: &str) -> Result<MarkOutcome> {
        let now = time::unix_ms_now();
        let mut inner = self.lock_inner();
        match inner.locks.get(conversation_id) {
            Some(expires) if *expires > now => Ok(MarkOutcome::AlreadyEngaged),
            _ => {
                inner.locks.insert(
                    conversation_id.to_owned(),
                    now + self.lock_ttl.as_millis() as i64,
                );
                info!(conversation = conversation_id, "human takeover engaged, bot muted");
                Ok(MarkOutcome::Engaged)
            },
        }
    }

    async fn is_active(&self, conversation_id: &str) -> Result<bool> {
        let now = time::unix_ms_now();
        let inner = self.lock_inner();
        Ok(matches!(inner.locks.get(conversation_id), Some(expires) if *expires > now))
    }

    async fn release(&self, conversation_id: &str) -> Result<bool> {
        let mut inner = self.lock_inner();
        Ok(inner.locks.remove(conversation_id).is_some())
    }

    async fn remaining(&self, conversation_id: &str) -> Result<Option<Duration>> {
        let inner = self.lock_inner();
        Ok(inner
            .locks
            .get(conversation_id)
            .copied()
            .and_then(time::until_unix_ms))
    }

    async fn note_outbound_reply(&self, conversation_id: &str, text: &str) -> Result<()> {
        let now = time::unix_ms_now();
        let mut inner = self.lock_inner();
        inner.echoes.retain(|_, expires| *expires > now);
        inner.echoes.insert(
            (conversation_id.to_owned(), echo_digest(text)),
            now + self.echo_ttl.as_millis() as i64,
        );
        Ok(())
    }

    async fn consume_own_echo(&self, conversation_id: &str, text: &str) -> Result<bool> {
        let now = time::unix_ms_now();
        let key = (conversation_id.to_owned(), echo_digest(text));
        let mut inner = self.lock_inner();
        Ok(matches!(inner.echoes.remove(&key), Some(expires) if expires > now))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_sqlite_store_semantics() {
        let store = MemoryHandoffStore::new(Duration::from_secs(60));
        assert_eq!(
            store.mark_operator_active("u1").await.unwrap(),
            MarkOutcome::Engaged
        );
        assert_eq!(
            store.mark_operator_active("u1").await.unwrap(),
            MarkOutcome::AlreadyEngaged
        );
        assert!(store.is_active("u1").await.unwrap());
        assert!(store.release("u1").await.unwrap());
        assert!(!store.release("u1").await.unwrap());
    }

    #[tokio::test]
    async fn expiry_frees_the_conversation() {
        let store = MemoryHandoffStore::new(Duration::from_millis(40));
        store.mark_operator_active("u1").await.unwrap();

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(!store.is_active("u1").await.unwrap());
        assert_eq!(
            store.mark_operator_active("u1").await.unwrap(),
            MarkOutcome::Engaged
        );
    }

    #[tokio::test]
    async fn echo_markers_consume_once() {
        let store = MemoryHandoffStore::default();
        store.note_outbound_reply("u1", "oi").await.unwrap();
        assert!(store.consume_own_echo("u1", "oi").await.unwrap());
        assert!(!store.consume_own_echo("u1", "oi").await.unwrap());
    }
}
