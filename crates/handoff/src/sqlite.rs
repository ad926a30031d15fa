//! SQLite-backed interaction locks and outbound-echo markers.

use std::time::Duration;

use {
    async_trait::async_trait,
    garupa_common::{text::id_suffix, time},
    tracing::{debug, info},
};

use crate::{
    DEFAULT_ECHO_MARKER_TTL, HandoffStore, MarkOutcome, Result, echo_digest,
};

/// Durable [`HandoffStore`] sharing the service's SQLite database.
pub struct SqliteHandoffStore {
    pool: sqlx::SqlitePool,
    lock_ttl: Duration,
    echo_ttl: Duration,
}

impl SqliteHandoffStore {
    pub fn new(pool: sqlx::SqlitePool, lock_ttl: Duration) -> Self {
        Self {
            pool,
            lock_ttl,
            echo_ttl: DEFAULT_ECHO_MARKER_TTL,
        }
    }

    /// Override the outbound-marker TTL (tests use short windows).
    #[must_use]
    pub fn with_echo_ttl(mut self, echo_ttl: Duration) -> Self {
        self.echo_ttl = echo_ttl;
        self
    }

    /// Create the tables if missing. Called once at startup.
    pub async fn init(pool: &sqlx::SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS handoff_locks (
                conversation_id TEXT PRIMARY KEY,
                locked_at_ms    INTEGER NOT NULL,
                expires_at_ms   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS outbound_echoes (
                conversation_id TEXT NOT NULL,
                digest          TEXT NOT NULL,
                expires_at_ms   INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, digest)
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn purge_expired_lock(&self, conversation_id: &str, now: i64) -> Result<()> {
        sqlx::query("DELETE FROM handoff_locks WHERE conversation_id = ? AND expires_at_ms <= ?")
            .bind(conversation_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HandoffStore for SqliteHandoffStore {
    async fn mark_operator_active(&self, conversation_id: &str) -> Result<MarkOutcome> {
        let now = time::unix_ms_now();
        self.purge_expired_lock(conversation_id, now).await?;

        let expires = now + self.lock_ttl.as_millis() as i64;
        let result = sqlx::query(
            r#"INSERT INTO handoff_locks (conversation_id, locked_at_ms, expires_at_ms)
               VALUES (?, ?, ?)
               ON CONFLICT(conversation_id) DO NOTHING"#,
        )
        .bind(conversation_id)
        .bind(now)
        .bind(expires)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(
                conversation = id_suffix(conversation_id),
                ttl_secs = self.lock_ttl.as_secs(),
                "human takeover engaged, bot muted"
            );
            Ok(MarkOutcome::Engaged)
        } else {
            debug!(
                conversation = id_suffix(conversation_id),
                "human takeover already active"
            );
            Ok(MarkOutcome::AlreadyEngaged)
        }
    }

    async fn is_active(&self, conversation_id: &str) -> Result<bool> {
        let now = time::unix_ms_now();
        let active = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM handoff_locks WHERE conversation_id = ? AND expires_at_ms > ?",
        )
        .bind(conversation_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(active > 0)
    }

    async fn release(&self, conversation_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM handoff_locks WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;
        let released = result.rows_affected() > 0;
        if released {
            info!(
                conversation = id_suffix(conversation_id),
                "interaction lock released"
            );
        }
        Ok(released)
    }

    async fn remaining(&self, conversation_id: &str) -> Result<Option<Duration>> {
        let now = time::unix_ms_now();
        let expires = sqlx::query_scalar::<_, i64>(
            "SELECT expires_at_ms FROM handoff_locks WHERE conversation_id = ? AND expires_at_ms > ?",
        )
        .bind(conversation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(expires.and_then(time::until_unix_ms))
    }

    async fn note_outbound_reply(&self, conversation_id: &str, text: &str) -> Result<()> {
        let now = time::unix_ms_now();
        // Lazy cleanup keeps the table bounded without a background task.
        sqlx::query("DELETE FROM outbound_echoes WHERE expires_at_ms <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let expires = now + self.echo_ttl.as_millis() as i64;
        sqlx::query(
            r#"INSERT INTO outbound_echoes (conversation_id, digest, expires_at_ms)
               VALUES (?, ?, ?)
               ON CONFLICT(conversation_id, digest) DO UPDATE SET
                 expires_at_ms = excluded.expires_at_ms"#,
        )
        .bind(conversation_id)
        .bind(echo_digest(text))
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_own_echo(&self, conversation_id: &str, text: &str) -> Result<bool> {
        let now = time::unix_ms_now();
        let result = sqlx::query(
            "DELETE FROM outbound_echoes \
             WHERE conversation_id = ? AND digest = ? AND expires_at_ms > ?",
        )
        .bind(conversation_id)
        .bind(echo_digest(text))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
