//! SQLite-backed turn buffers.
//!
//! Fragments are ordered by rowid; the buffer row carries the flush deadline
//! so a restart can re-arm timers. `take` runs inside one transaction so a
//! racing append lands either wholly before the drain or in a fresh buffer.

use async_trait::async_trait;

use {
    garupa_common::time,
    tracing::debug,
};

use crate::{Error, Fragment, PendingBuffer, Result, TurnStore};

/// Durable [`TurnStore`] sharing the service's SQLite database.
pub struct SqliteTurnStore {
    pool: sqlx::SqlitePool,
}

impl SqliteTurnStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the tables if missing. Called once at startup.
    pub async fn init(pool: &sqlx::SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS turn_buffers (
                conversation_id TEXT PRIMARY KEY,
                flush_due_at_ms INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS turn_fragments (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                kind            TEXT NOT NULL,
                body            TEXT NOT NULL,
                received_at_ms  INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turn_fragments_conversation \
             ON turn_fragments (conversation_id)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    async fn append(
        &self,
        conversation_id: &str,
        fragment: &Fragment,
        flush_due_at_ms: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO turn_fragments (conversation_id, kind, body, received_at_ms) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(fragment.kind())
        .bind(fragment.body())
        .bind(time::unix_ms_now())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"INSERT INTO turn_buffers (conversation_id, flush_due_at_ms)
               VALUES (?, ?)
               ON CONFLICT(conversation_id) DO UPDATE SET
                 flush_due_at_ms = excluded.flush_due_at_ms"#,
        )
        .bind(conversation_id)
        .bind(flush_due_at_ms)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn take(&self, conversation_id: &str) -> Result<Vec<Fragment>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT kind, body FROM turn_fragments WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM turn_fragments WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM turn_buffers WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut fragments = Vec::with_capacity(rows.len());
        for (kind, body) in rows {
            match Fragment::from_parts(&kind, body) {
                Some(fragment) => fragments.push(fragment),
                None => return Err(Error::unknown_fragment_kind(conversation_id, kind)),
            }
        }
        if !fragments.is_empty() {
            debug!(
                conversation = conversation_id,
                count = fragments.len(),
                "drained turn buffer"
            );
        }
        Ok(fragments)
    }

    async fn pending(&self) -> Result<Vec<PendingBuffer>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT conversation_id, flush_due_at_ms FROM turn_buffers ORDER BY flush_due_at_ms",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(conversation_id, flush_due_at_ms)| PendingBuffer {
                conversation_id,
                flush_due_at_ms,
            })
            .collect())
    }
}
