//! SQLite-backed lead storage.

use {async_trait::async_trait, garupa_common::time};

use crate::{Lead, LeadStore, Result, StoredLead};

/// Durable [`LeadStore`] sharing the service's SQLite database.
pub struct SqliteLeadStore {
    pool: sqlx::SqlitePool,
}

impl SqliteLeadStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table if missing. Called once at startup.
    pub async fn init(pool: &sqlx::SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS leads (
                conversation_id TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                cpf             TEXT NOT NULL,
                phone           TEXT NOT NULL,
                model           TEXT NOT NULL,
                birth_date      TEXT NOT NULL,
                has_cnh         INTEGER NOT NULL,
                notified        INTEGER NOT NULL DEFAULT 0,
                updated_at_ms   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn upsert(&self, conversation_id: &str, lead: &Lead) -> Result<()> {
        // `notified` is deliberately absent from the update set; a refreshed
        // lead must not re-arm the notification.
        sqlx::query(
            r#"INSERT INTO leads
                   (conversation_id, name, cpf, phone, model, birth_date, has_cnh, notified, updated_at_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
               ON CONFLICT(conversation_id) DO UPDATE SET
                   name = excluded.name,
                   cpf = excluded.cpf,
                   phone = excluded.phone,
                   model = excluded.model,
                   birth_date = excluded.birth_date,
                   has_cnh = excluded.has_cnh,
                   updated_at_ms = excluded.updated_at_ms"#,
        )
        .bind(conversation_id)
        .bind(&lead.name)
        .bind(&lead.cpf)
        .bind(&lead.phone)
        .bind(&lead.model_of_interest)
        .bind(&lead.birth_date)
        .bind(lead.has_cnh)
        .bind(time::unix_ms_now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn begin_notification(&self, conversation_id: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE leads SET notified = 1 WHERE conversation_id = ? AND notified = 0")
                .bind(conversation_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<StoredLead>> {
        let row = sqlx::query_as::<_, (String, String, String, String, String, bool, bool)>(
            r#"SELECT name, cpf, phone, model, birth_date, has_cnh, notified
               FROM leads WHERE conversation_id = ?"#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(name, cpf, phone, model_of_interest, birth_date, has_cnh, notified)| StoredLead {
                lead: Lead {
                    name,
                    cpf,
                    phone,
                    model_of_interest,
                    birth_date,
                    has_cnh,
                },
                notified,
            },
        ))
    }
}
