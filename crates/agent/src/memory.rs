//! In-memory lead store for tests and local development runs.

use {
    async_trait::async_trait,
    std::{collections::HashMap, sync::Mutex},
};

use crate::{Lead, LeadStore, Result, StoredLead};

/// [`LeadStore`] held in process memory. Leads do not survive restarts; use
/// the SQLite store for real deployments.
#[derive(Default)]
pub struct MemoryLeadStore {
    inner: Mutex<HashMap<String, StoredLead>>,
}

impl MemoryLeadStore {
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredLead>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn upsert(&self, conversation_id: &str, lead: &Lead) -> Result<()> {
        let mut inner = self.lock_inner();
        let notified = inner
            .get(conversation_id)
            .is_some_and(|stored| stored.notified);
        inner.insert(
            conversation_id.to_string(),
            StoredLead {
                lead: lead.clone(),
                notified,
            },
        );
        Ok(())
    }

    async fn begin_notification(&self, conversation_id: &str) -> Result<bool> {
        let mut inner = self.lock_inner();
        match inner.get_mut(conversation_id) {
            Some(stored) if !stored.notified => {
                stored.notified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<StoredLead>> {
        Ok(self.lock_inner().get(conversation_id).cloned())
    }
}
