//! Execution of the lead-registration side effect.
//!
//! The registrar never returns an error to the model loop; every outcome is
//! folded into one of the two indicator strings the persona script knows how
//! to react to.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    garupa_common::text::id_suffix,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
    tracing::{debug, error, info, warn},
};

use crate::{Error, Lead, LeadStore, LeadSubmission, Result};

/// Fed back to the model when registration went through. The script reacts
/// by sending the customer the WhatsApp link.
pub const SUCCESS_INDICATOR: &str = "[SUCESSO] Dados registrados. Avise o cliente e mande este link do WhatsApp para ele: http://bit.ly/46ia00v";

/// Fed back to the model when registration could not happen.
pub const FAILURE_INDICATOR: &str = "[FALHA] Não foi possível registrar os dados no momento.";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes the registration side effect requested by the agent.
#[async_trait]
pub trait LeadRegistrar: Send + Sync {
    /// Run the side effect and return the indicator string for the model.
    async fn register(&self, conversation_id: &str, submission: &LeadSubmission) -> String;
}

/// [`LeadRegistrar`] enforcing the notify-once guarantee: the lead row is
/// persisted on every valid submission, but the sales team is pinged only
/// on the first one per conversation.
pub struct NotifyOnceRegistrar {
    store: Arc<dyn LeadStore>,
    notifier: Option<LeadNotifier>,
}

impl NotifyOnceRegistrar {
    #[must_use]
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: LeadNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

#[async_trait]
impl LeadRegistrar for NotifyOnceRegistrar {
    async fn register(&self, conversation_id: &str, submission: &LeadSubmission) -> String {
        let lead = match submission.validate() {
            Ok(lead) => lead,
            Err(e) => {
                warn!(conversation = %id_suffix(conversation_id), error = %e, "lead submission rejected");
                return FAILURE_INDICATOR.to_string();
            }
        };

        if let Err(e) = self.store.upsert(conversation_id, &lead).await {
            error!(conversation = %id_suffix(conversation_id), error = %e, "lead could not be persisted");
            return FAILURE_INDICATOR.to_string();
        }

        match self.store.begin_notification(conversation_id).await {
            Ok(true) => {
                info!(
                    conversation = %id_suffix(conversation_id),
                    model = %lead.model_of_interest,
                    "lead registered"
                );
                if let Some(notifier) = &self.notifier {
                    // The row is already durable; webhook delivery failures
                    // only log, they never unwind the claim.
                    if let Err(e) = notifier.notify(conversation_id, &lead).await {
                        warn!(conversation = %id_suffix(conversation_id), error = %e, "lead webhook delivery failed");
                    }
                }
            }
            Ok(false) => {
                debug!(conversation = %id_suffix(conversation_id), "lead already notified, webhook skipped");
            }
            Err(e) => {
                error!(conversation = %id_suffix(conversation_id), error = %e, "notify-once transition failed");
                return FAILURE_INDICATOR.to_string();
            }
        }

        SUCCESS_INDICATOR.to_string()
    }
}

/// POSTs registered leads to the configured webhook so the sales team gets
/// pinged in whatever tool sits behind it.
#[derive(Clone)]
pub struct LeadNotifier {
    client: Client,
    url: String,
    token: Option<Secret<String>>,
}

impl std::fmt::Debug for LeadNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadNotifier")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "REDACTED"))
            .finish()
    }
}

impl LeadNotifier {
    #[must_use]
    pub fn new(url: String, token: Option<Secret<String>>) -> Self {
        Self {
            client: Client::new(),
            url,
            token,
        }
    }

    pub async fn notify(&self, conversation_id: &str, lead: &Lead) -> Result<()> {
        let payload = json!({
            "conversationId": conversation_id,
            "name": lead.name,
            "cpf": lead.cpf,
            "phone": lead.phone,
            "modelOfInterest": lead.model_of_interest,
            "birthDate": lead.birth_date,
            "hasCNH": lead.has_cnh,
        });

        let mut request = self
            .client
            .post(&self.url)
            .timeout(NOTIFY_TIMEOUT)
            .json(&payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::webhook(status, body));
        }

        debug!(conversation = %id_suffix(conversation_id), "lead webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, crate::MemoryLeadStore, mockito::Matcher};

    fn submission() -> LeadSubmission {
        LeadSubmission {
            name: "João da Silva".to_string(),
            cpf: "52998224725".to_string(),
            phone: "11987654321".to_string(),
            model_of_interest: "SHI 175".to_string(),
            birth_date: "15/03/1995".to_string(),
            has_cnh: true,
        }
    }

    #[tokio::test]
    async fn valid_submission_persists_and_succeeds() {
        let store = Arc::new(MemoryLeadStore::default());
        let registrar = NotifyOnceRegistrar::new(store.clone());

        let indicator = registrar.register("123", &submission()).await;

        assert_eq!(indicator, SUCCESS_INDICATOR);
        let stored = store.get("123").await.unwrap().unwrap();
        assert_eq!(stored.lead.cpf, "529.982.247-25");
        assert_eq!(stored.lead.phone, "(11) 98765-4321");
        assert!(stored.notified);
    }

    #[tokio::test]
    async fn invalid_submission_fails_without_touching_the_store() {
        let store = Arc::new(MemoryLeadStore::default());
        let registrar = NotifyOnceRegistrar::new(store.clone());

        let bad = LeadSubmission {
            cpf: "123".to_string(),
            ..submission()
        };
        let indicator = registrar.register("123", &bad).await;

        assert_eq!(indicator, FAILURE_INDICATOR);
        assert!(store.get("123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn webhook_fires_once_per_conversation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/leads")
            .match_header("authorization", "Bearer hook-token")
            .match_body(Matcher::PartialJson(json!({
                "conversationId": "123",
                "name": "João da Silva",
                "cpf": "529.982.247-25",
                "phone": "(11) 98765-4321",
                "modelOfInterest": "SHI 175",
                "birthDate": "15/03/1995",
                "hasCNH": true,
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryLeadStore::default());
        let notifier = LeadNotifier::new(
            format!("{}/leads", server.url()),
            Some(Secret::new("hook-token".to_string())),
        );
        let registrar = NotifyOnceRegistrar::new(store).with_notifier(notifier);

        assert_eq!(registrar.register("123", &submission()).await, SUCCESS_INDICATOR);
        assert_eq!(registrar.register("123", &submission()).await, SUCCESS_INDICATOR);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_failure_still_reports_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/leads")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let store = Arc::new(MemoryLeadStore::default());
        let notifier = LeadNotifier::new(format!("{}/leads", server.url()), None);
        let registrar = NotifyOnceRegistrar::new(store.clone()).with_notifier(notifier);

        let indicator = registrar.register("123", &submission()).await;

        assert_eq!(indicator, SUCCESS_INDICATOR);
        assert!(store.get("123").await.unwrap().unwrap().notified);
    }

    #[tokio::test]
    async fn notifier_debug_redacts_the_token() {
        let notifier = LeadNotifier::new(
            "https://hooks.example.com/leads".to_string(),
            Some(Secret::new("hook-token".to_string())),
        );
        let output = format!("{notifier:?}");

        assert!(output.contains("REDACTED"));
        assert!(!output.contains("hook-token"));
    }
}
