//! [`ConversationAgent`] backed by an OpenAI-compatible chat-completions
//! endpoint with the `register_lead` tool attached.

use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde_json::json,
    tracing::{debug, warn},
};

use crate::{
    AgentAction, ConversationAgent, EffectResult, Error, HistoryEntry, HistoryRole, LeadSubmission,
    Result, prompt::SYSTEM_PROMPT,
};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REGISTER_LEAD_TOOL: &str = "register_lead";
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Low temperature keeps the scripted sales flow on rails.
const TEMPERATURE: f64 = 0.1;

/// Chat-completions client carrying the dealership persona.
#[derive(Clone)]
pub struct OpenAiAgent {
    client: Client,
    api_key: Option<Secret<String>>,
    api_base: String,
    model: String,
}

impl std::fmt::Debug for OpenAiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAgent")
            .field("api_key", &self.api_key.as_ref().map(|_| "REDACTED"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiAgent {
    #[must_use]
    pub fn new(api_key: Option<Secret<String>>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Point at a different OpenAI-compatible endpoint.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Override the chat model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_messages(
        &self,
        history: &[HistoryEntry],
        turn_text: &str,
        effects: &[EffectResult],
    ) -> Vec<serde_json::Value> {
        let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];

        for entry in history {
            let role = match entry.role {
                HistoryRole::User => "user",
                HistoryRole::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": entry.text}));
        }

        messages.push(json!({"role": "user", "content": turn_text}));

        // Replay earlier side-effect rounds of this same flush as tool
        // exchanges, so the model sees what its request produced.
        for (index, effect) in effects.iter().enumerate() {
            let call_id = format!("call_{index}");
            let arguments =
                serde_json::to_string(&effect.submission).unwrap_or_else(|_| "{}".to_string());
            messages.push(json!({
                "role": "assistant",
                "content": serde_json::Value::Null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {"name": REGISTER_LEAD_TOOL, "arguments": arguments},
                }],
            }));
            messages.push(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": effect.indicator,
            }));
        }

        messages
    }
}

#[async_trait]
impl ConversationAgent for OpenAiAgent {
    async fn invoke(
        &self,
        history: &[HistoryEntry],
        turn_text: &str,
        effects: &[EffectResult],
    ) -> Result<AgentAction> {
        let api_key = self.api_key.as_ref().ok_or(Error::NotConfigured)?;

        let body = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "messages": self.build_messages(history, turn_text, effects),
            "tools": [register_lead_tool()],
        });

        debug!(
            model = %self.model,
            history_len = history.len(),
            effects = effects.len(),
            "agent completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .timeout(COMPLETION_TIMEOUT)
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body_text, "model provider error");
            return Err(Error::provider(status.as_u16(), body_text));
        }

        let payload = response.json::<serde_json::Value>().await?;
        parse_action(&payload)
    }
}

/// OpenAI tool definition for the one side effect the persona may request.
fn register_lead_tool() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": REGISTER_LEAD_TOOL,
            "description": "Registra os dados obrigatórios do cliente (Nome, CPF, Telefone, Modelo, Nascimento e CNH) assim que ele providenciar todos. Dispara notificação de urgência aos consultores.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Nome do lead"},
                    "cpf": {"type": "string", "description": "CPF no formato 000.000.000-00"},
                    "phone": {"type": "string", "description": "Telefone no formato (00) 00000-0000"},
                    "modelOfInterest": {"type": "string", "description": "Modelo da moto de interesse"},
                    "birthDate": {"type": "string", "description": "Data de nascimento no formato 00/00/0000"},
                    "hasCNH": {"type": "boolean", "description": "Se o cliente possui CNH (true/false)"},
                },
                "required": ["name", "cpf", "phone", "modelOfInterest", "birthDate", "hasCNH"],
            },
        },
    })
}

/// Map one completion payload onto the action it asks for. A tool call wins
/// over any accompanying text, mirroring how the provider routes tool
/// traffic.
fn parse_action(payload: &serde_json::Value) -> Result<AgentAction> {
    let message = &payload["choices"][0]["message"];

    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            if call["function"]["name"].as_str() != Some(REGISTER_LEAD_TOOL) {
                continue;
            }
            let arguments = call["function"]["arguments"].as_str().unwrap_or("{}");
            let submission = serde_json::from_str::<LeadSubmission>(arguments).map_err(|e| {
                Error::response(format!("register_lead arguments did not parse: {e}"))
            })?;
            return Ok(AgentAction::RegisterLead(submission));
        }
    }

    match message["content"].as_str().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(AgentAction::Reply(text.to_string())),
        _ => Err(Error::response(
            "completion carried neither text nor a register_lead call",
        )),
    }
}
