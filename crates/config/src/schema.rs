//! Config schema types. Defaults here match the observed deployment; every
//! field can be overridden from the environment (see `env.rs`).

use {
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GarupaConfig {
    pub server: ServerConfig,
    pub instagram: InstagramConfig,
    pub openai: OpenAiConfig,
    pub agent: AgentConfig,
    pub voice: VoiceConfig,
    pub lead: LeadConfig,
    pub storage: StorageConfig,
    pub coalesce: CoalesceConfig,
    pub handoff: HandoffConfig,
}

impl GarupaConfig {
    /// Debounce window for the turn coalescer.
    #[must_use]
    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.coalesce.quiet_period_secs)
    }

    /// How long a human takeover suppresses the bot.
    #[must_use]
    pub fn handoff_ttl(&self) -> Duration {
        Duration::from_secs(self.handoff.ttl_secs)
    }

    /// Human-readable warnings about incomplete configuration, logged once at
    /// startup. None of these are fatal; the service degrades per warning.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.instagram.access_token.is_empty() {
            warnings.push("INSTAGRAM_ACCESS_TOKEN is not set; outbound replies will fail".into());
        }
        if self.instagram.app_secret.is_none() {
            warnings.push(
                "INSTAGRAM_APP_SECRET is not set; webhook signatures will not be verified".into(),
            );
        }
        if self.openai.api_key.is_none() {
            warnings.push("OPENAI_API_KEY is not set; the conversation agent cannot run".into());
        }
        if self.voice.audio_replies_enabled {
            if self.server.public_base_url.is_none() {
                warnings.push(
                    "ENABLE_INSTAGRAM_AUDIO_REPLY is on but PUBLIC_BASE_URL is not set; \
                     audio replies will fall back to text"
                        .into(),
                );
            }
            if self.openai.api_key.is_none() {
                warnings.push(
                    "ENABLE_INSTAGRAM_AUDIO_REPLY is on but OPENAI_API_KEY is not set; \
                     audio replies will fall back to text"
                        .into(),
                );
            }
        }
        if self.lead.webhook_url.is_none() {
            warnings
                .push("LEAD_WEBHOOK_URL is not set; captured leads are only stored locally".into());
        }
        warnings
    }
}

/// HTTP listener and public addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, `host:port`.
    pub bind: String,
    /// Externally reachable base URL, used to build hosted media links.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            public_base_url: None,
        }
    }
}

/// Meta Graph API credentials and webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    /// Token echoed during the webhook subscription handshake.
    pub verify_token: String,
    /// Bearer token for the send API.
    pub access_token: String,
    /// App secret for `X-Hub-Signature-256` verification; unset skips it.
    pub app_secret: Option<String>,
    /// Graph API version path segment.
    pub api_version: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            verify_token: "my_verify_token".into(),
            access_token: String::new(),
            app_secret: None,
            api_version: "v22.0".into(),
        }
    }
}

/// Model-provider access, shared by the agent and the voice providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    /// Override for OpenAI-compatible gateways; unset uses the public API.
    pub api_base: Option<String>,
}

/// Conversation agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
        }
    }
}

/// Voice reply settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Reply with synthesized audio when the user's turn contained audio.
    pub audio_replies_enabled: bool,
    pub reply_model: String,
    pub reply_voice: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            audio_replies_enabled: false,
            reply_model: "tts-1".into(),
            reply_voice: "alloy".into(),
        }
    }
}

/// Where captured leads are pushed, besides the local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadConfig {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
}

/// Durable state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file holding buffers, locks, and leads.
    pub db_path: String,
    /// Directory for synthesized reply audio served under `/media/audio`.
    pub media_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "garupa.db".into(),
            media_dir: "media".into(),
        }
    }
}

/// Turn coalescer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalesceConfig {
    /// Seconds of silence that close a turn.
    pub quiet_period_secs: u64,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            quiet_period_secs: 5,
        }
    }
}

/// Interaction lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Seconds a human takeover suppresses the bot.
    pub ttl_secs: u64,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}
