//! Text-to-speech for spoken replies.

use {
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    bytes::Bytes,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    std::time::Duration,
};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";
const SYNTHESIZE_TIMEOUT: Duration = Duration::from_secs(60);

/// Spoken replies are capped well below the text limit so listeners never
/// sit through minutes of synthesized speech.
pub const MAX_SPEECH_CHARS: usize = 500;

/// Renders reply text as audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Whether the provider has credentials and can be called at all.
    fn is_configured(&self) -> bool;

    /// Render `text` as MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

/// Speech synthesis against the OpenAI audio API.
#[derive(Clone)]
pub struct OpenAiSynthesizer {
    client: Client,
    api_key: Option<Secret<String>>,
    api_base: String,
    model: String,
    voice: String,
}

impl std::fmt::Debug for OpenAiSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSynthesizer")
            .field("api_key", &self.api_key.as_ref().map(|_| "REDACTED"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl OpenAiSynthesizer {
    #[must_use]
    pub fn new(api_key: Option<Secret<String>>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }

    /// Point at a different OpenAI-compatible endpoint.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Override the synthesis model and voice.
    #[must_use]
    pub fn with_voice(mut self, model: impl Into<String>, voice: impl Into<String>) -> Self {
        self.model = model.into();
        self.voice = voice.into();
        self
    }

    fn get_api_key(&self) -> Result<&Secret<String>> {
        self.api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not configured for speech synthesis"))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        let api_key = self.get_api_key()?;

        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .timeout(SYNTHESIZE_TIMEOUT)
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(&body)
            .send()
            .await
            .context("failed to send OpenAI TTS request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI TTS request failed: {status} - {error_text}"));
        }

        response.bytes().await.context("failed to read OpenAI TTS response")
    }
}

/// Fit reply text into something worth speaking. Text at or under the cap
/// passes through untouched; longer text is cut at the last word boundary
/// before [`MAX_SPEECH_CHARS`], stripped of dangling punctuation, and
/// closed with a period.
#[must_use]
pub fn trim_for_speech(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_SPEECH_CHARS {
        return trimmed.to_string();
    }

    let cut: String = trimmed.chars().take(MAX_SPEECH_CHARS).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    let cut = cut.trim_end_matches([' ', ',', '.', ';', ':', '!', '?']);
    format!("{cut}.")
}
