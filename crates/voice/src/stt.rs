//! Speech-to-text over an OpenAI-compatible transcription endpoint.

use {
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    bytes::Bytes,
    reqwest::{
        Client,
        multipart::{Form, Part},
    },
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    std::time::Duration,
};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "whisper-1";
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns a recorded voice note into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Whether the provider has credentials and can be called at all.
    fn is_configured(&self) -> bool;

    /// Transcribe one audio attachment. `file_name` hints the container
    /// format to the backend.
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String>;
}

/// Whisper transcription against the OpenAI audio API.
#[derive(Clone)]
pub struct WhisperTranscriber {
    client: Client,
    api_key: Option<Secret<String>>,
    api_base: String,
    model: String,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("api_key", &self.api_key.as_ref().map(|_| "REDACTED"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl WhisperTranscriber {
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

    fn get_api_key(&self) -> Result<&Secret<String>> {
        self.api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not configured for transcription"))
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String> {
        let api_key = self.get_api_key()?;

        let file_part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .context("failed to build audio file part")?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .timeout(TRANSCRIBE_TIMEOUT)
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .multipart(form)
            .send()
            .await
            .context("failed to send Whisper transcription request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Whisper transcription request failed: {status} - {error_text}"
            ));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("failed to parse Whisper response")?;

        Ok(parsed.text.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Best-effort file name for an attachment URL, used to hint the audio
/// container to the transcription backend. CDN URLs carry signing query
/// strings and sometimes no recognizable path, so anything that does not
/// look like a plain file name falls back to `audio.m4a`.
#[must_use]
pub fn attachment_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let candidate = path.rsplit('/').next().unwrap_or_default();
    let plausible = !candidate.is_empty()
        && candidate.contains('.')
        && !candidate.starts_with('.')
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if plausible {
        candidate.to_string()
    } else {
        "audio.m4a".to_string()
    }
}

/// Container MIME type from the attachment file name. Instagram voice
/// notes arrive as `.m4a`, which is also the safe default.
fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name.rsplit('.').next().unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        _ => "audio/mp4",
    }
}
