//! Outbound Graph API client: text sends, audio attachment sends, and
//! attachment downloads.

use std::time::Duration;

use {
    bytes::Bytes,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
};

use garupa_common::text::{id_suffix, truncate_chars};

use crate::error::{Error, Result};

/// Default Graph API host for Instagram messaging.
const DEFAULT_API_BASE: &str = "https://graph.instagram.com";

/// Graph API version the app is pinned to.
const DEFAULT_API_VERSION: &str = "v22.0";

/// Hard provider limit on a single message's text. Longer replies are
/// truncated, not split.
pub const MAX_MESSAGE_CHARS: usize = 1000;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const MEDIA_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the `me/messages` send API and attachment CDN.
#[derive(Clone)]
pub struct InstagramClient {
    client: reqwest::Client,
    access_token: Secret<String>,
    api_base: String,
    api_version: String,
}

impl std::fmt::Debug for InstagramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramClient")
            .field("access_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl InstagramClient {
    #[must_use]
    pub fn new(access_token: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Point at a different Graph host. The host is used as-is, so tests can
    /// aim the client at a local server.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Pin a different Graph API version.
    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/me/messages",
            self.api_base.trim_end_matches('/'),
            self.api_version
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }

    /// Send a plain text message.
    pub async fn send_text(&self, recipient_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "recipient": { "id": recipient_id },
            "message": { "text": truncate_chars(text, MAX_MESSAGE_CHARS) },
        });
        self.post_message(recipient_id, &body, "text").await
    }

    /// Send a hosted audio file as an attachment. The URL must be publicly
    /// reachable by Meta; the attachment is single-use.
    pub async fn send_audio(&self, recipient_id: &str, audio_url: &str) -> Result<()> {
        let body = serde_json::json!({
            "recipient": { "id": recipient_id },
            "message": {
                "attachment": {
                    "type": "audio",
                    "payload": { "url": audio_url, "is_reusable": false },
                }
            }
        });
        self.post_message(recipient_id, &body, "audio").await
    }

    async fn post_message(
        &self,
        recipient_id: &str,
        body: &serde_json::Value,
        what: &'static str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url())
            .timeout(SEND_TIMEOUT)
            .header("Authorization", self.bearer())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(
                recipient = id_suffix(recipient_id),
                what,
                status = status.as_u16(),
                body = %body_text,
                "instagram send failed"
            );
            return Err(Error::api(status.as_u16(), body_text));
        }

        debug!(
            recipient = id_suffix(recipient_id),
            what, "instagram message delivered"
        );
        Ok(())
    }

    /// Download an attachment. Some CDN links are pre-signed and reject the
    /// bearer header with 401/403; those are retried bare.
    pub async fn fetch_media(&self, url: &str) -> Result<Bytes> {
        let authed = self
            .client
            .get(url)
            .timeout(MEDIA_TIMEOUT)
            .header("Authorization", self.bearer())
            .send()
            .await?;

        let response = if matches!(authed.status().as_u16(), 401 | 403) {
            debug!("attachment CDN rejected bearer auth, retrying without");
            self.client.get(url).timeout(MEDIA_TIMEOUT).send().await?
        } else {
            authed
        };

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), body_text));
        }

        Ok(response.bytes().await?)
    }
}
