use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The lead store could not be read or written.
    #[error("lead storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The model provider rejected the completion call.
    #[error("model provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    /// The completion response carried nothing the coordinator can act on.
    #[error("unusable completion: {0}")]
    Response(String),

    /// The lead webhook rejected the notification.
    #[error("lead webhook returned HTTP {status}: {body}")]
    Webhook { status: u16, body: String },

    /// No API key is configured for the model provider.
    #[error("model provider API key not configured")]
    NotConfigured,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn provider(status: u16, body: impl Into<String>) -> Self {
        Self::Provider {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn response(message: impl Into<String>) -> Self {
        Self::Response(message.into())
    }

    #[must_use]
    pub fn webhook(status: u16, body: impl Into<String>) -> Self {
        Self::Webhook {
            status,
            body: body.into(),
        }
    }
}
