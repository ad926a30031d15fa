use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The buffer store could not be read or written; the affected fragment
    /// or flush is dropped and the caller decides how loudly to fail.
    #[error("turn buffer storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored fragment row carries a tag this build does not know.
    #[error("unknown fragment kind {kind:?} buffered for conversation {conversation}")]
    UnknownFragmentKind { conversation: String, kind: String },
}

impl Error {
    #[must_use]
    pub fn unknown_fragment_kind(conversation: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnknownFragmentKind {
            conversation: conversation.into(),
            kind: kind.into(),
        }
    }
}
