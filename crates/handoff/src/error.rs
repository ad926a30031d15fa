use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The lock store could not be read or written. Callers must treat the
    /// lock state as unknown and drop the event rather than respond.
    #[error("handoff storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
