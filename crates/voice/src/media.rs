//! On-disk storage for synthesized reply files served over HTTP.
//!
//! Meta fetches an audio attachment from the public URL right after the
//! send call, so files only need to live long enough to cover retries.
//! Expiry is lazy: each write sweeps the directory for stale files.

use {
    anyhow::{Context, Result},
    bytes::Bytes,
    std::{
        path::PathBuf,
        time::{Duration, SystemTime},
    },
    tokio::fs,
    tracing::{debug, warn},
    uuid::Uuid,
};

/// How long a synthesized reply stays on disk.
pub const DEFAULT_REPLY_TTL: Duration = Duration::from_secs(900);

/// Directory of synthesized MP3 replies with lazy expiry.
#[derive(Debug, Clone)]
pub struct AudioReplyStore {
    dir: PathBuf,
    ttl: Duration,
}

impl AudioReplyStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: DEFAULT_REPLY_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Write one synthesized reply and return the file name it is served
    /// under.
    pub async fn put(&self, audio: Bytes) -> Result<String> {
        self.cleanup_expired().await;

        fs::create_dir_all(&self.dir)
            .await
            .context("failed to create media directory")?;

        let file_name = format!("{}.mp3", Uuid::new_v4());
        let path = self.dir.join(&file_name);
        fs::write(&path, &audio)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!(file = %file_name, bytes = audio.len(), "stored audio reply");
        Ok(file_name)
    }

    /// Resolve a requested file name to its on-disk path. Anything that is
    /// not a bare `.mp3` name is rejected, so the HTTP handler cannot be
    /// walked out of the media directory.
    pub async fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        if !is_safe_file_name(file_name) {
            return None;
        }

        let path = self.dir.join(file_name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    async fn cleanup_expired(&self) {
        let Ok(mut entries) = fs::read_dir(&self.dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let expired = meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .is_some_and(|age| age > self.ttl);
            if expired {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!(file = %entry.path().display(), error = %e, "failed to remove expired audio reply");
                }
            }
        }
    }
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.ends_with(".mp3")
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
