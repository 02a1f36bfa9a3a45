//! Conversation persistence collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, WeftError};
use crate::types::Message;

/// Loads and saves the history of a session.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// History of `session_id`; empty when nothing was saved yet.
    async fn load(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Replace the saved history of `session_id`.
    async fn save(&self, session_id: &str, messages: &[Message]) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }
}

/// One pretty-printed JSON file per session under a base directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store under `~/.weft/sessions`.
    pub fn new_default() -> Self {
        let base = crate::config::default_weft_dir().unwrap_or_else(|| PathBuf::from(".weft"));
        Self::new(base.join("sessions"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.json", normalize_label(session_id)))
    }
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        let path = self.session_path(session_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&raw)
            .map_err(|err| WeftError::Store(format!("{}: {err}", path.display())))
    }

    async fn save(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let path = self.session_path(session_id);
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let serialized = serde_json::to_vec_pretty(messages)?;
        // Readers never observe a half-written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(session_id, path = %path.display(), messages = messages.len(), "saved history");
        Ok(())
    }
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    trimmed
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}
