

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::models::ConversationTurn;


#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Invalid thread id: {0}")]
    InvalidThreadId(String),

    #[error("Corrupt checkpoint for {thread_id} at line {line}: {message}")]
    Corrupt {
        thread_id: String,
        line: usize,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}


/// Durable storage for thread history, keyed by thread id.
#[async_trait]
pub trait ConversationCheckpointer: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Vec<ConversationTurn>, CheckpointError>;

    async fn append_turn(&self, thread_id: &str, turn: &ConversationTurn) -> Result<(), CheckpointError>;

    async fn clear(&self, thread_id: &str) -> Result<(), CheckpointError>;
}


/// One JSON-lines file per thread under `directory`.
pub struct JsonlCheckpointer {
    directory: PathBuf,
}

impl JsonlCheckpointer {
    pub async fn new(directory: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).await?;
        info!("Conversation checkpoints stored in {}", directory.display());
        Ok(Self { directory })
    }

    fn path(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !thread_id.is_empty()
            && thread_id.len() <= 128
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CheckpointError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(self.directory.join(format!("{}.jsonl", thread_id)))
    }
}

#[async_trait]
impl ConversationCheckpointer for JsonlCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Vec<ConversationTurn>, CheckpointError> {
        let path = self.path(thread_id)?;
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut turns = Vec::new();
        for (n, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let turn = serde_json::from_str(line).map_err(|e| CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                line: n + 1,
                message: e.to_string(),
            })?;
            turns.push(turn);
        }

        debug!("Loaded {} turns for thread {}", turns.len(), thread_id);
        Ok(turns)
    }

    async fn append_turn(&self, thread_id: &str, turn: &ConversationTurn) -> Result<(), CheckpointError> {
        let path = self.path(thread_id)?;
        let mut line = serde_json::to_string(turn)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn clear(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let path = self.path(thread_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
