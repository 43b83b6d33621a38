

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkpoint::{CheckpointError, ConversationCheckpointer};
use super::models::{ConversationThread, ConversationTurn, TurnRecord};


#[derive(Debug)]
struct ThreadSlot {
    thread: ConversationThread,
    hydrated: bool,
}


/// Thread-partitioned conversation history with one writer per thread at a time.
pub struct ConversationStore {
    threads: RwLock<HashMap<String, Arc<Mutex<ThreadSlot>>>>,
    checkpointer: Option<Arc<dyn ConversationCheckpointer>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            checkpointer: None,
        }
    }

    pub fn with_checkpointer(checkpointer: Arc<dyn ConversationCheckpointer>) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            checkpointer: Some(checkpointer),
        }
    }

    pub fn new_thread_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn slot(&self, thread_id: &str) -> Arc<Mutex<ThreadSlot>> {
        if let Some(slot) = self.threads.read().get(thread_id) {
            return slot.clone();
        }
        self.threads
            .write()
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!("Created thread {}", thread_id);
                Arc::new(Mutex::new(ThreadSlot {
                    thread: ConversationThread::new(thread_id),
                    hydrated: false,
                }))
            })
            .clone()
    }

    async fn hydrate(&self, slot: &mut ThreadSlot) -> Result<(), CheckpointError> {
        if slot.hydrated {
            return Ok(());
        }
        if let Some(checkpointer) = &self.checkpointer {
            let turns = checkpointer.load(&slot.thread.thread_id).await?;
            if !turns.is_empty() {
                info!("Restored {} turns for thread {}", turns.len(), slot.thread.thread_id);
            }
            slot.thread = ConversationThread::from_turns(slot.thread.thread_id.clone(), turns);
        }
        slot.hydrated = true;
        Ok(())
    }

    /// Waits for exclusive access to the thread. Held for the whole turn.
    pub async fn begin_turn(&self, thread_id: &str) -> Result<TurnGuard, CheckpointError> {
        let mut slot = self.slot(thread_id).lock_owned().await;
        self.hydrate(&mut slot).await?;
        Ok(TurnGuard {
            slot,
            checkpointer: self.checkpointer.clone(),
        })
    }

    /// Copy of the thread's current history.
    pub async fn snapshot(&self, thread_id: &str) -> Result<ConversationThread, CheckpointError> {
        let mut slot = self.slot(thread_id).lock_owned().await;
        self.hydrate(&mut slot).await?;
        Ok(slot.thread.clone())
    }

    /// Resets the thread in memory and in durable storage.
    pub async fn clear(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let mut slot = self.slot(thread_id).lock_owned().await;
        if let Some(checkpointer) = &self.checkpointer {
            checkpointer.clear(thread_id).await?;
        }
        slot.thread.reset();
        slot.hydrated = true;
        info!("Cleared thread {}", thread_id);
        Ok(())
    }

    pub fn thread_count(&self) -> usize {
        self.threads.read().len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}


/// Exclusive handle on one thread for the duration of a turn.
pub struct TurnGuard {
    slot: OwnedMutexGuard<ThreadSlot>,
    checkpointer: Option<Arc<dyn ConversationCheckpointer>>,
}

impl TurnGuard {
    pub fn thread(&self) -> &ConversationThread {
        &self.slot.thread
    }

    /// Appends the turn in memory, then persists it. A persistence failure is
    /// logged and returned; the in-memory history keeps the turn either way.
    pub async fn record(&mut self, record: TurnRecord) -> Result<ConversationTurn, CheckpointError> {
        let turn = self.slot.thread.append(record).clone();
        if let Some(checkpointer) = &self.checkpointer {
            if let Err(e) = checkpointer.append_turn(&self.slot.thread.thread_id, &turn).await {
                warn!("Failed to checkpoint turn {} of {}: {}", turn.turn_index, self.slot.thread.thread_id, e);
                return Err(e);
            }
        }
        Ok(turn)
    }
}
