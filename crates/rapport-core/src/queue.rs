use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StorageError;
use crate::models::{MutationKind, QueuedMutation};
use crate::storage::KeyValue;

const QUEUE_KEY: &str = "offline_mutation_queue";
const DEAD_LETTER_KEY: &str = "offline_dead_letters";

/// Maximum number of retryable-failure attempts before a mutation is
/// permanently dropped from the queue.
pub const MAX_RETRIES: u32 = 3;

/// A mutation the dispatcher gave up on, kept for diagnostics so the drop is
/// never silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub mutation: QueuedMutation,
    pub reason: String,
    pub dropped_at: i64,
}

/// Ordered, persisted list of pending write operations, surviving process
/// restarts.
///
/// The queue knows nothing about mutation semantics, network state, or retry
/// policy; it is a pure ordered persistent list. An in-memory cache mirrors
/// the persisted list for same-process reads, but the CLI and the daemon may
/// each hold a queue over the same database, so a flush pass starts from
/// [`MutationQueue::reload`] rather than the warm cache and commits through
/// [`MutationQueue::commit_flush`], which keeps entries enqueued by anyone
/// else while the pass ran.
pub struct MutationQueue {
    kv: Arc<dyn KeyValue>,
    clock: Arc<dyn Clock>,
    cache: Mutex<Option<Vec<QueuedMutation>>>,
}

impl MutationQueue {
    pub fn new(kv: Arc<dyn KeyValue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            cache: Mutex::new(None),
        }
    }

    /// Append a new mutation with a fresh id and `retry_count = 0`.
    /// A persistence failure propagates; it is never swallowed.
    pub fn enqueue(
        &self,
        kind: MutationKind,
        payload: serde_json::Value,
    ) -> Result<QueuedMutation, StorageError> {
        let mut guard = self.cache.lock().expect("queue cache poisoned");
        let entries = self.loaded(&mut guard)?;

        let mutation = QueuedMutation {
            id: Uuid::new_v4(),
            kind,
            payload,
            enqueued_at: self.clock.now_ms(),
            retry_count: 0,
        };
        entries.push(mutation.clone());
        // Keep cache and store in agreement if the write fails.
        if let Err(err) = self.persist(entries) {
            entries.pop();
            return Err(err);
        }
        Ok(mutation)
    }

    /// Current queue contents in FIFO order, without mutating anything.
    pub fn peek_all(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let mut guard = self.cache.lock().expect("queue cache poisoned");
        Ok(self.loaded(&mut guard)?.clone())
    }

    /// Re-read the persisted list, replacing any warm cache. A flush pass
    /// starts here so mutations enqueued by another process since this
    /// cache warmed are dispatched instead of ignored.
    pub fn reload(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let mut guard = self.cache.lock().expect("queue cache poisoned");
        let entries = self.load_from_store()?;
        *guard = Some(entries.clone());
        Ok(entries)
    }

    /// Commit the outcome of a flush pass in one write. Entries the pass
    /// dispatched (`seen`) are replaced by their surviving versions;
    /// entries that arrived in the store while the pass ran are kept behind
    /// them. Overwriting with the pass's snapshot wholesale would destroy
    /// those without a single delivery attempt.
    pub fn commit_flush(
        &self,
        seen: &[Uuid],
        surviving: Vec<QueuedMutation>,
    ) -> Result<(), StorageError> {
        let mut guard = self.cache.lock().expect("queue cache poisoned");
        let mut entries = surviving;
        for entry in self.load_from_store()? {
            if !seen.contains(&entry.id) {
                entries.push(entry);
            }
        }
        let json = serde_json::to_string(&entries)?;
        self.kv.set(QUEUE_KEY, &json)?;
        *guard = Some(entries);
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize, StorageError> {
        let mut guard = self.cache.lock().expect("queue cache poisoned");
        Ok(self.loaded(&mut guard)?.len())
    }

    /// Drop every pending mutation. Use with caution.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.cache.lock().expect("queue cache poisoned");
        self.kv.remove(QUEUE_KEY)?;
        *guard = Some(Vec::new());
        Ok(())
    }

    /// Record a mutation the dispatcher gave up on.
    pub fn push_dead_letter(
        &self,
        mutation: QueuedMutation,
        reason: &str,
    ) -> Result<(), StorageError> {
        let mut letters = self.dead_letters()?;
        letters.push(DeadLetter {
            mutation,
            reason: reason.to_string(),
            dropped_at: self.clock.now_ms(),
        });
        let json = serde_json::to_string(&letters)?;
        self.kv.set(DEAD_LETTER_KEY, &json)
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, StorageError> {
        match self.kv.get(DEAD_LETTER_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Discard the dead-letter list.
    pub fn clear_dead_letters(&self) -> Result<(), StorageError> {
        self.kv.remove(DEAD_LETTER_KEY)
    }

    /// Ensure the cache is warm and hand out a mutable reference to it.
    fn loaded<'a>(
        &self,
        guard: &'a mut MutexGuard<'_, Option<Vec<QueuedMutation>>>,
    ) -> Result<&'a mut Vec<QueuedMutation>, StorageError> {
        if guard.is_none() {
            **guard = Some(self.load_from_store()?);
        }
        Ok(guard.as_mut().expect("cache just initialized"))
    }

    /// Cold-start read of the persisted list. Entries that no longer
    /// deserialize (written by a different version, or corrupt) are logged
    /// and dropped: they could never be dispatched successfully.
    fn load_from_store(&self) -> Result<Vec<QueuedMutation>, StorageError> {
        let Some(json) = self.kv.get(QUEUE_KEY)? else {
            return Ok(Vec::new());
        };
        let raw: Vec<serde_json::Value> = serde_json::from_str(&json)?;
        let mut entries = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<QueuedMutation>(value) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(error = %err, "dropping unreadable queued mutation");
                }
            }
        }
        Ok(entries)
    }

    fn persist(&self, entries: &[QueuedMutation]) -> Result<(), StorageError> {
        let json = serde_json::to_string(entries)?;
        self.kv.set(QUEUE_KEY, &json)
    }
}
