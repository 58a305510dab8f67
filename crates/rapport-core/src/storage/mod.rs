use crate::error::StorageError;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

/// Key-value persistence primitive backing both the mutation queue and the
/// local report list. Values are JSON-serialized strings.
///
/// Each persisted collection is owned by exactly one store; nothing else
/// reads or writes its key directly.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
