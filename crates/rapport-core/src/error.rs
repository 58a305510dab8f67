use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the key-value persistence layer.
///
/// A caller that sees one of these has no durability guarantee left and must
/// surface the failure synchronously rather than swallow it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key-value backend error: {0}")]
    Backend(String),

    #[error("failed to encode or decode stored JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Errors raised by the local report store.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report {0} not found")]
    NotFound(Uuid),

    /// Distinct, user-facing error kind: the caller should show an
    /// explanatory message, not a retry prompt.
    #[error("report {local_id} can no longer be edited (36 hour window expired)")]
    EditWindowExpired { local_id: Uuid },

    /// The remote id is set-once; a second sync confirmation must agree.
    #[error("report {local_id} is already synced as {existing}, refusing to overwrite with {incoming}")]
    RemoteIdConflict {
        local_id: Uuid,
        existing: String,
        incoming: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure of a single remote write, classified so the dispatcher does not
/// waste retries on a payload the server will never accept.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network trouble, timeout, or a 5xx-equivalent: worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The server rejected the write itself: retrying cannot succeed.
    #[error("permanent remote failure: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, RemoteError::Permanent(_))
    }
}
