use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Write operations the mutation queue knows how to replay against the
/// backend. Adding a kind requires adding exactly one arm to
/// [`crate::remote::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    CreateTimeEntry,
    UpdateTaskStatus,
    AddNote,
    CreatePhotoRecord,
    CreateDayReport,
    CreateProjectReport,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::CreateTimeEntry => "create_time_entry",
            MutationKind::UpdateTaskStatus => "update_task_status",
            MutationKind::AddNote => "add_note",
            MutationKind::CreatePhotoRecord => "create_photo_record",
            MutationKind::CreateDayReport => "create_day_report",
            MutationKind::CreateProjectReport => "create_project_report",
        }
    }

    /// Kinds whose payload embeds a `local_id` pointing back at a record in
    /// the local report store.
    pub fn is_report_creation(self) -> bool {
        matches!(
            self,
            MutationKind::CreateDayReport | MutationKind::CreateProjectReport
        )
    }
}

/// A single pending write, persisted until it is either delivered or
/// exhausted. Entries are replace-on-write; nothing patches them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Unique identifier, generated at enqueue time.
    pub id: Uuid,

    /// Which remote write to replay.
    pub kind: MutationKind,

    /// Operation-specific payload; must survive a JSON round-trip.
    pub payload: serde_json::Value,

    /// Wall-clock insertion time in ms. Diagnostics only; ordering is FIFO
    /// by position in the persisted list.
    pub enqueued_at: i64,

    /// Number of failed dispatch attempts so far.
    pub retry_count: u32,
}
