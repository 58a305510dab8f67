use serde_json::json;
use tracing::warn;

use crate::error::{ReportError, StorageError};
use crate::models::{LocalReport, MutationKind, ReportDraft};
use crate::queue::MutationQueue;
use crate::remote::RemoteBackend;
use crate::reports::ReportStore;

/// How a report submission ended. `SavedLocally` is a success from the
/// user's point of view: the report is durable and will sync later. It must
/// never be presented as a bare error.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The remote write succeeded immediately.
    Synced { report: LocalReport },
    /// The remote write failed; the report is persisted locally and a
    /// mutation is queued for the next flush.
    SavedLocally { report: LocalReport, pending: usize },
}

impl SubmitOutcome {
    pub fn report(&self) -> &LocalReport {
        match self {
            SubmitOutcome::Synced { report } => report,
            SubmitOutcome::SavedLocally { report, .. } => report,
        }
    }
}

/// Create a new report: persist locally first, unconditionally, then attempt
/// an immediate remote write, falling back to the mutation queue on failure.
///
/// The queued payload embeds the report's `local_id` so a later background
/// flush can mark the local record synced without this caller being around
/// (see [`crate::sync::SyncDispatcher`]).
pub async fn submit_report(
    reports: &ReportStore,
    queue: &MutationQueue,
    backend: &dyn RemoteBackend,
    draft: ReportDraft,
) -> Result<SubmitOutcome, ReportError> {
    let report = reports.create(draft)?;

    let mut payload = serde_json::to_value(&report.data).map_err(StorageError::from)?;
    payload["local_id"] = json!(report.local_id);

    match backend.create_project_report(&payload).await {
        Ok(remote_id) => {
            let report = reports.mark_synced(report.local_id, &remote_id)?;
            Ok(SubmitOutcome::Synced { report })
        }
        Err(err) => {
            warn!(local_id = %report.local_id, error = %err, "immediate report write failed, queueing");
            queue.enqueue(MutationKind::CreateProjectReport, payload)?;
            let pending = queue.pending_count()?;
            Ok(SubmitOutcome::SavedLocally { report, pending })
        }
    }
}
