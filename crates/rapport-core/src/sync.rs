use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::QueuedMutation;
use crate::queue::{MutationQueue, MAX_RETRIES};
use crate::remote::{dispatch, Connectivity, RemoteBackend};
use crate::reports::ReportStore;

/// Result of one flush pass, for the caller to report to the user or to
/// telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// Drains the mutation queue: attempts each pending mutation exactly once
/// per flush pass, in FIFO order, and commits the surviving entries in a
/// single diff-based write that leaves concurrently enqueued entries alone.
///
/// Dispatch is strictly sequential; queued mutations are often causally
/// related (two time entries for the same day), so concurrent delivery could
/// leave the remote store inconsistent. A pass never exits early on failure:
/// one broken mutation cannot block the rest of the queue.
pub struct SyncDispatcher {
    queue: Arc<MutationQueue>,
    reports: Arc<ReportStore>,
    backend: Arc<dyn RemoteBackend>,
    connectivity: Arc<dyn Connectivity>,
    // At most one flush pass in flight; the cache inside the queue is not
    // built for concurrent passes.
    flush_lock: tokio::sync::Mutex<()>,
}

impl SyncDispatcher {
    pub fn new(
        queue: Arc<MutationQueue>,
        reports: Arc<ReportStore>,
        backend: Arc<dyn RemoteBackend>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            queue,
            reports,
            backend,
            connectivity,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one flush pass, waiting if another pass is currently running.
    pub async fn flush(&self) -> Result<FlushOutcome, StorageError> {
        let _guard = self.flush_lock.lock().await;
        self.flush_pass().await
    }

    /// Run one flush pass unless one is already in flight, in which case the
    /// trigger is dropped. Connectivity triggers are edge signals, not work
    /// items; a pass that is already running will pick the queue up anyway.
    pub async fn try_flush(&self) -> Result<Option<FlushOutcome>, StorageError> {
        match self.flush_lock.try_lock() {
            Ok(_guard) => Ok(Some(self.flush_pass().await?)),
            Err(_) => {
                debug!("flush already in flight, dropping trigger");
                Ok(None)
            }
        }
    }

    async fn flush_pass(&self) -> Result<FlushOutcome, StorageError> {
        // Definitively offline is a short-circuit, not a failure.
        if !self.connectivity.is_connected().await {
            debug!("offline, skipping flush");
            return Ok(FlushOutcome::default());
        }

        // Another process (CLI beside the daemon) may have enqueued since
        // this queue's cache warmed; a pass always starts from the store.
        let pending = self.queue.reload()?;
        if pending.is_empty() {
            return Ok(FlushOutcome::default());
        }

        info!(count = pending.len(), "starting flush pass");

        let seen: Vec<Uuid> = pending.iter().map(|m| m.id).collect();
        let mut outcome = FlushOutcome::default();
        let mut remaining: Vec<QueuedMutation> = Vec::new();

        for mutation in pending {
            match dispatch(self.backend.as_ref(), mutation.kind, &mutation.payload).await {
                Ok(remote_id) => {
                    debug!(kind = mutation.kind.as_str(), id = %mutation.id, "mutation flushed");
                    outcome.succeeded += 1;
                    self.reconcile_report(&mutation, &remote_id);
                }
                Err(err) if err.is_permanent() => {
                    // Retrying a rejected payload wastes attempts on a write
                    // that can never succeed.
                    warn!(
                        kind = mutation.kind.as_str(),
                        id = %mutation.id,
                        error = %err,
                        "mutation rejected by server, dropping"
                    );
                    outcome.failed += 1;
                    self.queue.push_dead_letter(mutation, &err.to_string())?;
                }
                Err(err) => {
                    if mutation.retry_count < MAX_RETRIES {
                        warn!(
                            kind = mutation.kind.as_str(),
                            id = %mutation.id,
                            retry_count = mutation.retry_count + 1,
                            error = %err,
                            "mutation failed, will retry"
                        );
                        remaining.push(QueuedMutation {
                            retry_count: mutation.retry_count + 1,
                            ..mutation
                        });
                    } else {
                        warn!(
                            kind = mutation.kind.as_str(),
                            id = %mutation.id,
                            error = %err,
                            "mutation exceeded max retries, dropping"
                        );
                        outcome.failed += 1;
                        self.queue.push_dead_letter(mutation, &err.to_string())?;
                    }
                }
            }
        }

        self.queue.commit_flush(&seen, remaining)?;

        if outcome.succeeded > 0 || outcome.failed > 0 {
            info!(
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                "flush pass complete"
            );
        }
        Ok(outcome)
    }

    /// A queued report creation embeds the report's `local_id` in its
    /// payload; once the remote write lands, mark the matching local record
    /// synced even though the original submitter is long gone.
    fn reconcile_report(&self, mutation: &QueuedMutation, remote_id: &str) {
        if !mutation.kind.is_report_creation() {
            return;
        }
        let Some(local_id) = mutation
            .payload
            .get("local_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            warn!(id = %mutation.id, "queued report mutation has no usable local_id");
            return;
        };
        if let Err(err) = self.reports.mark_synced(local_id, remote_id) {
            warn!(%local_id, error = %err, "failed to mark local report synced");
        }
    }
}
