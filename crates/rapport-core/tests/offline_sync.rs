//! End-to-end tests for the offline mutation queue and the sync dispatcher:
//! enqueue while offline, flush when connectivity returns, retry ceiling,
//! and reconciliation of locally created reports.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rapport_core::clock::ManualClock;
use rapport_core::error::RemoteError;
use rapport_core::models::{MutationKind, ReportDraft};
use rapport_core::queue::{MutationQueue, MAX_RETRIES};
use rapport_core::remote::{Connectivity, RemoteBackend};
use rapport_core::reports::ReportStore;
use rapport_core::storage::MemoryKv;
use rapport_core::submit::{submit_report, SubmitOutcome};
use rapport_core::sync::{FlushOutcome, SyncDispatcher};

#[derive(Clone, Copy)]
enum Mode {
    Accept,
    FailTransient,
    FailPermanent,
}

/// Backend fake: answers every write according to the current mode and
/// records the order of dispatched kinds.
struct ScriptedBackend {
    mode: Mutex<Mode>,
    calls: Mutex<Vec<MutationKind>>,
    accepted: AtomicUsize,
}

impl ScriptedBackend {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            calls: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
        })
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn calls(&self) -> Vec<MutationKind> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, kind: MutationKind) -> Result<String, RemoteError> {
        self.calls.lock().unwrap().push(kind);
        match *self.mode.lock().unwrap() {
            Mode::Accept => {
                let n = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("srv-{n}"))
            }
            Mode::FailTransient => Err(RemoteError::Transient("connection reset".to_string())),
            Mode::FailPermanent => Err(RemoteError::Permanent("422 validation failed".to_string())),
        }
    }
}

#[async_trait]
impl RemoteBackend for ScriptedBackend {
    async fn create_time_entry(&self, _: &Value) -> Result<String, RemoteError> {
        self.respond(MutationKind::CreateTimeEntry)
    }
    async fn update_task_status(&self, _: &Value) -> Result<String, RemoteError> {
        self.respond(MutationKind::UpdateTaskStatus)
    }
    async fn add_note(&self, _: &Value) -> Result<String, RemoteError> {
        self.respond(MutationKind::AddNote)
    }
    async fn create_photo_record(&self, _: &Value) -> Result<String, RemoteError> {
        self.respond(MutationKind::CreatePhotoRecord)
    }
    async fn create_day_report(&self, _: &Value) -> Result<String, RemoteError> {
        self.respond(MutationKind::CreateDayReport)
    }
    async fn create_project_report(&self, _: &Value) -> Result<String, RemoteError> {
        self.respond(MutationKind::CreateProjectReport)
    }
}

struct Online(AtomicBool);

impl Online {
    fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(connected)))
    }

    fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for Online {
    async fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Harness {
    kv: Arc<MemoryKv>,
    clock: Arc<ManualClock>,
    queue: Arc<MutationQueue>,
    reports: Arc<ReportStore>,
    backend: Arc<ScriptedBackend>,
    online: Arc<Online>,
    dispatcher: SyncDispatcher,
}

fn harness(mode: Mode, connected: bool) -> Harness {
    let kv = Arc::new(MemoryKv::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let queue = Arc::new(MutationQueue::new(kv.clone(), clock.clone()));
    let reports = Arc::new(ReportStore::new(kv.clone(), clock.clone()));
    let backend = ScriptedBackend::new(mode);
    let online = Online::new(connected);
    let dispatcher = SyncDispatcher::new(
        queue.clone(),
        reports.clone(),
        backend.clone(),
        online.clone(),
    );
    Harness {
        kv,
        clock,
        queue,
        reports,
        backend,
        online,
        dispatcher,
    }
}

fn draft(customer: &str) -> ReportDraft {
    ReportDraft {
        tenant_id: "acme".to_string(),
        customer: customer.to_string(),
        project_number: "P-100".to_string(),
        project_name: "Hall B".to_string(),
        work_location: "Hamburg".to_string(),
        work_date: "2024-03-15".to_string(),
        total_hours: 8.0,
        work_description: "Cable tray installation".to_string(),
        trade: "electrical".to_string(),
        work_lines: Vec::new(),
    }
}

#[tokio::test]
async fn flush_dispatches_in_fifo_order_and_drains_the_queue() {
    let h = harness(Mode::Accept, true);

    h.queue
        .enqueue(MutationKind::CreateTimeEntry, json!({"hours": 4}))
        .unwrap();
    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "pump replaced"}))
        .unwrap();
    h.queue
        .enqueue(MutationKind::UpdateTaskStatus, json!({"task": 7}))
        .unwrap();

    let outcome = h.dispatcher.flush().await.unwrap();

    assert_eq!(
        outcome,
        FlushOutcome {
            succeeded: 3,
            failed: 0
        }
    );
    assert_eq!(
        h.backend.calls(),
        vec![
            MutationKind::CreateTimeEntry,
            MutationKind::AddNote,
            MutationKind::UpdateTaskStatus,
        ]
    );
    assert_eq!(h.queue.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn offline_flush_touches_nothing() {
    let h = harness(Mode::Accept, false);

    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "offline"}))
        .unwrap();

    let outcome = h.dispatcher.flush().await.unwrap();

    assert_eq!(outcome, FlushOutcome::default());
    assert!(h.backend.calls().is_empty());
    let pending = h.queue.peek_all().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 0);
}

#[tokio::test]
async fn transient_failures_retry_then_drop_at_the_ceiling() {
    let h = harness(Mode::FailTransient, true);

    h.queue
        .enqueue(MutationKind::CreateTimeEntry, json!({"hours": 2}))
        .unwrap();

    // Passes 1..=MAX_RETRIES leave the mutation queued with a bumped count.
    for expected_count in 1..=MAX_RETRIES {
        let outcome = h.dispatcher.flush().await.unwrap();
        assert_eq!(outcome, FlushOutcome::default());
        let pending = h.queue.peek_all().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, expected_count);
    }

    // The next pass is the final attempt: the mutation is dropped for good.
    let outcome = h.dispatcher.flush().await.unwrap();
    assert_eq!(
        outcome,
        FlushOutcome {
            succeeded: 0,
            failed: 1
        }
    );
    assert_eq!(h.queue.pending_count().unwrap(), 0);
    assert_eq!(h.backend.calls().len(), MAX_RETRIES as usize + 1);

    let dead = h.queue.dead_letters().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].mutation.kind, MutationKind::CreateTimeEntry);

    // Nothing left: further flushes are no-ops.
    let outcome = h.dispatcher.flush().await.unwrap();
    assert_eq!(outcome, FlushOutcome::default());
}

#[tokio::test]
async fn flush_sees_mutations_enqueued_by_another_queue_instance() {
    let h = harness(Mode::Accept, true);

    // Warm this instance's cache while the queue is still empty.
    assert_eq!(h.queue.pending_count().unwrap(), 0);

    // A second process (the CLI beside the daemon) enqueues over the same
    // backing store.
    let cli_queue = Arc::new(MutationQueue::new(h.kv.clone(), h.clock.clone()));
    cli_queue
        .enqueue(MutationKind::CreateTimeEntry, json!({"hours": 3}))
        .unwrap();

    let outcome = h.dispatcher.flush().await.unwrap();

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(h.backend.calls(), vec![MutationKind::CreateTimeEntry]);
    assert_eq!(h.queue.pending_count().unwrap(), 0);
    assert!(cli_queue.reload().unwrap().is_empty());
}

#[tokio::test]
async fn flush_commit_keeps_mutations_enqueued_while_the_pass_runs() {
    let h = harness(Mode::FailTransient, true);

    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "first"}))
        .unwrap();

    // Stand-in for a slow server: while the daemon's pass is dispatching,
    // another process enqueues into the shared store.
    struct EnqueueMidPass {
        inner: Arc<ScriptedBackend>,
        other: Arc<MutationQueue>,
    }

    #[async_trait]
    impl RemoteBackend for EnqueueMidPass {
        async fn create_time_entry(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_time_entry(p).await
        }
        async fn update_task_status(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.update_task_status(p).await
        }
        async fn add_note(&self, p: &Value) -> Result<String, RemoteError> {
            self.other
                .enqueue(MutationKind::CreateTimeEntry, json!({"hours": 2}))
                .unwrap();
            self.inner.add_note(p).await
        }
        async fn create_photo_record(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_photo_record(p).await
        }
        async fn create_day_report(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_day_report(p).await
        }
        async fn create_project_report(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_project_report(p).await
        }
    }

    let cli_queue = Arc::new(MutationQueue::new(h.kv.clone(), h.clock.clone()));
    let backend = Arc::new(EnqueueMidPass {
        inner: h.backend.clone(),
        other: cli_queue,
    });
    let dispatcher = SyncDispatcher::new(
        h.queue.clone(),
        h.reports.clone(),
        backend,
        h.online.clone(),
    );

    let outcome = dispatcher.flush().await.unwrap();
    assert_eq!(outcome, FlushOutcome::default());

    // A cold view of the store has both: the retried first entry and the
    // mutation that arrived mid-pass, in that order, neither destroyed.
    let cold = MutationQueue::new(h.kv.clone(), h.clock.clone());
    let pending = cold.peek_all().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].kind, MutationKind::AddNote);
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(pending[1].kind, MutationKind::CreateTimeEntry);
    assert_eq!(pending[1].retry_count, 0);
}

#[tokio::test]
async fn concurrent_trigger_is_dropped_while_a_pass_is_in_flight() {
    let h = harness(Mode::Accept, true);

    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "slow"}))
        .unwrap();

    // Backend that parks inside its first call until the test releases it.
    struct GatedBackend {
        inner: Arc<ScriptedBackend>,
        started: tokio::sync::mpsc::UnboundedSender<()>,
        gate: Arc<tokio::sync::Semaphore>,
    }

    impl GatedBackend {
        async fn wait_for_release(&self) {
            let _ = self.started.send(());
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
        }
    }

    #[async_trait]
    impl RemoteBackend for GatedBackend {
        async fn create_time_entry(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_time_entry(p).await
        }
        async fn update_task_status(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.update_task_status(p).await
        }
        async fn add_note(&self, p: &Value) -> Result<String, RemoteError> {
            self.wait_for_release().await;
            self.inner.add_note(p).await
        }
        async fn create_photo_record(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_photo_record(p).await
        }
        async fn create_day_report(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_day_report(p).await
        }
        async fn create_project_report(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_project_report(p).await
        }
    }

    let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let backend = Arc::new(GatedBackend {
        inner: h.backend.clone(),
        started: started_tx,
        gate: gate.clone(),
    });
    let dispatcher = Arc::new(SyncDispatcher::new(
        h.queue.clone(),
        h.reports.clone(),
        backend,
        h.online.clone(),
    ));

    let running = dispatcher.clone();
    let pass = tokio::spawn(async move { running.flush().await });

    // Wait until the pass is inside its backend call, then trigger again.
    started_rx.recv().await.unwrap();
    assert!(dispatcher.try_flush().await.unwrap().is_none());

    gate.add_permits(1);
    let outcome = pass.await.unwrap().unwrap();
    assert_eq!(outcome.succeeded, 1);

    // Exactly one dispatch: the dropped trigger never ran a second pass.
    assert_eq!(h.backend.calls().len(), 1);
    assert_eq!(h.queue.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn permanent_rejection_drops_without_retrying() {
    let h = harness(Mode::FailPermanent, true);

    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "bad payload"}))
        .unwrap();

    let outcome = h.dispatcher.flush().await.unwrap();

    assert_eq!(
        outcome,
        FlushOutcome {
            succeeded: 0,
            failed: 1
        }
    );
    assert_eq!(h.backend.calls().len(), 1);
    assert_eq!(h.queue.pending_count().unwrap(), 0);
    assert_eq!(h.queue.dead_letters().unwrap().len(), 1);
}

#[tokio::test]
async fn dead_letters_can_be_discarded() {
    let h = harness(Mode::FailPermanent, true);

    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "rejected"}))
        .unwrap();
    h.dispatcher.flush().await.unwrap();
    assert_eq!(h.queue.dead_letters().unwrap().len(), 1);

    h.queue.clear_dead_letters().unwrap();
    assert!(h.queue.dead_letters().unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_mutation_does_not_block_the_rest() {
    let h = harness(Mode::Accept, true);

    h.queue
        .enqueue(MutationKind::CreateTimeEntry, json!({"hours": 1}))
        .unwrap();
    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "a"}))
        .unwrap();

    // First mutation succeeds, then the server starts refusing.
    struct FlipAfterFirst {
        inner: Arc<ScriptedBackend>,
    }

    #[async_trait]
    impl RemoteBackend for FlipAfterFirst {
        async fn create_time_entry(&self, p: &Value) -> Result<String, RemoteError> {
            let result = self.inner.create_time_entry(p).await;
            self.inner.set_mode(Mode::FailTransient);
            result
        }
        async fn update_task_status(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.update_task_status(p).await
        }
        async fn add_note(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.add_note(p).await
        }
        async fn create_photo_record(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_photo_record(p).await
        }
        async fn create_day_report(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_day_report(p).await
        }
        async fn create_project_report(&self, p: &Value) -> Result<String, RemoteError> {
            self.inner.create_project_report(p).await
        }
    }

    let flipping = Arc::new(FlipAfterFirst {
        inner: h.backend.clone(),
    });
    let dispatcher = SyncDispatcher::new(
        h.queue.clone(),
        h.reports.clone(),
        flipping,
        h.online.clone(),
    );

    let outcome = dispatcher.flush().await.unwrap();

    assert_eq!(
        outcome,
        FlushOutcome {
            succeeded: 1,
            failed: 0
        }
    );
    let pending = h.queue.peek_all().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, MutationKind::AddNote);
    assert_eq!(pending[0].retry_count, 1);
}

#[tokio::test]
async fn queue_survives_a_process_restart() {
    let h = harness(Mode::Accept, true);

    h.queue
        .enqueue(MutationKind::CreatePhotoRecord, json!({"path": "p.jpg"}))
        .unwrap();
    h.queue
        .enqueue(MutationKind::AddNote, json!({"text": "b"}))
        .unwrap();

    // Same backing store, fresh queue instance with a cold cache.
    let restarted = Arc::new(MutationQueue::new(h.kv.clone(), h.clock.clone()));
    let pending = restarted.peek_all().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].kind, MutationKind::CreatePhotoRecord);
    assert_eq!(pending[1].kind, MutationKind::AddNote);

    let dispatcher = SyncDispatcher::new(
        restarted.clone(),
        h.reports.clone(),
        h.backend.clone(),
        h.online.clone(),
    );
    let outcome = dispatcher.flush().await.unwrap();
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(restarted.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn submit_syncs_immediately_when_the_server_accepts() {
    let h = harness(Mode::Accept, true);

    let outcome = submit_report(&h.reports, &h.queue, h.backend.as_ref(), draft("Meyer"))
        .await
        .unwrap();

    let SubmitOutcome::Synced { report } = outcome else {
        panic!("expected immediate sync");
    };
    assert!(report.synced);
    assert_eq!(report.remote_id.as_deref(), Some("srv-1"));
    assert_eq!(h.queue.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn submit_falls_back_to_the_queue_and_background_flush_reconciles() {
    let h = harness(Mode::FailTransient, true);

    let outcome = submit_report(&h.reports, &h.queue, h.backend.as_ref(), draft("Schulz"))
        .await
        .unwrap();

    let SubmitOutcome::SavedLocally { report, pending } = outcome else {
        panic!("expected local fallback");
    };
    assert_eq!(pending, 1);
    assert!(!report.synced);

    // The report is durable even though the remote write failed.
    let stored = h.reports.get(report.local_id).unwrap().unwrap();
    assert!(!stored.synced);
    assert!(stored.remote_id.is_none());

    // Connectivity returns; the background flush delivers the queued
    // mutation and marks the local record synced via the embedded local_id.
    h.backend.set_mode(Mode::Accept);
    let outcome = h.dispatcher.flush().await.unwrap();
    assert_eq!(outcome.succeeded, 1);

    let stored = h.reports.get(report.local_id).unwrap().unwrap();
    assert!(stored.synced);
    assert!(stored.remote_id.is_some());
    assert_eq!(h.queue.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn coming_online_after_offline_flushes_the_backlog() {
    let h = harness(Mode::Accept, false);

    h.queue
        .enqueue(MutationKind::CreateDayReport, json!({"date": "2024-03-15"}))
        .unwrap();

    assert_eq!(h.dispatcher.flush().await.unwrap(), FlushOutcome::default());
    assert_eq!(h.queue.pending_count().unwrap(), 1);

    h.online.set(true);
    let outcome = h.dispatcher.flush().await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(h.queue.pending_count().unwrap(), 0);
}
