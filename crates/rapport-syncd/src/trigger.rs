use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use rapport_core::remote::Connectivity;

/// Moments at which a flush pass should run. The trigger itself holds no
/// state and makes no sync decisions.
#[derive(Debug, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Daemon start: an eager first attempt in case mutations were queued in
    /// a previous session.
    Startup,
    /// The connectivity probe observed an offline-to-online transition.
    CameOnline,
}

/// Watches network state and emits flush triggers. Dropping the handle (or
/// calling [`ConnectivityTrigger::stop`]) tears the observer down.
pub struct ConnectivityTrigger {
    rx: UnboundedReceiver<TriggerEvent>,
    task: JoinHandle<()>,
}

impl ConnectivityTrigger {
    pub fn spawn(probe: Arc<dyn Connectivity>, poll_interval: Duration) -> Self {
        let (tx, rx) = unbounded_channel();
        let task = tokio::spawn(run_probe_loop(probe, poll_interval, tx));
        Self { rx, task }
    }

    pub async fn recv(&mut self) -> Option<TriggerEvent> {
        self.rx.recv().await
    }

    pub fn stop(self) {
        // Drop handles the abort.
    }
}

impl Drop for ConnectivityTrigger {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_probe_loop(
    probe: Arc<dyn Connectivity>,
    poll_interval: Duration,
    tx: UnboundedSender<TriggerEvent>,
) {
    // Startup fires regardless of current state; the dispatcher
    // short-circuits on its own connectivity check if we are offline.
    let mut was_online = probe.is_connected().await;
    if tx.send(TriggerEvent::Startup).is_err() {
        return;
    }

    loop {
        tokio::time::sleep(poll_interval).await;
        let online = probe.is_connected().await;
        if online && !was_online {
            debug!("network reconnected");
            if tx.send(TriggerEvent::CameOnline).is_err() {
                break;
            }
        }
        was_online = online;
    }
}
