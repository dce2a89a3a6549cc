//! Per-job event emission: durable audit records plus best-effort live
//! progress updates.

use crate::store::SharedStore;
use crewrun_core::{AuditEvent, JobId, ProgressEvent, TaskId};
use tokio::sync::broadcast;
use tracing::error;

/// Emits audit and progress events for one job.
///
/// Audit events are durable and failures to persist them are surfaced in
/// the logs; progress events are fire-and-forget and a job never fails
/// because nobody is listening.
#[derive(Clone)]
pub struct EventEmitter {
    job_id: JobId,
    total_tasks: usize,
    progress_tx: broadcast::Sender<ProgressEvent>,
    store: SharedStore,
}

impl EventEmitter {
    pub fn new(
        job_id: JobId,
        total_tasks: usize,
        progress_tx: broadcast::Sender<ProgressEvent>,
        store: SharedStore,
    ) -> Self {
        Self {
            job_id,
            total_tasks: total_tasks.max(1),
            progress_tx,
            store,
        }
    }

    /// Append a durable audit event.
    pub async fn audit(&self, event: AuditEvent) {
        if let Err(err) = self.store.append_audit(&event).await {
            error!(job_id = %self.job_id, %err, "failed to append audit event");
        }
    }

    /// Broadcast a live progress update. `settled` is the number of
    /// tasks already in a terminal state.
    pub fn progress(
        &self,
        stage: &str,
        settled: usize,
        message: impl Into<String>,
        task_id: Option<TaskId>,
    ) {
        let percent = ((settled * 100) / self.total_tasks).min(100) as u8;
        let event = ProgressEvent::new(self.job_id.clone(), stage, percent, message, task_id);
        // Send fails only when no receiver is subscribed.
        let _ = self.progress_tx.send(event);
    }
}
