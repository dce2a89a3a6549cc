//! Job lifecycle state machine.
//!
//! All job-level status changes flow through one place so the sanctioned
//! transition table is enforced, timestamps get stamped, the change is
//! persisted, and observers hear about it.

use crate::emitter::EventEmitter;
use crate::error::EngineError;
use crate::store::SharedStore;
use chrono::Utc;
use crewrun_core::{AuditEvent, Job, JobStatus};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::info;

/// Drives one job through its sanctioned status transitions.
#[derive(Clone)]
pub struct JobStateMachine {
    job: Arc<RwLock<Job>>,
    status_tx: Arc<watch::Sender<JobStatus>>,
    store: SharedStore,
    emitter: EventEmitter,
}

impl JobStateMachine {
    pub fn new(
        job: Arc<RwLock<Job>>,
        status_tx: Arc<watch::Sender<JobStatus>>,
        store: SharedStore,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            job,
            status_tx,
            store,
            emitter,
        }
    }

    /// Snapshot of the current job record.
    pub async fn snapshot(&self) -> Job {
        self.job.read().await.clone()
    }

    /// Apply one transition. Rejects anything outside the transition
    /// table; terminal states additionally stamp `completed_at` and
    /// error/blocked states record the reason on the job.
    pub async fn transition(
        &self,
        to: JobStatus,
        reason: Option<&str>,
    ) -> Result<(), EngineError> {
        let (from, snapshot) = {
            let mut job = self.job.write().await;
            let from = job.status;
            if !from.can_transition_to(to) {
                return Err(EngineError::InvalidTransition { from, to });
            }

            job.status = to;
            match to {
                JobStatus::Error | JobStatus::Blocked => {
                    job.error = reason.map(str::to_string);
                    job.completed_at = Some(Utc::now());
                }
                JobStatus::Done => {
                    job.error = None;
                    job.completed_at = Some(Utc::now());
                }
                JobStatus::Initializing => {
                    // Retry path: clear the previous failure.
                    job.error = None;
                    job.completed_at = None;
                }
                _ => {}
            }
            (from, job.clone())
        };

        info!(
            job_id = %snapshot.id,
            from = %from,
            to = %to,
            reason = reason.unwrap_or(""),
            "job transition"
        );

        self.store.save_job(&snapshot).await?;
        self.emitter
            .audit(AuditEvent::job_transition(
                snapshot.id.clone(),
                from,
                to,
                reason,
            ))
            .await;
        let _ = self.status_tx.send(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crewrun_core::{AuditAction, CrewId};
    use tokio::sync::broadcast;

    fn machine() -> (JobStateMachine, Arc<MemoryStore>, watch::Receiver<JobStatus>) {
        let store = Arc::new(MemoryStore::new());
        let job = Job::new(CrewId::new("crew-1"), "{}", 10.0);
        let (status_tx, status_rx) = watch::channel(job.status);
        let (progress_tx, _) = broadcast::channel(16);
        let emitter = EventEmitter::new(job.id.clone(), 1, progress_tx, store.clone());
        let machine = JobStateMachine::new(
            Arc::new(RwLock::new(job)),
            Arc::new(status_tx),
            store.clone(),
            emitter,
        );
        (machine, store, status_rx)
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let (machine, store, rx) = machine();
        machine.transition(JobStatus::Initializing, None).await.unwrap();
        machine.transition(JobStatus::Running, None).await.unwrap();
        machine.transition(JobStatus::Done, None).await.unwrap();

        assert_eq!(*rx.borrow(), JobStatus::Done);
        let job = machine.snapshot().await;
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());
        assert_eq!(store.job(&job.id).await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_rejected() {
        let (machine, _store, _rx) = machine();
        let err = machine
            .transition(JobStatus::Done, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Done
            }
        ));
        assert_eq!(machine.snapshot().await.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_blocked_records_reason() {
        let (machine, store, _rx) = machine();
        machine.transition(JobStatus::Initializing, None).await.unwrap();
        machine.transition(JobStatus::Running, None).await.unwrap();
        machine
            .transition(JobStatus::Blocked, Some("budget_exceeded"))
            .await
            .unwrap();

        let job = machine.snapshot().await;
        assert_eq!(job.error.as_deref(), Some("budget_exceeded"));

        let trail = store.audit_for_job(&job.id).await;
        assert!(trail
            .iter()
            .any(|e| e.action == AuditAction::JobTransition
                && e.metadata.get("reason").map(String::as_str) == Some("budget_exceeded")));
    }

    #[tokio::test]
    async fn test_retry_clears_prior_failure() {
        let (machine, _store, _rx) = machine();
        machine.transition(JobStatus::Initializing, None).await.unwrap();
        machine.transition(JobStatus::Running, None).await.unwrap();
        machine
            .transition(JobStatus::Error, Some("task 'write' failed"))
            .await
            .unwrap();
        machine.transition(JobStatus::Initializing, None).await.unwrap();

        let job = machine.snapshot().await;
        assert_eq!(job.status, JobStatus::Initializing);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());
    }
}
