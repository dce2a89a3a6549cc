//! Audit records and live progress events.

use crate::{EventId, JobId, JobStatus, RunId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Action tag carried by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Job-level status transition.
    JobTransition,
    /// A task attempt began executing.
    TaskStarted,
    /// A task attempt succeeded with an accepted output.
    TaskSucceeded,
    /// A task attempt failed.
    TaskFailed,
    /// A task was blocked without executing.
    TaskBlocked,
    /// An amount was committed to the cost ledger.
    CostCommitted,
    /// The safety gate evaluated a produced output.
    SafetyCheck,
}

/// Write-only audit record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: EventId,

    /// Owning job identity.
    pub job_id: JobId,

    /// Task this event concerns, if task-scoped.
    pub task_id: Option<TaskId>,

    /// Action tag.
    pub action: AuditAction,

    /// Structured metadata.
    pub metadata: HashMap<String, String>,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(
        job_id: JobId,
        task_id: Option<TaskId>,
        action: AuditAction,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            job_id,
            task_id,
            action,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Record a job-level status transition.
    pub fn job_transition(
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
        reason: Option<&str>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("from".to_string(), from.to_string());
        metadata.insert("to".to_string(), to.to_string());
        if let Some(reason) = reason {
            metadata.insert("reason".to_string(), reason.to_string());
        }
        Self::new(job_id, None, AuditAction::JobTransition, metadata)
    }

    /// Record the start of a task attempt.
    pub fn task_started(job_id: JobId, task_id: TaskId, run_id: &RunId, attempt: u32) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), run_id.to_string());
        metadata.insert("attempt".to_string(), attempt.to_string());
        Self::new(job_id, Some(task_id), AuditAction::TaskStarted, metadata)
    }

    /// Record a succeeded task attempt.
    pub fn task_succeeded(job_id: JobId, task_id: TaskId, run_id: &RunId, cost: f64) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), run_id.to_string());
        metadata.insert("cost".to_string(), format!("{:.4}", cost));
        Self::new(job_id, Some(task_id), AuditAction::TaskSucceeded, metadata)
    }

    /// Record a failed task attempt.
    pub fn task_failed(
        job_id: JobId,
        task_id: TaskId,
        run_id: &RunId,
        attempt: u32,
        reason: &str,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), run_id.to_string());
        metadata.insert("attempt".to_string(), attempt.to_string());
        metadata.insert("reason".to_string(), reason.to_string());
        Self::new(job_id, Some(task_id), AuditAction::TaskFailed, metadata)
    }

    /// Record a blocked task.
    pub fn task_blocked(job_id: JobId, task_id: TaskId, reason: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), reason.to_string());
        Self::new(job_id, Some(task_id), AuditAction::TaskBlocked, metadata)
    }

    /// Record a ledger commit.
    pub fn cost_committed(
        job_id: JobId,
        task_id: TaskId,
        run_id: &RunId,
        amount: f64,
        total: f64,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), run_id.to_string());
        metadata.insert("amount".to_string(), format!("{:.4}", amount));
        metadata.insert("total".to_string(), format!("{:.4}", total));
        Self::new(job_id, Some(task_id), AuditAction::CostCommitted, metadata)
    }

    /// Record a safety gate evaluation.
    pub fn safety_check(
        job_id: JobId,
        task_id: TaskId,
        verdict: &str,
        redactions: usize,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("verdict".to_string(), verdict.to_string());
        metadata.insert("redactions".to_string(), redactions.to_string());
        Self::new(job_id, Some(task_id), AuditAction::SafetyCheck, metadata)
    }
}

/// Live progress event for the per-job update channel.
///
/// Consumers may join mid-stream: each event carries enough context that
/// the most recent one plus Job/TaskRun state reconstructs current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Owning job identity.
    pub job_id: JobId,

    /// Stage tag (e.g., "task_started", "job_done").
    pub stage: String,

    /// Share of tasks in a terminal state, 0-100.
    pub percent: u8,

    /// Human-readable message.
    pub message: String,

    /// Task this event concerns, if task-scoped.
    pub task_id: Option<TaskId>,

    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create a new progress event.
    pub fn new(
        job_id: JobId,
        stage: impl Into<String>,
        percent: u8,
        message: impl Into<String>,
        task_id: Option<TaskId>,
    ) -> Self {
        Self {
            job_id,
            stage: stage.into(),
            percent: percent.min(100),
            message: message.into(),
            task_id,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_transition_metadata() {
        let event = AuditEvent::job_transition(
            JobId::generate(),
            JobStatus::Running,
            JobStatus::Blocked,
            Some("budget_exceeded"),
        );
        assert_eq!(event.action, AuditAction::JobTransition);
        assert_eq!(event.metadata.get("from"), Some(&"running".to_string()));
        assert_eq!(event.metadata.get("to"), Some(&"blocked".to_string()));
        assert_eq!(
            event.metadata.get("reason"),
            Some(&"budget_exceeded".to_string())
        );
        assert!(event.task_id.is_none());
    }

    #[test]
    fn test_task_failed_metadata() {
        let run_id = RunId::generate();
        let event = AuditEvent::task_failed(
            JobId::generate(),
            TaskId::new("write"),
            &run_id,
            2,
            "timed out after 30s",
        );
        assert_eq!(event.metadata.get("attempt"), Some(&"2".to_string()));
        assert_eq!(event.task_id, Some(TaskId::new("write")));
    }

    #[test]
    fn test_progress_percent_is_clamped() {
        let event = ProgressEvent::new(JobId::generate(), "job_done", 150, "done", None);
        assert_eq!(event.percent, 100);
    }
}
