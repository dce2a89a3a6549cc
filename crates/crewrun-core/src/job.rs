//! Job and TaskRun records.

use crate::{CrewId, JobId, JobStatus, RunId, RunStatus, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One execution instance of a crew against a specific input and budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,

    /// Owning crew identity.
    pub crew_id: CrewId,

    /// Budget ceiling for the whole job (non-negative).
    pub budget_limit: f64,

    /// Current status.
    pub status: JobStatus,

    /// Input payload as a JSON string.
    pub input_json: String,

    /// Failure or halt reason for terminal error/blocked states.
    pub error: Option<String>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending Job.
    pub fn new(crew_id: CrewId, input_json: impl Into<String>, budget_limit: f64) -> Self {
        Self {
            id: JobId::generate(),
            crew_id,
            budget_limit: budget_limit.max(0.0),
            status: JobStatus::Pending,
            input_json: input_json.into(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Builder method to set a specific id (useful for testing).
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One attempt at executing a single task within a job.
///
/// A retried attempt gets a fresh record with an incremented attempt
/// counter; prior attempt records are never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    /// Unique run identifier.
    pub id: RunId,

    /// Owning job identity.
    pub job_id: JobId,

    /// Task this run attempts.
    pub task_id: TaskId,

    /// Attempt counter, starting at 1.
    pub attempt: u32,

    /// Current run status.
    pub status: RunStatus,

    /// Accepted output payload, if the run succeeded.
    pub output: Option<String>,

    /// Cost committed for this attempt.
    pub cost: f64,

    /// When the capability invocation began.
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,

    /// Failure or block reason.
    pub reason: Option<String>,
}

impl TaskRun {
    /// Create a new pending TaskRun.
    pub fn new(job_id: JobId, task_id: TaskId, attempt: u32) -> Self {
        Self {
            id: RunId::generate(),
            job_id,
            task_id,
            attempt,
            status: RunStatus::Pending,
            output: None,
            cost: 0.0,
            started_at: None,
            finished_at: None,
            reason: None,
        }
    }

    /// Mark the run as started.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the run as succeeded with its accepted output and cost.
    pub fn succeed(&mut self, output: impl Into<String>, cost: f64) {
        self.status = RunStatus::Succeeded;
        self.output = Some(output.into());
        self.cost = cost;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run as failed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run as blocked.
    pub fn block(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Blocked;
        self.reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(CrewId::new("crew-1"), "{}", 10.0);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_budget_clamped_non_negative() {
        let job = Job::new(CrewId::new("crew-1"), "{}", -5.0);
        assert_eq!(job.budget_limit, 0.0);
    }

    #[test]
    fn test_run_lifecycle_stamps_timestamps() {
        let mut run = TaskRun::new(JobId::generate(), TaskId::new("write"), 1);
        assert!(run.started_at.is_none());

        run.start();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());

        run.succeed("draft", 2.0);
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.output.as_deref(), Some("draft"));
        assert_eq!(run.cost, 2.0);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_blocked_run_carries_reason() {
        let mut run = TaskRun::new(JobId::generate(), TaskId::new("edit"), 1);
        run.block("upstream_failed:write");
        assert_eq!(run.status, RunStatus::Blocked);
        assert_eq!(run.reason.as_deref(), Some("upstream_failed:write"));
    }
}
