//! Persistence seam for crew definitions, jobs, task runs, and audit
//! events, plus the in-memory implementation used by tests and demos.

use async_trait::async_trait;
use crewrun_core::{AuditEvent, CrewDefinition, CrewId, Job, JobId, RunId, TaskRun};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Error produced by the definition store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("crew not found: {0}")]
    CrewNotFound(CrewId),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Storage seam for everything the engine reads and writes.
///
/// Saves are upserts keyed by id; the engine writes whole records on
/// every state change rather than issuing partial updates.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Load a crew definition by id.
    async fn load_crew(&self, id: &CrewId) -> Result<CrewDefinition, StoreError>;

    /// Persist the current state of a job.
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Persist the current state of a task run.
    async fn save_task_run(&self, run: &TaskRun) -> Result<(), StoreError>;

    /// Append an audit event. The audit trail is append-only.
    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError>;
}

/// In-memory store backed by RwLock-protected maps.
#[derive(Default)]
pub struct MemoryStore {
    crews: RwLock<HashMap<CrewId, CrewDefinition>>,
    jobs: RwLock<HashMap<JobId, Job>>,
    runs: RwLock<HashMap<RunId, TaskRun>>,
    audit: RwLock<Vec<AuditEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a crew definition.
    pub async fn put_crew(&self, crew: CrewDefinition) {
        self.crews.write().await.insert(crew.id.clone(), crew);
    }

    /// Fetch a job snapshot by id.
    pub async fn job(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// All task runs for a job, ordered by start of first activity and
    /// then by attempt.
    pub async fn runs_for_job(&self, id: &JobId) -> Vec<TaskRun> {
        let mut runs: Vec<TaskRun> = self
            .runs
            .read()
            .await
            .values()
            .filter(|run| &run.job_id == id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| {
            a.task_id
                .cmp(&b.task_id)
                .then(a.attempt.cmp(&b.attempt))
        });
        runs
    }

    /// The full audit trail for a job, in append order.
    pub async fn audit_for_job(&self, id: &JobId) -> Vec<AuditEvent> {
        self.audit
            .read()
            .await
            .iter()
            .filter(|event| &event.job_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DefinitionStore for MemoryStore {
    async fn load_crew(&self, id: &CrewId) -> Result<CrewDefinition, StoreError> {
        self.crews
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::CrewNotFound(id.clone()))
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn save_task_run(&self, run: &TaskRun) -> Result<(), StoreError> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.audit.write().await.push(event.clone());
        Ok(())
    }
}

/// Shared handle type used throughout the engine.
pub type SharedStore = Arc<dyn DefinitionStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crewrun_core::{AgentSpec, RunStatus, TaskId, TaskSpec};

    fn sample_crew() -> CrewDefinition {
        CrewDefinition::new("crew-1", "Content Crew")
            .with_agent(AgentSpec::new("a1", "Writer"))
            .with_task(TaskSpec::new("write", "Write the post", "a1"))
    }

    #[tokio::test]
    async fn test_load_missing_crew_fails() {
        let store = MemoryStore::new();
        let err = store.load_crew(&CrewId::new("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::CrewNotFound(_)));
    }

    #[tokio::test]
    async fn test_put_then_load_crew() {
        let store = MemoryStore::new();
        store.put_crew(sample_crew()).await;
        let crew = store.load_crew(&CrewId::new("crew-1")).await.unwrap();
        assert_eq!(crew.name, "Content Crew");
    }

    #[tokio::test]
    async fn test_save_job_is_upsert() {
        let store = MemoryStore::new();
        let mut job = Job::new(CrewId::new("crew-1"), "{}", 10.0);
        store.save_job(&job).await.unwrap();
        job.status = crewrun_core::JobStatus::Initializing;
        store.save_job(&job).await.unwrap();

        let loaded = store.job(&job.id).await.unwrap();
        assert_eq!(loaded.status, crewrun_core::JobStatus::Initializing);
    }

    #[tokio::test]
    async fn test_runs_for_job_sorted_by_task_and_attempt() {
        let store = MemoryStore::new();
        let job_id = JobId::generate();

        let mut second = TaskRun::new(job_id.clone(), TaskId::new("write"), 2);
        second.status = RunStatus::Failed;
        let first = TaskRun::new(job_id.clone(), TaskId::new("write"), 1);
        let other = TaskRun::new(JobId::generate(), TaskId::new("write"), 1);

        store.save_task_run(&second).await.unwrap();
        store.save_task_run(&first).await.unwrap();
        store.save_task_run(&other).await.unwrap();

        let runs = store.runs_for_job(&job_id).await;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].attempt, 1);
        assert_eq!(runs[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_audit_preserves_append_order() {
        let store = MemoryStore::new();
        let job_id = JobId::generate();
        let run_id = RunId::generate();
        store
            .append_audit(&AuditEvent::task_started(
                job_id.clone(),
                TaskId::new("write"),
                &run_id,
                1,
            ))
            .await
            .unwrap();
        store
            .append_audit(&AuditEvent::task_succeeded(
                job_id.clone(),
                TaskId::new("write"),
                &run_id,
                0.5,
            ))
            .await
            .unwrap();

        let trail = store.audit_for_job(&job_id).await;
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, crewrun_core::AuditAction::TaskStarted);
        assert_eq!(trail[1].action, crewrun_core::AuditAction::TaskSucceeded);
    }
}
