//! Public engine facade: job submission, cancellation, retry, and
//! observation.

use crate::capability::CapabilityRegistry;
use crate::config::{EngineConfig, RunRequest};
use crate::emitter::EventEmitter;
use crate::error::EngineError;
use crate::machine::JobStateMachine;
use crate::runner::TaskRunner;
use crate::safety::SafetyGate;
use crate::scheduler::{ScheduleResult, Scheduler};
use crate::sink::{DeliverySink, JobDelivery};
use crate::store::SharedStore;
use crewrun_core::{
    CostLedger, CrewId, Job, JobId, JobStatus, ProgressEvent, TaskGraph, TaskId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Per-job bookkeeping held by the engine for the job's lifetime.
struct JobEntry {
    request: RunRequest,
    cancel: CancellationToken,
    progress_tx: broadcast::Sender<ProgressEvent>,
    job: Arc<RwLock<Job>>,
    status_tx: Arc<watch::Sender<JobStatus>>,
    status_rx: watch::Receiver<JobStatus>,
    /// Accepted outputs from the most recent pass, declaration-ordered.
    outputs: Vec<(TaskId, String)>,
    /// Committed spend across all passes.
    spent: f64,
}

/// The execution engine. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    store: SharedStore,
    registry: Arc<CapabilityRegistry>,
    safety: SafetyGate,
    sink: Arc<dyn DeliverySink>,
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: SharedStore,
        registry: Arc<CapabilityRegistry>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            safety: SafetyGate::new(),
            sink,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Submit a crew for execution. The crew is loaded and its graph
    /// validated up front: a definition that does not form a valid DAG
    /// is rejected here and no job record is created.
    pub async fn submit(&self, request: RunRequest) -> Result<JobId, EngineError> {
        let graph = self.load_graph(&request.crew_id).await?;

        let job = Job::new(request.crew_id.clone(), request.input_json.clone(), request.budget_limit);
        let job_id = job.id.clone();
        self.store.save_job(&job).await?;

        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(job.status);
        let entry = JobEntry {
            request,
            cancel: CancellationToken::new(),
            progress_tx,
            job: Arc::new(RwLock::new(job)),
            status_tx: Arc::new(status_tx),
            status_rx,
            outputs: Vec::new(),
            spent: 0.0,
        };
        let cancel = entry.cancel.clone();
        self.jobs.write().await.insert(job_id.clone(), entry);

        info!(job_id = %job_id, "job submitted");
        let engine = self.clone();
        let pass_job_id = job_id.clone();
        tokio::spawn(async move {
            engine
                .execute_pass(pass_job_id, graph, cancel, HashMap::new(), 0.0)
                .await;
        });
        Ok(job_id)
    }

    /// Request cancellation of a running job. Takes effect
    /// cooperatively; observe completion through `wait_terminal`.
    pub async fn cancel(&self, job_id: &JobId) -> Result<(), EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
        let status = entry.job.read().await.status;
        if status != JobStatus::Running {
            return Err(EngineError::NotRunning(status));
        }
        entry.cancel.cancel();
        Ok(())
    }

    /// Retry a job that ended in the error state. Succeeded tasks keep
    /// their outputs and are not re-run; committed spend still counts
    /// against the original budget ceiling.
    pub async fn retry(&self, job_id: &JobId) -> Result<(), EngineError> {
        let (crew_id, cancel, completed, spent) = {
            let mut jobs = self.jobs.write().await;
            let entry = jobs.get_mut(job_id).ok_or(EngineError::JobNotFound)?;
            let status = entry.job.read().await.status;
            if status != JobStatus::Error {
                return Err(EngineError::NotRetryable(status));
            }

            // Fresh token: the previous pass may have consumed the old one.
            entry.cancel = CancellationToken::new();
            let completed: HashMap<TaskId, String> = entry.outputs.iter().cloned().collect();
            (
                entry.request.crew_id.clone(),
                entry.cancel.clone(),
                completed,
                entry.spent,
            )
        };

        // Leave the terminal state before rebuilding: the fresh graph
        // build runs under initializing, and a definition that no longer
        // validates drops the job back to error with the graph reason.
        let machine = self.machine_for(job_id, 1).await?;
        machine.transition(JobStatus::Initializing, None).await?;

        let graph = match self.load_graph(&crew_id).await {
            Ok(graph) => graph,
            Err(err) => {
                machine
                    .transition(JobStatus::Error, Some(&err.to_string()))
                    .await?;
                return Err(err);
            }
        };

        info!(job_id = %job_id, spent, "job retry");
        let engine = self.clone();
        let pass_job_id = job_id.clone();
        tokio::spawn(async move {
            engine
                .execute_pass(pass_job_id, graph, cancel, completed, spent)
                .await;
        });
        Ok(())
    }

    /// Load the crew definition and validate it into a shareable graph.
    async fn load_graph(&self, crew_id: &CrewId) -> Result<Arc<TaskGraph>, EngineError> {
        let crew = self.store.load_crew(crew_id).await?;
        Ok(Arc::new(TaskGraph::build(&crew)?))
    }

    /// Subscribe to the job's live progress stream.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> Result<broadcast::Receiver<ProgressEvent>, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
        Ok(entry.progress_tx.subscribe())
    }

    /// Current snapshot of a job record.
    pub async fn job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
        let job = entry.job.read().await.clone();
        Ok(job)
    }

    /// Total committed spend for a job across all passes.
    pub async fn spent(&self, job_id: &JobId) -> Result<f64, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
        Ok(entry.spent)
    }

    /// Block until the job reaches a terminal state and return it.
    pub async fn wait_terminal(&self, job_id: &JobId) -> Result<JobStatus, EngineError> {
        let mut rx = {
            let jobs = self.jobs.read().await;
            let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
            entry.status_rx.clone()
        };
        let status = rx
            .wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| EngineError::JobNotFound)?;
        Ok(*status)
    }

    async fn machine_for(
        &self,
        job_id: &JobId,
        total_tasks: usize,
    ) -> Result<JobStateMachine, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
        let emitter = EventEmitter::new(
            job_id.clone(),
            total_tasks,
            entry.progress_tx.clone(),
            self.store.clone(),
        );
        Ok(JobStateMachine::new(
            entry.job.clone(),
            entry.status_tx.clone(),
            self.store.clone(),
            emitter,
        ))
    }

    /// One execution pass over the job's graph, from initialization
    /// through delivery.
    async fn execute_pass(
        self,
        job_id: JobId,
        graph: Arc<TaskGraph>,
        cancel: CancellationToken,
        completed: HashMap<TaskId, String>,
        prior_spent: f64,
    ) {
        let machine = match self.machine_for(&job_id, graph.len()).await {
            Ok(machine) => machine,
            Err(err) => {
                error!(job_id = %job_id, %err, "job entry vanished before execution");
                return;
            }
        };
        let emitter = match self.emitter_for(&job_id, graph.len()).await {
            Ok(emitter) => emitter,
            Err(err) => {
                error!(job_id = %job_id, %err, "job entry vanished before execution");
                return;
            }
        };

        // First pass enters from pending; a retry pass already moved to
        // initializing before spawn.
        if machine.snapshot().await.status == JobStatus::Pending {
            if let Err(err) = machine.transition(JobStatus::Initializing, None).await {
                error!(job_id = %job_id, %err, "failed to initialize job");
                return;
            }
        }
        if let Err(err) = machine.transition(JobStatus::Running, None).await {
            error!(job_id = %job_id, %err, "failed to start job");
            return;
        }
        emitter.progress("job_started", 0, "execution started", None);

        let (request, budget) = {
            let job = machine.snapshot().await;
            let jobs = self.jobs.read().await;
            let Some(entry) = jobs.get(&job_id) else {
                error!(job_id = %job_id, "job entry vanished mid-execution");
                return;
            };
            (entry.request.clone(), job.budget_limit)
        };
        let mode = request.mode.unwrap_or(self.config.mode);
        let deadline = request
            .max_execution_time
            .unwrap_or(self.config.default_deadline);

        let scheduler = Scheduler::new(
            job_id.clone(),
            request.input_json.clone(),
            graph.clone(),
            self.registry.clone(),
            TaskRunner::new(self.registry.clone(), &self.config),
            self.safety.clone(),
            CostLedger::resume(job_id.clone(), budget, prior_spent),
            self.store.clone(),
            emitter.clone(),
            self.config.retry.clone(),
            self.config.pool_size(mode),
            cancel,
            deadline,
            self.config.cancel_grace,
        )
        .with_completed(completed);

        let outcome = scheduler.run().await;

        {
            let mut jobs = self.jobs.write().await;
            if let Some(entry) = jobs.get_mut(&job_id) {
                entry.outputs = outcome.outputs.clone();
                entry.spent = outcome.total_cost;
            }
        }

        let settled = graph.len();
        let (status, reason) = match &outcome.result {
            ScheduleResult::Completed => (JobStatus::Done, None),
            ScheduleResult::Failed { reason } => (JobStatus::Error, Some(reason.clone())),
            ScheduleResult::Halted { reason } => (JobStatus::Blocked, Some(reason.clone())),
        };
        if let Err(err) = machine.transition(status, reason.as_deref()).await {
            error!(job_id = %job_id, %err, "failed to finalize job");
            return;
        }
        emitter.progress(
            match status {
                JobStatus::Done => "job_done",
                JobStatus::Blocked => "job_blocked",
                _ => "job_error",
            },
            settled,
            reason.clone().unwrap_or_else(|| "all tasks succeeded".to_string()),
            None,
        );

        let job = machine.snapshot().await;
        self.sink
            .deliver(JobDelivery {
                job,
                outputs: outcome.outputs,
                failure: reason,
            })
            .await;
    }

    async fn emitter_for(
        &self,
        job_id: &JobId,
        total_tasks: usize,
    ) -> Result<EventEmitter, EngineError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(job_id).ok_or(EngineError::JobNotFound)?;
        Ok(EventEmitter::new(
            job_id.clone(),
            total_tasks,
            entry.progress_tx.clone(),
            self.store.clone(),
        ))
    }
}
