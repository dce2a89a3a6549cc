//! Dependency-ordered task scheduling for one job execution pass.
//!
//! The scheduler is the single writer for all per-job execution state.
//! Attempts run on spawned tasks collected through a JoinSet; everything
//! else (slot bookkeeping, the cost ledger, retry decisions, blocking
//! propagation) happens on the driver loop.

use crate::capability::{CapabilityOutput, CapabilityRegistry, CapabilityRequest};
use crate::config::RetryPolicy;
use crate::emitter::EventEmitter;
use crate::runner::{TaskFailure, TaskRunner};
use crate::safety::{SafetyGate, Verdict};
use crate::store::SharedStore;
use crewrun_core::{
    AuditEvent, CostLedger, JobId, LedgerEntry, Reservation, TaskGraph, TaskId, TaskRun,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Scheduling state of one task within the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    InFlight,
    Succeeded,
    Failed,
    Blocked,
}

impl Slot {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }
}

/// What a spawned attempt task reports back to the driver.
struct AttemptOutcome {
    run: TaskRun,
    result: Result<CapabilityOutput, TaskFailure>,
}

/// How one execution pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleResult {
    /// Every task succeeded.
    Completed,
    /// At least one task exhausted retries or was rejected by the
    /// safety gate; the rest of the graph settled.
    Failed { reason: String },
    /// The whole pass was halted (budget, cancellation, or deadline)
    /// before the graph could settle on its own.
    Halted { reason: String },
}

/// Result of one execution pass over the task graph.
#[derive(Debug)]
pub struct ScheduleOutcome {
    /// Accepted outputs in task-declaration order, including outputs
    /// carried over from a prior pass.
    pub outputs: Vec<(TaskId, String)>,
    /// Total committed spend for this job, prior passes included.
    pub total_cost: f64,
    /// Ledger entries committed during this pass.
    pub entries: Vec<LedgerEntry>,
    /// How the pass ended.
    pub result: ScheduleResult,
}

/// Executes one pass over a validated task graph.
pub struct Scheduler {
    job_id: JobId,
    input_json: String,
    graph: Arc<TaskGraph>,
    registry: Arc<CapabilityRegistry>,
    runner: TaskRunner,
    safety: SafetyGate,
    ledger: CostLedger,
    store: SharedStore,
    emitter: EventEmitter,
    retry: RetryPolicy,
    pool_size: usize,
    cancel: CancellationToken,
    deadline: Duration,
    cancel_grace: Duration,
    completed: HashMap<TaskId, String>,
}

#[allow(clippy::too_many_arguments)]
impl Scheduler {
    pub fn new(
        job_id: JobId,
        input_json: String,
        graph: Arc<TaskGraph>,
        registry: Arc<CapabilityRegistry>,
        runner: TaskRunner,
        safety: SafetyGate,
        ledger: CostLedger,
        store: SharedStore,
        emitter: EventEmitter,
        retry: RetryPolicy,
        pool_size: usize,
        cancel: CancellationToken,
        deadline: Duration,
        cancel_grace: Duration,
    ) -> Self {
        Self {
            job_id,
            input_json,
            graph,
            registry,
            runner,
            safety,
            ledger,
            store,
            emitter,
            retry,
            pool_size: pool_size.max(1),
            cancel,
            deadline,
            cancel_grace,
            completed: HashMap::new(),
        }
    }

    /// Seed outputs from a prior pass; seeded tasks are treated as
    /// already succeeded and never re-run.
    pub fn with_completed(mut self, completed: HashMap<TaskId, String>) -> Self {
        self.completed = completed;
        self
    }

    /// Drive the graph until it settles or the pass is halted.
    pub async fn run(mut self) -> ScheduleOutcome {
        let total = self.graph.len();
        let index: HashMap<TaskId, usize> = self
            .graph
            .tasks()
            .iter()
            .enumerate()
            .map(|(i, task)| (task.id.clone(), i))
            .collect();

        let mut slots = vec![Slot::Waiting; total];
        let mut attempts = vec![0u32; total];
        let mut outputs: HashMap<TaskId, String> = std::mem::take(&mut self.completed);
        for (i, task) in self.graph.tasks().iter().enumerate() {
            if outputs.contains_key(&task.id) {
                slots[i] = Slot::Succeeded;
            }
        }

        let mut failure: Option<String> = None;
        let mut inflight: HashMap<usize, TaskRun> = HashMap::new();
        let mut join_set: JoinSet<AttemptOutcome> = JoinSet::new();
        let deadline = Instant::now() + self.deadline;

        loop {
            self.propagate_blocked(&index, &mut slots, &mut attempts).await;

            if let Err(reason) = self.dispatch_ready(
                &index,
                &mut slots,
                &mut attempts,
                &outputs,
                &mut inflight,
                &mut join_set,
            ) {
                return self
                    .halt(&index, slots, outputs, inflight, join_set, &reason)
                    .await;
            }

            if join_set.is_empty() {
                // Nothing in flight and nothing dispatchable: the graph
                // has settled.
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return self
                        .halt(&index, slots, outputs, inflight, join_set, "user_cancelled")
                        .await;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return self
                        .halt(&index, slots, outputs, inflight, join_set, "deadline_exceeded")
                        .await;
                }
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok(outcome)) => {
                            if let Some(reason) = self
                                .handle_outcome(
                                    outcome,
                                    &index,
                                    &mut slots,
                                    &mut attempts,
                                    &mut outputs,
                                    &mut failure,
                                    &mut inflight,
                                    &mut join_set,
                                )
                                .await
                            {
                                return self
                                    .halt(&index, slots, outputs, inflight, join_set, &reason)
                                    .await;
                            }
                        }
                        Some(Err(err)) => {
                            error!(job_id = %self.job_id, %err, "attempt task aborted");
                        }
                        None => {}
                    }
                }
            }
        }

        self.finish(slots, outputs, failure)
    }

    /// Block every waiting task whose dependency chain already contains a
    /// failed or blocked task. Runs to a fixpoint so transitive
    /// dependents settle in one call.
    async fn propagate_blocked(
        &self,
        index: &HashMap<TaskId, usize>,
        slots: &mut [Slot],
        attempts: &mut [u32],
    ) {
        loop {
            let mut newly_blocked: Option<(usize, TaskId)> = None;
            for (i, task) in self.graph.tasks().iter().enumerate() {
                if slots[i] != Slot::Waiting {
                    continue;
                }
                let settled_bad = task.depends_on.iter().find(|dep| {
                    index
                        .get(*dep)
                        .map(|&j| matches!(slots[j], Slot::Failed | Slot::Blocked))
                        .unwrap_or(false)
                });
                if let Some(dep) = settled_bad {
                    newly_blocked = Some((i, dep.clone()));
                    break;
                }
            }

            let Some((i, dep)) = newly_blocked else { break };
            slots[i] = Slot::Blocked;
            attempts[i] += 1;
            let task_id = self.graph.tasks()[i].id.clone();
            let reason = format!("upstream_failed:{dep}");

            let mut run = TaskRun::new(self.job_id.clone(), task_id.clone(), attempts[i]);
            run.block(reason.clone());
            self.save_run(&run).await;
            self.emitter
                .audit(AuditEvent::task_blocked(
                    self.job_id.clone(),
                    task_id.clone(),
                    &reason,
                ))
                .await;
            self.emitter.progress(
                "task_blocked",
                settled_count(slots),
                format!("task '{task_id}' blocked: {reason}"),
                Some(task_id),
            );
        }
    }

    /// Dispatch ready tasks in declaration order until the pool is full.
    /// Returns the halt reason if a budget reservation fails.
    fn dispatch_ready(
        &mut self,
        index: &HashMap<TaskId, usize>,
        slots: &mut [Slot],
        attempts: &mut [u32],
        outputs: &HashMap<TaskId, String>,
        inflight: &mut HashMap<usize, TaskRun>,
        join_set: &mut JoinSet<AttemptOutcome>,
    ) -> Result<(), String> {
        while join_set.len() < self.pool_size {
            let ready = self.graph.tasks().iter().enumerate().find(|(i, task)| {
                slots[*i] == Slot::Waiting
                    && task.depends_on.iter().all(|dep| {
                        index
                            .get(dep)
                            .map(|&j| slots[j] == Slot::Succeeded)
                            .unwrap_or(false)
                    })
            });
            let Some((i, _)) = ready else { break };

            attempts[i] = 1;
            self.spawn_attempt(i, 1, None, outputs, inflight, join_set)?;
            slots[i] = Slot::InFlight;
            let task_id = self.graph.tasks()[i].id.clone();
            self.emitter.progress(
                "task_started",
                settled_count(slots),
                format!("task '{task_id}' started"),
                Some(task_id),
            );
        }
        Ok(())
    }

    /// Reserve budget headroom and spawn one attempt. Returns the halt
    /// reason if the reservation would exceed the budget ceiling.
    fn spawn_attempt(
        &mut self,
        i: usize,
        attempt: u32,
        backoff: Option<Duration>,
        outputs: &HashMap<TaskId, String>,
        inflight: &mut HashMap<usize, TaskRun>,
        join_set: &mut JoinSet<AttemptOutcome>,
    ) -> Result<(), String> {
        let task = self.graph.tasks()[i].clone();
        let agent = self.graph.agents()[i].clone();
        let run = TaskRun::new(self.job_id.clone(), task.id.clone(), attempt);

        let estimate = self
            .registry
            .resolve_for_agent(&agent)
            .map(|c| c.estimate_cost(&task, &agent))
            .unwrap_or(0.0);
        if self.ledger.reserve(run.id.clone(), estimate) == Reservation::WouldExceed {
            warn!(
                job_id = %self.job_id,
                task_id = %task.id,
                estimate,
                remaining = self.ledger.remaining(),
                "budget reservation refused"
            );
            return Err("budget_exceeded".to_string());
        }

        let request = CapabilityRequest {
            job_id: self.job_id.clone(),
            run_id: run.id.clone(),
            task_id: task.id.clone(),
            agent,
            prompt: TaskRunner::effective_input(&task, outputs),
            input_json: self.input_json.clone(),
        };

        inflight.insert(i, run.clone());

        let runner = self.runner.clone();
        let store = self.store.clone();
        let emitter = self.emitter.clone();
        let cancel = self.cancel.clone();
        join_set.spawn(async move {
            if let Some(delay) = backoff {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return AttemptOutcome {
                            run,
                            result: Err(TaskFailure::Cancelled),
                        };
                    }
                }
            }

            let mut run = run;
            run.start();
            if let Err(err) = store.save_task_run(&run).await {
                error!(run_id = %run.id, %err, "failed to persist run start");
            }
            emitter
                .audit(AuditEvent::task_started(
                    run.job_id.clone(),
                    run.task_id.clone(),
                    &run.id,
                    run.attempt,
                ))
                .await;

            let result = runner.run_attempt(request, &cancel).await;
            AttemptOutcome { run, result }
        });
        Ok(())
    }

    /// Settle one attempt outcome. Returns the halt reason if a retry
    /// reservation fails.
    #[allow(clippy::too_many_arguments)]
    async fn handle_outcome(
        &mut self,
        outcome: AttemptOutcome,
        index: &HashMap<TaskId, usize>,
        slots: &mut [Slot],
        attempts: &mut [u32],
        outputs: &mut HashMap<TaskId, String>,
        failure: &mut Option<String>,
        inflight: &mut HashMap<usize, TaskRun>,
        join_set: &mut JoinSet<AttemptOutcome>,
    ) -> Option<String> {
        let Some(&i) = index.get(&outcome.run.task_id) else {
            return None;
        };
        inflight.remove(&i);

        match outcome.result {
            Ok(output) => {
                self.settle_success(i, outcome.run, output, slots, outputs, failure)
                    .await;
                None
            }
            Err(fail) => {
                let mut run = outcome.run;
                self.ledger.release(&run.id);
                run.fail(fail.to_string());
                self.save_run(&run).await;
                self.emitter
                    .audit(AuditEvent::task_failed(
                        self.job_id.clone(),
                        run.task_id.clone(),
                        &run.id,
                        run.attempt,
                        &fail.to_string(),
                    ))
                    .await;

                if fail.is_retryable() && run.attempt < self.retry.max_attempts {
                    let next = run.attempt + 1;
                    let delay = self.retry.backoff_delay(run.attempt);
                    debug!(
                        job_id = %self.job_id,
                        task_id = %run.task_id,
                        attempt = next,
                        delay = ?delay,
                        "retrying task"
                    );
                    attempts[i] = next;
                    if let Err(reason) =
                        self.spawn_attempt(i, next, Some(delay), outputs, inflight, join_set)
                    {
                        return Some(reason);
                    }
                } else {
                    slots[i] = Slot::Failed;
                    failure.get_or_insert_with(|| {
                        format!("task '{}' failed: {fail}", run.task_id)
                    });
                    self.emitter.progress(
                        "task_failed",
                        settled_count(slots),
                        format!("task '{}' failed", run.task_id),
                        Some(run.task_id.clone()),
                    );
                }
                None
            }
        }
    }

    /// A capability produced output: gate it, commit its cost, and
    /// settle the slot.
    async fn settle_success(
        &mut self,
        i: usize,
        mut run: TaskRun,
        output: CapabilityOutput,
        slots: &mut [Slot],
        outputs: &mut HashMap<TaskId, String>,
        failure: &mut Option<String>,
    ) {
        let task_id = run.task_id.clone();
        let evaluation = self.safety.evaluate(&output.content);
        let entry = self.ledger.commit(&run.id, output.cost);
        self.emitter
            .audit(AuditEvent::cost_committed(
                self.job_id.clone(),
                task_id.clone(),
                &run.id,
                entry.amount,
                entry.total_after,
            ))
            .await;

        match evaluation.verdict {
            Verdict::Reject(reason) => {
                self.emitter
                    .audit(AuditEvent::safety_check(
                        self.job_id.clone(),
                        task_id.clone(),
                        "reject",
                        0,
                    ))
                    .await;
                run.cost = entry.amount;
                run.block(reason.clone());
                self.save_run(&run).await;
                self.emitter
                    .audit(AuditEvent::task_blocked(
                        self.job_id.clone(),
                        task_id.clone(),
                        &reason,
                    ))
                    .await;
                slots[i] = Slot::Blocked;
                failure.get_or_insert(reason.clone());
                self.emitter.progress(
                    "task_blocked",
                    settled_count(slots),
                    format!("task '{task_id}' blocked: {reason}"),
                    Some(task_id),
                );
            }
            verdict => {
                let (label, redactions, content) = match verdict {
                    Verdict::Redact(redacted) => {
                        ("redact", evaluation.report.pii_found.len(), redacted)
                    }
                    _ => ("accept", 0, output.content),
                };
                self.emitter
                    .audit(AuditEvent::safety_check(
                        self.job_id.clone(),
                        task_id.clone(),
                        label,
                        redactions,
                    ))
                    .await;
                run.succeed(content.clone(), entry.amount);
                self.save_run(&run).await;
                self.emitter
                    .audit(AuditEvent::task_succeeded(
                        self.job_id.clone(),
                        task_id.clone(),
                        &run.id,
                        entry.amount,
                    ))
                    .await;
                outputs.insert(task_id.clone(), content);
                slots[i] = Slot::Succeeded;
                self.emitter.progress(
                    "task_succeeded",
                    settled_count(slots),
                    format!("task '{task_id}' succeeded"),
                    Some(task_id),
                );
            }
        }
    }

    /// Halt the whole pass: cancel in-flight attempts, give them a
    /// bounded grace period to settle, and block everything that never
    /// reached a terminal state.
    async fn halt(
        mut self,
        index: &HashMap<TaskId, usize>,
        mut slots: Vec<Slot>,
        mut outputs: HashMap<TaskId, String>,
        mut inflight: HashMap<usize, TaskRun>,
        mut join_set: JoinSet<AttemptOutcome>,
        reason: &str,
    ) -> ScheduleOutcome {
        warn!(job_id = %self.job_id, reason, "halting job execution");
        self.cancel.cancel();

        let drain_deadline = Instant::now() + self.cancel_grace + Duration::from_secs(1);
        let mut failure = None;
        while !join_set.is_empty() {
            match tokio::time::timeout_at(drain_deadline, join_set.join_next()).await {
                Ok(Some(Ok(outcome))) => {
                    let Some(&i) = index.get(&outcome.run.task_id) else {
                        continue;
                    };
                    inflight.remove(&i);
                    match outcome.result {
                        // Finished inside the grace window; keep it.
                        Ok(output) => {
                            self.settle_success(
                                i,
                                outcome.run,
                                output,
                                &mut slots,
                                &mut outputs,
                                &mut failure,
                            )
                            .await;
                        }
                        Err(_) => {
                            let mut run = outcome.run;
                            self.ledger.release(&run.id);
                            run.block(reason);
                            self.save_run(&run).await;
                            self.emitter
                                .audit(AuditEvent::task_blocked(
                                    self.job_id.clone(),
                                    run.task_id.clone(),
                                    reason,
                                ))
                                .await;
                            slots[i] = Slot::Blocked;
                        }
                    }
                }
                Ok(Some(Err(_))) => continue,
                Ok(None) => break,
                Err(_) => {
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Abandoned in-flight attempts plus everything still waiting.
        for (i, task) in self.graph.tasks().iter().enumerate() {
            if slots[i].is_terminal() {
                continue;
            }
            let mut run = match inflight.remove(&i) {
                Some(run) => run,
                None => TaskRun::new(self.job_id.clone(), task.id.clone(), 1),
            };
            self.ledger.release(&run.id);
            run.block(reason);
            self.save_run(&run).await;
            self.emitter
                .audit(AuditEvent::task_blocked(
                    self.job_id.clone(),
                    task.id.clone(),
                    reason,
                ))
                .await;
            slots[i] = Slot::Blocked;
        }

        self.emitter.progress(
            "job_halted",
            settled_count(&slots),
            format!("job halted: {reason}"),
            None,
        );

        let outputs = self.ordered_outputs(&outputs);
        ScheduleOutcome {
            outputs,
            total_cost: self.ledger.total(),
            entries: self.ledger.entries().to_vec(),
            result: ScheduleResult::Halted {
                reason: reason.to_string(),
            },
        }
    }

    /// The graph settled without a halt: completed if everything
    /// succeeded, failed otherwise.
    fn finish(
        self,
        slots: Vec<Slot>,
        outputs: HashMap<TaskId, String>,
        failure: Option<String>,
    ) -> ScheduleOutcome {
        let result = if slots.iter().all(|s| *s == Slot::Succeeded) {
            ScheduleResult::Completed
        } else {
            ScheduleResult::Failed {
                reason: failure.unwrap_or_else(|| "job failed".to_string()),
            }
        };
        let outputs = self.ordered_outputs(&outputs);
        ScheduleOutcome {
            outputs,
            total_cost: self.ledger.total(),
            entries: self.ledger.entries().to_vec(),
            result,
        }
    }

    fn ordered_outputs(&self, outputs: &HashMap<TaskId, String>) -> Vec<(TaskId, String)> {
        self.graph
            .tasks()
            .iter()
            .filter_map(|task| {
                outputs
                    .get(&task.id)
                    .map(|output| (task.id.clone(), output.clone()))
            })
            .collect()
    }

    async fn save_run(&self, run: &TaskRun) {
        if let Err(err) = self.store.save_task_run(run).await {
            error!(run_id = %run.id, %err, "failed to persist task run");
        }
    }
}

fn settled_count(slots: &[Slot]) -> usize {
    slots.iter().filter(|s| s.is_terminal()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, CapabilityError, EchoCapability};
    use crate::config::EngineConfig;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use crewrun_core::{AgentSpec, CrewDefinition, RunStatus, TaskSpec};
    use tokio::sync::broadcast;

    struct FailingCapability;

    #[async_trait]
    impl Capability for FailingCapability {
        fn estimate_cost(&self, _task: &TaskSpec, _agent: &AgentSpec) -> f64 {
            1.0
        }

        async fn invoke(
            &self,
            _request: CapabilityRequest,
        ) -> Result<CapabilityOutput, CapabilityError> {
            Err(CapabilityError::new("boom"))
        }
    }

    fn chain_crew() -> CrewDefinition {
        CrewDefinition::new("crew-1", "Chain")
            .with_agent(AgentSpec::new("a1", "Agent"))
            .with_task(TaskSpec::new("research", "Research", "a1"))
            .with_task(TaskSpec::new("write", "Write", "a1").after("research"))
            .with_task(TaskSpec::new("edit", "Edit", "a1").after("write"))
    }

    fn scheduler_for(
        crew: &CrewDefinition,
        registry: CapabilityRegistry,
        budget: f64,
        store: Arc<MemoryStore>,
    ) -> Scheduler {
        let graph = Arc::new(TaskGraph::build(crew).unwrap());
        let registry = Arc::new(registry);
        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                jitter: 0.0,
            },
            ..EngineConfig::default()
        };
        let runner = TaskRunner::new(registry.clone(), &config);
        let job_id = JobId::generate();
        let (progress_tx, _) = broadcast::channel(64);
        let emitter = EventEmitter::new(job_id.clone(), graph.len(), progress_tx, store.clone());
        Scheduler::new(
            job_id.clone(),
            "{}".to_string(),
            graph,
            registry,
            runner,
            SafetyGate::new(),
            CostLedger::new(job_id, budget),
            store,
            emitter,
            config.retry.clone(),
            1,
            CancellationToken::new(),
            Duration::from_secs(60),
            config.cancel_grace,
        )
    }

    #[tokio::test]
    async fn test_chain_completes_in_order() {
        let store = Arc::new(MemoryStore::new());
        let registry =
            CapabilityRegistry::new().with_default(Arc::new(EchoCapability::new(1.0)));
        let scheduler = scheduler_for(&chain_crew(), registry, 10.0, store);

        let outcome = scheduler.run().await;
        assert_eq!(outcome.result, ScheduleResult::Completed);
        assert_eq!(outcome.total_cost, 3.0);

        let ids: Vec<_> = outcome.outputs.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                TaskId::new("research"),
                TaskId::new("write"),
                TaskId::new("edit")
            ]
        );
        // Downstream tasks see upstream output in their prompt.
        assert!(outcome.outputs[1].1.contains("Completed: Research"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_blocks_dependents() {
        let store = Arc::new(MemoryStore::new());
        let registry = CapabilityRegistry::new().with_default(Arc::new(FailingCapability));
        let scheduler = scheduler_for(&chain_crew(), registry, 10.0, store.clone());
        let job_id = scheduler.job_id.clone();

        let outcome = scheduler.run().await;
        assert!(matches!(outcome.result, ScheduleResult::Failed { .. }));
        assert!(outcome.outputs.is_empty());

        let runs = store.runs_for_job(&job_id).await;
        let research: Vec<_> = runs
            .iter()
            .filter(|r| r.task_id == TaskId::new("research"))
            .collect();
        assert_eq!(research.len(), 2);
        assert!(research.iter().all(|r| r.status == RunStatus::Failed));

        let write = runs
            .iter()
            .find(|r| r.task_id == TaskId::new("write"))
            .unwrap();
        assert_eq!(write.status, RunStatus::Blocked);
        assert_eq!(write.reason.as_deref(), Some("upstream_failed:research"));
    }

    #[tokio::test]
    async fn test_budget_reservation_halts_before_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let registry =
            CapabilityRegistry::new().with_default(Arc::new(EchoCapability::new(2.0)));
        let scheduler = scheduler_for(&chain_crew(), registry, 5.0, store.clone());
        let job_id = scheduler.job_id.clone();

        let outcome = scheduler.run().await;
        assert_eq!(
            outcome.result,
            ScheduleResult::Halted {
                reason: "budget_exceeded".to_string()
            }
        );
        // Two tasks committed before the third reservation was refused.
        assert_eq!(outcome.total_cost, 4.0);
        assert_eq!(outcome.outputs.len(), 2);

        let runs = store.runs_for_job(&job_id).await;
        let edit = runs
            .iter()
            .find(|r| r.task_id == TaskId::new("edit"))
            .unwrap();
        assert_eq!(edit.status, RunStatus::Blocked);
        assert_eq!(edit.reason.as_deref(), Some("budget_exceeded"));
        assert!(edit.started_at.is_none());
    }
}
