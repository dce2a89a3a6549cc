//! Single-attempt task execution with timeout and cooperative cancellation.

use crate::capability::{CapabilityOutput, CapabilityRegistry, CapabilityRequest};
use crate::config::EngineConfig;
use crewrun_core::{TaskId, TaskSpec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Typed failure of one task attempt.
#[derive(Debug, Clone, Error)]
pub enum TaskFailure {
    /// The capability invocation exceeded the per-attempt timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The capability itself reported an error.
    #[error("capability error: {0}")]
    Capability(String),

    /// The produced output violates the expected-output contract.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// The attempt was abandoned by a job-level halt.
    #[error("cancelled")]
    Cancelled,
}

impl TaskFailure {
    /// Transient failures are absorbed by the scheduler's retry policy;
    /// cancellation is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Executes one TaskRun attempt against the capability registry.
#[derive(Clone)]
pub struct TaskRunner {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
    cancel_grace: Duration,
}

impl TaskRunner {
    /// Create a runner from the engine configuration.
    pub fn new(registry: Arc<CapabilityRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            timeout: config.task_timeout,
            cancel_grace: config.cancel_grace,
        }
    }

    /// Build the effective input for a task: its own description plus the
    /// captured outputs of its declared predecessors, concatenated in
    /// dependency-declaration order.
    pub fn effective_input(task: &TaskSpec, outputs: &HashMap<TaskId, String>) -> String {
        let mut parts = vec![task.description.clone()];
        for dep in &task.depends_on {
            if let Some(output) = outputs.get(dep) {
                parts.push(output.clone());
            }
        }
        parts.join("\n\n")
    }

    /// Run a single attempt. Never retries internally.
    ///
    /// On job-level halt the in-flight invocation gets a bounded grace
    /// period to unwind before being abandoned.
    pub async fn run_attempt(
        &self,
        request: CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<CapabilityOutput, TaskFailure> {
        let capability = self
            .registry
            .resolve_for_agent(&request.agent)
            .ok_or_else(|| {
                TaskFailure::Capability(format!(
                    "no capability registered for agent '{}'",
                    request.agent.id
                ))
            })?;

        debug!(
            task_id = %request.task_id,
            run_id = %request.run_id,
            attempt_timeout = ?self.timeout,
            "invoking capability"
        );

        let invocation = capability.invoke(request.clone());
        tokio::pin!(invocation);

        let result = tokio::select! {
            result = tokio::time::timeout(self.timeout, &mut invocation) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => return Err(TaskFailure::Timeout(self.timeout)),
                }
            }
            _ = cancel.cancelled() => {
                warn!(
                    task_id = %request.task_id,
                    grace = ?self.cancel_grace,
                    "job halted; giving in-flight invocation a grace period"
                );
                match tokio::time::timeout(self.cancel_grace, &mut invocation).await {
                    Ok(inner) => inner,
                    Err(_) => return Err(TaskFailure::Cancelled),
                }
            }
        };

        let output = result.map_err(|e| TaskFailure::Capability(e.to_string()))?;
        if output.content.trim().is_empty() {
            return Err(TaskFailure::InvalidOutput(
                "capability produced empty output".to_string(),
            ));
        }
        Ok(output)
    }
}
