//! Engine and per-run configuration.

use crewrun_core::CrewId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How task runs are scheduled within a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One task at a time, in dependency order.
    #[default]
    Sequential,
    /// Up to the configured in-flight cap in parallel.
    Parallel,
}

/// Retry policy for transient task failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per task, including the first.
    pub max_attempts: u32,

    /// Base delay before the first retry.
    pub base_delay: Duration,

    /// Ceiling on the exponential delay.
    pub max_delay: Duration,

    /// Jitter fraction applied on top of the capped delay (0.0 - 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the attempt following `failed_attempt`
    /// (1-based): exponential in the attempt number, capped, with a
    /// random jitter term.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        let base = self.base_delay.as_millis() as f64 * 2f64.powi(exp as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let jitter = capped * self.jitter.clamp(0.0, 1.0) * rand::thread_rng().gen::<f64>();
        Duration::from_millis((capped + jitter) as u64)
    }
}

/// Engine-wide configuration; per-run requests may override the mode and
/// deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Default execution mode when a run request does not set one.
    pub mode: ExecutionMode,

    /// Concurrency cap for parallel mode (sequential mode is pool size 1).
    pub max_in_flight: usize,

    /// Retry policy for transient task failures.
    pub retry: RetryPolicy,

    /// Timeout per capability invocation.
    pub task_timeout: Duration,

    /// Grace period an in-flight invocation gets to unwind after a
    /// job-level halt before being abandoned.
    pub cancel_grace: Duration,

    /// Default per-job wall-clock deadline when a run request does not
    /// set one.
    pub default_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_in_flight: 4,
            retry: RetryPolicy::default(),
            task_timeout: Duration::from_secs(300),
            cancel_grace: Duration::from_secs(2),
            default_deadline: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    /// Worker pool size for a given execution mode.
    pub fn pool_size(&self, mode: ExecutionMode) -> usize {
        match mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self.max_in_flight.max(1),
        }
    }
}

/// A request to execute a crew once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Crew to execute.
    pub crew_id: CrewId,

    /// Input payload as a JSON string.
    pub input_json: String,

    /// Budget ceiling for the job (non-negative).
    pub budget_limit: f64,

    /// Execution mode override.
    pub mode: Option<ExecutionMode>,

    /// Wall-clock deadline override.
    pub max_execution_time: Option<Duration>,
}

impl RunRequest {
    /// Create a run request with engine defaults for mode and deadline.
    pub fn new(crew_id: impl Into<CrewId>, input_json: impl Into<String>, budget_limit: f64) -> Self {
        Self {
            crew_id: crew_id.into(),
            input_json: input_json.into(),
            budget_limit,
            mode: None,
            max_execution_time: None,
        }
    }

    /// Builder method to set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Builder method to set the wall-clock deadline.
    pub fn with_max_execution_time(mut self, deadline: Duration) -> Self {
        self.max_execution_time = Some(deadline);
        self
    }
}
