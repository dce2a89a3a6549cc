//! Status enums for Jobs and TaskRuns, including the job transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a Job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created but execution has not begun.
    #[default]
    Pending,
    /// Crew definition is being validated into a task graph.
    Initializing,
    /// The dispatch loop is driving task runs.
    Running,
    /// All tasks succeeded.
    Done,
    /// A task permanently failed, or graph validation failed on retry.
    Error,
    /// Execution was halted by a budget, deadline, or cancel decision
    /// rather than an execution fault.
    Blocked,
}

impl JobStatus {
    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Blocked)
    }

    /// Closed transition table.
    ///
    /// Terminal states reject everything, with one sanctioned exception:
    /// `Error -> Initializing` re-enters execution for an explicit retry
    /// request with a fresh graph build.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Initializing),
            Self::Initializing => matches!(next, Self::Running | Self::Error),
            Self::Running => matches!(next, Self::Done | Self::Error | Self::Blocked),
            Self::Error => matches!(next, Self::Initializing),
            Self::Done | Self::Blocked => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

/// Status of a single TaskRun attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run record created but the attempt has not started.
    #[default]
    Pending,
    /// The capability invocation is in flight.
    Running,
    /// Attempt produced an accepted output.
    Succeeded,
    /// Attempt failed (timeout, capability error, or invalid output).
    Failed,
    /// Run will never execute: upstream failure, policy rejection,
    /// budget halt, or cancellation.
    Blocked,
}

impl RunStatus {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Blocked)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Initializing));
        assert!(JobStatus::Initializing.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Done));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        for next in [
            JobStatus::Pending,
            JobStatus::Initializing,
            JobStatus::Running,
            JobStatus::Error,
            JobStatus::Blocked,
        ] {
            assert!(!JobStatus::Done.can_transition_to(next));
            assert!(!JobStatus::Blocked.can_transition_to(next));
        }
    }

    #[test]
    fn test_error_allows_retry_reentry_only() {
        assert!(JobStatus::Error.can_transition_to(JobStatus::Initializing));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Done));
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Blocked.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
