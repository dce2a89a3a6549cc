//! CrewRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Async runtime
//! - Network
//! - Storage
//!
//! All types here represent the core business domain of CrewRun: crew
//! definitions, the validated task graph, jobs and task runs, the cost
//! ledger, and audit/progress events.

pub mod event;
pub mod graph;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod spec;
pub mod status;

// Re-export commonly used types
pub use event::{AuditAction, AuditEvent, ProgressEvent};
pub use graph::{GraphError, TaskGraph};
pub use ids::{AgentId, CrewId, EventId, JobId, RunId, TaskId};
pub use job::{Job, TaskRun};
pub use ledger::{CostLedger, LedgerEntry, Reservation};
pub use spec::{AgentSpec, CrewDefinition, ModelConfig, TaskSpec};
pub use status::{JobStatus, RunStatus};
