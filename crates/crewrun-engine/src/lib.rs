//! CrewRun Execution Engine
//!
//! Turns validated crew definitions into running jobs: dependency-ordered
//! scheduling with bounded concurrency, budget enforcement through the
//! cost ledger, output safety gating, retry with exponential backoff,
//! and cooperative cancellation. Persistence and result delivery are
//! seams (`DefinitionStore`, `DeliverySink`) so the engine stays
//! backend-agnostic.

pub mod capability;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod machine;
pub mod runner;
pub mod safety;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use capability::{
    Capability, CapabilityError, CapabilityOutput, CapabilityRegistry, CapabilityRequest,
    EchoCapability,
};
pub use config::{EngineConfig, ExecutionMode, RetryPolicy, RunRequest};
pub use emitter::EventEmitter;
pub use engine::Engine;
pub use error::EngineError;
pub use machine::JobStateMachine;
pub use runner::{TaskFailure, TaskRunner};
pub use safety::{Evaluation, SafetyGate, SafetyReport, Verdict};
pub use scheduler::{ScheduleOutcome, ScheduleResult, Scheduler};
pub use sink::{DeliverySink, JobDelivery, MemorySink};
pub use store::{DefinitionStore, MemoryStore, SharedStore, StoreError};
