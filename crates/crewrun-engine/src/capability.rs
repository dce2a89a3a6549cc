//! Closed capability registry resolved by name at invocation time.
//!
//! Agent "intelligence" is opaque to the engine: a capability is anything
//! that turns a prompt into an output with a cost. Agents reference
//! capabilities by tool name only; the registry is the single place
//! names resolve to implementations.

use async_trait::async_trait;
use crewrun_core::{AgentSpec, JobId, RunId, TaskId, TaskSpec};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Error produced by a capability invocation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CapabilityError(pub String);

impl CapabilityError {
    /// Create a new capability error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One capability invocation for one task attempt.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    /// Owning job identity.
    pub job_id: JobId,

    /// TaskRun this invocation belongs to.
    pub run_id: RunId,

    /// Task being attempted.
    pub task_id: TaskId,

    /// Agent executing the task.
    pub agent: AgentSpec,

    /// Effective input: task description plus predecessor outputs.
    pub prompt: String,

    /// Job-level input payload as a JSON string.
    pub input_json: String,
}

/// Output of a successful capability invocation.
#[derive(Debug, Clone)]
pub struct CapabilityOutput {
    /// Produced content.
    pub content: String,

    /// Actual cost of this invocation.
    pub cost: f64,

    /// Tokens consumed, if known.
    pub tokens: u64,
}

/// An agent capability invoked for one task attempt.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Advisory cost estimate used for budget reservation before dispatch.
    fn estimate_cost(&self, task: &TaskSpec, agent: &AgentSpec) -> f64;

    /// Invoke the capability. A single invocation never retries
    /// internally; retry policy belongs to the scheduler.
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityOutput, CapabilityError>;
}

/// Closed registry of named capabilities.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    default: Option<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under a tool name.
    pub fn register(mut self, name: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.insert(name.into(), capability);
        self
    }

    /// Set the capability used for agents that declare no tools.
    pub fn with_default(mut self, capability: Arc<dyn Capability>) -> Self {
        self.default = Some(capability);
        self
    }

    /// Resolve a capability by tool name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Resolve the capability for an agent: the first of its declared
    /// tools that is registered, falling back to the default slot.
    pub fn resolve_for_agent(&self, agent: &AgentSpec) -> Option<Arc<dyn Capability>> {
        agent
            .tools
            .iter()
            .find_map(|tool| self.resolve(tool))
            .or_else(|| self.default.clone())
    }
}

/// Built-in capability that completes a task by echoing its description.
///
/// Stands in for a model call in examples and tests; produces
/// deterministic output with a fixed per-invocation cost.
#[derive(Debug, Clone)]
pub struct EchoCapability {
    cost_per_call: f64,
}

impl EchoCapability {
    /// Create an echo capability with a fixed cost per invocation.
    pub fn new(cost_per_call: f64) -> Self {
        Self { cost_per_call }
    }
}

#[async_trait]
impl Capability for EchoCapability {
    fn estimate_cost(&self, _task: &TaskSpec, _agent: &AgentSpec) -> f64 {
        self.cost_per_call
    }

    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityOutput, CapabilityError> {
        Ok(CapabilityOutput {
            content: format!("Completed: {}", request.prompt),
            cost: self.cost_per_call,
            tokens: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewrun_core::AgentSpec;

    fn request(agent: AgentSpec) -> CapabilityRequest {
        CapabilityRequest {
            job_id: JobId::generate(),
            run_id: RunId::generate(),
            task_id: TaskId::new("write"),
            agent,
            prompt: "Write the post".to_string(),
            input_json: "{}".to_string(),
        }
    }

    #[test]
    fn test_resolve_prefers_first_registered_tool() {
        let registry = CapabilityRegistry::new()
            .register("search", Arc::new(EchoCapability::new(1.0)))
            .register("draft", Arc::new(EchoCapability::new(2.0)));

        let agent = AgentSpec::new("a1", "Writer")
            .with_tool("missing")
            .with_tool("draft")
            .with_tool("search");
        let task = TaskSpec::new("write", "Write", "a1");

        let capability = registry.resolve_for_agent(&agent).unwrap();
        assert_eq!(capability.estimate_cost(&task, &agent), 2.0);
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let registry =
            CapabilityRegistry::new().with_default(Arc::new(EchoCapability::new(0.5)));
        let agent = AgentSpec::new("a1", "Writer");
        assert!(registry.resolve_for_agent(&agent).is_some());
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        let registry = CapabilityRegistry::new();
        let agent = AgentSpec::new("a1", "Writer").with_tool("missing");
        assert!(registry.resolve_for_agent(&agent).is_none());
    }

    #[tokio::test]
    async fn test_echo_capability_output() {
        let capability = EchoCapability::new(0.05);
        let agent = AgentSpec::new("a1", "Writer");
        let output = capability.invoke(request(agent)).await.unwrap();
        assert_eq!(output.content, "Completed: Write the post");
        assert_eq!(output.cost, 0.05);
    }
}
