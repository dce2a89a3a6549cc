//! Crew definition types: agents, tasks, and model configuration.
//!
//! A crew definition is a reusable template. Jobs reference its agents and
//! tasks by identity only, so editing a crew after a job starts never
//! affects the running job.

use crate::{AgentId, CrewId, TaskId};
use serde::{Deserialize, Serialize};

/// Model configuration attached to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name (e.g., "gpt-4", "claude-3-sonnet").
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Token ceiling per invocation.
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Specification of an agent within a crew.
///
/// Tools are named capability references resolved through the capability
/// registry at invocation time, never function pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Unique agent identity within the crew.
    pub id: AgentId,

    /// Human-readable name.
    pub name: String,

    /// Role label (e.g., "Researcher").
    pub role: String,

    /// Goal text guiding the agent.
    pub goal: String,

    /// Background text included in prompts.
    pub backstory: String,

    /// Named capability references.
    pub tools: Vec<String>,

    /// Model configuration.
    pub model: ModelConfig,
}

impl AgentSpec {
    /// Create a new AgentSpec with default role, goal, and model.
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: "Assistant".to_string(),
            goal: "Complete assigned tasks efficiently".to_string(),
            backstory: String::new(),
            tools: Vec::new(),
            model: ModelConfig::default(),
        }
    }

    /// Builder method to set the role label.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Builder method to set the goal text.
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    /// Builder method to add a named tool reference.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    /// Builder method to set the model configuration.
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }
}

/// Specification of a task within a crew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task identity within the crew.
    pub id: TaskId,

    /// Description of the work to perform.
    pub description: String,

    /// Expected-output contract, used as a validation hint.
    pub expected_output: String,

    /// Assigned agent, by identity.
    pub agent: AgentId,

    /// Predecessor tasks, by identity, in declaration order.
    pub depends_on: Vec<TaskId>,
}

impl TaskSpec {
    /// Create a new TaskSpec assigned to the given agent.
    pub fn new(
        id: impl Into<TaskId>,
        description: impl Into<String>,
        agent: impl Into<AgentId>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_output: String::new(),
            agent: agent.into(),
            depends_on: Vec::new(),
        }
    }

    /// Builder method to set the expected-output contract.
    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = expected.into();
        self
    }

    /// Builder method to add a dependency edge.
    pub fn after(mut self, task: impl Into<TaskId>) -> Self {
        self.depends_on.push(task.into());
        self
    }
}

/// A named collection of agents and tasks forming a reusable template.
///
/// Task declaration order is significant: when several tasks become ready
/// simultaneously the scheduler dispatches them in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewDefinition {
    /// Unique crew identity.
    pub id: CrewId,

    /// Human-readable name.
    pub name: String,

    /// Agent specifications.
    pub agents: Vec<AgentSpec>,

    /// Task specifications, in declaration order.
    pub tasks: Vec<TaskSpec>,
}

impl CrewDefinition {
    /// Create a new, empty crew definition.
    pub fn new(id: impl Into<CrewId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agents: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Builder method to add an agent.
    pub fn with_agent(mut self, agent: AgentSpec) -> Self {
        self.agents.push(agent);
        self
    }

    /// Builder method to add a task.
    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Look up an agent by identity.
    pub fn agent(&self, id: &AgentId) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| &a.id == id)
    }

    /// Look up a task by identity.
    pub fn task(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| &t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_builder() {
        let agent = AgentSpec::new("a1", "Researcher")
            .with_role("Research Analyst")
            .with_goal("Find relevant sources")
            .with_tool("web_search");

        assert_eq!(agent.role, "Research Analyst");
        assert_eq!(agent.tools, vec!["web_search".to_string()]);
        assert_eq!(agent.model.model, "gpt-4");
    }

    #[test]
    fn test_task_dependencies_keep_declaration_order() {
        let task = TaskSpec::new("edit", "Edit the draft", "a1")
            .after("research")
            .after("write");

        assert_eq!(
            task.depends_on,
            vec![TaskId::new("research"), TaskId::new("write")]
        );
    }

    #[test]
    fn test_crew_lookup() {
        let crew = CrewDefinition::new("crew-1", "Content Crew")
            .with_agent(AgentSpec::new("a1", "Writer"))
            .with_task(TaskSpec::new("write", "Write the post", "a1"));

        assert!(crew.agent(&AgentId::new("a1")).is_some());
        assert!(crew.agent(&AgentId::new("missing")).is_none());
        assert!(crew.task(&TaskId::new("write")).is_some());
    }
}
