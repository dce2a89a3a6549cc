//! Validated task dependency graph.
//!
//! Building is pure and side-effect free: the same crew definition always
//! yields an isomorphic graph. Once built, the graph is shared read-only
//! for the lifetime of a job.

use crate::{AgentId, AgentSpec, CrewDefinition, TaskId, TaskSpec};
use std::collections::HashMap;
use thiserror::Error;

/// Reasons a crew definition fails graph validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The crew declares no tasks.
    #[error("crew has no tasks")]
    EmptyTaskSet,

    /// A dependency identity does not resolve to a task in the crew.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    /// A task's assigned agent has no matching AgentSpec.
    #[error("task '{task}' references unknown agent '{agent}'")]
    UnknownAgent { task: TaskId, agent: AgentId },

    /// The dependency edges contain a cycle.
    #[error("dependency cycle involving task '{task}'")]
    Cycle { task: TaskId },
}

/// Three-color DFS marker.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// The validated, acyclic dependency structure derived from a crew.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGraph {
    /// Tasks in declaration order.
    tasks: Vec<TaskSpec>,

    /// Resolved agent per task, parallel to `tasks`.
    agents: Vec<AgentSpec>,

    /// Task identity to declaration index.
    index: HashMap<TaskId, usize>,

    /// Direct dependents per task (reverse edges).
    dependents: HashMap<TaskId, Vec<TaskId>>,
}

impl TaskGraph {
    /// Validate a crew definition into a graph.
    pub fn build(crew: &CrewDefinition) -> Result<Self, GraphError> {
        if crew.tasks.is_empty() {
            return Err(GraphError::EmptyTaskSet);
        }

        let mut index = HashMap::new();
        for (i, task) in crew.tasks.iter().enumerate() {
            index.insert(task.id.clone(), i);
        }

        // Every dependency identity must resolve, and every assigned agent
        // must exist in the crew's agent set. The resolved agents are kept
        // so consumers never re-do the lookup.
        let mut agents = Vec::with_capacity(crew.tasks.len());
        for task in &crew.tasks {
            for dep in &task.depends_on {
                if !index.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            match crew.agent(&task.agent) {
                Some(agent) => agents.push(agent.clone()),
                None => {
                    return Err(GraphError::UnknownAgent {
                        task: task.id.clone(),
                        agent: task.agent.clone(),
                    })
                }
            }
        }

        Self::check_acyclic(&crew.tasks, &index)?;

        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in &crew.tasks {
            for dep in &task.depends_on {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.id.clone());
            }
        }

        Ok(Self {
            tasks: crew.tasks.clone(),
            agents,
            index,
            dependents,
        })
    }

    /// Depth-first traversal with a three-color visited marker. Any edge
    /// back to a node still on the traversal stack (gray) is a cycle.
    fn check_acyclic(tasks: &[TaskSpec], index: &HashMap<TaskId, usize>) -> Result<(), GraphError> {
        let mut marks = vec![Mark::White; tasks.len()];

        fn visit(
            i: usize,
            tasks: &[TaskSpec],
            index: &HashMap<TaskId, usize>,
            marks: &mut [Mark],
        ) -> Result<(), GraphError> {
            match marks[i] {
                Mark::Black => return Ok(()),
                Mark::Gray => {
                    return Err(GraphError::Cycle {
                        task: tasks[i].id.clone(),
                    })
                }
                Mark::White => {}
            }
            marks[i] = Mark::Gray;
            for dep in &tasks[i].depends_on {
                // Resolution was checked before traversal.
                if let Some(&j) = index.get(dep) {
                    visit(j, tasks, index, marks)?;
                }
            }
            marks[i] = Mark::Black;
            Ok(())
        }

        for i in 0..tasks.len() {
            visit(i, tasks, index, &mut marks)?;
        }
        Ok(())
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// Resolved agent specs, one per task, parallel to `tasks()`.
    pub fn agents(&self) -> &[AgentSpec] {
        &self.agents
    }

    /// The resolved agent for a task.
    pub fn agent_of(&self, id: &TaskId) -> Option<&AgentSpec> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the graph has no tasks. Never true for a built
    /// graph, but keeps the type honest.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task by identity.
    pub fn get(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Direct dependencies of a task, in declaration order.
    pub fn dependencies_of(&self, id: &TaskId) -> &[TaskId] {
        self.get(id).map(|t| t.depends_on.as_slice()).unwrap_or(&[])
    }

    /// Direct dependents of a task.
    pub fn dependents_of(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
