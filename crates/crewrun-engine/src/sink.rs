//! Result delivery for finished jobs.

use async_trait::async_trait;
use crewrun_core::{Job, JobId, TaskId};
use serde_json::json;
use tokio::sync::RwLock;

/// What a finished job delivers: the final job record plus every
/// accepted task output, in task-declaration order.
///
/// A halted or failed job still delivers; `outputs` then holds the
/// partial results captured before the halt.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDelivery {
    /// Final job record.
    pub job: Job,

    /// Accepted outputs in task-declaration order.
    pub outputs: Vec<(TaskId, String)>,

    /// Failure or halt reason for non-done jobs.
    pub failure: Option<String>,
}

impl JobDelivery {
    /// Render the delivery as a JSON value for downstream consumers.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "job_id": self.job.id.as_str(),
            "status": self.job.status.to_string(),
            "failure": self.failure,
            "outputs": self
                .outputs
                .iter()
                .map(|(task_id, output)| {
                    json!({ "task_id": task_id.as_str(), "output": output })
                })
                .collect::<Vec<_>>(),
        })
    }
}

/// Downstream consumer of finished jobs.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Receive the delivery for a terminal job. Called exactly once per
    /// job execution.
    async fn deliver(&self, delivery: JobDelivery);
}

/// Collects deliveries in memory for tests and demos.
#[derive(Default)]
pub struct MemorySink {
    deliveries: RwLock<Vec<JobDelivery>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries received so far.
    pub async fn deliveries(&self) -> Vec<JobDelivery> {
        self.deliveries.read().await.clone()
    }

    /// The delivery for a specific job, if one arrived.
    pub async fn delivery_for(&self, job_id: &JobId) -> Option<JobDelivery> {
        self.deliveries
            .read()
            .await
            .iter()
            .find(|d| &d.job.id == job_id)
            .cloned()
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn deliver(&self, delivery: JobDelivery) {
        self.deliveries.write().await.push(delivery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewrun_core::{CrewId, JobStatus};

    #[tokio::test]
    async fn test_memory_sink_collects_deliveries() {
        let sink = MemorySink::new();
        let mut job = Job::new(CrewId::new("crew-1"), "{}", 10.0);
        job.status = JobStatus::Done;

        sink.deliver(JobDelivery {
            job: job.clone(),
            outputs: vec![(TaskId::new("write"), "draft".to_string())],
            failure: None,
        })
        .await;

        let found = sink.delivery_for(&job.id).await.unwrap();
        assert_eq!(found.outputs.len(), 1);
        assert!(found.failure.is_none());
    }

    #[tokio::test]
    async fn test_delivery_json_shape() {
        let mut job = Job::new(CrewId::new("crew-1"), "{}", 10.0);
        job.status = JobStatus::Error;
        let delivery = JobDelivery {
            job,
            outputs: vec![(TaskId::new("research"), "notes".to_string())],
            failure: Some("task 'write' failed".to_string()),
        };

        let value = delivery.to_json();
        assert_eq!(value["status"], "error");
        assert_eq!(value["outputs"][0]["task_id"], "research");
        assert_eq!(value["failure"], "task 'write' failed");
    }
}
