//! Background job contract for export and reindex work
//!
//! The document-store backend only records jobs; executing them belongs to a worker outside
//! this crate.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Work a job performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum JobDefinition {
    /// Bulk export of stored resources
    Export {
        resource_types: Vec<String>,
        since: Option<DateTime<Utc>>,
    },
    /// Recompute search indexes after search-parameter changes
    Reindex {
        resource_type: Option<String>,
        parameter_urls: Vec<String>,
    },
}

impl JobDefinition {
    pub fn job_type_name(&self) -> &'static str {
        match self {
            JobDefinition::Export { .. } => "export",
            JobDefinition::Reindex { .. } => "reindex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    /// Jobs enqueued together share a group.
    pub group_id: Uuid,
    pub definition: JobDefinition,
    pub status: JobStatus,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobInfo {
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// How a job finished.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(JsonValue),
    Failed(String),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues `definitions` as one group. Returns the created jobs in input order.
    async fn enqueue(&self, definitions: Vec<JobDefinition>) -> Result<Vec<JobInfo>>;

    async fn get_job(&self, id: Uuid) -> Result<JobInfo>;

    async fn complete_job(&self, id: Uuid, outcome: JobOutcome) -> Result<JobInfo>;

    /// Requests cancellation. Pending jobs are cancelled at once; finished jobs are unchanged.
    async fn cancel_job(&self, id: Uuid) -> Result<JobInfo>;
}

/// Job queue held in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobQueue {
    jobs: Arc<RwLock<HashMap<Uuid, JobInfo>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown_job(id: Uuid) -> Error {
    Error::JobQueue(format!("job {id} not found"))
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, definitions: Vec<JobDefinition>) -> Result<Vec<JobInfo>> {
        if definitions.is_empty() {
            return Err(Error::JobQueue("nothing to enqueue".to_string()));
        }
        let group_id = Uuid::new_v4();
        let now = Utc::now();
        let created: Vec<JobInfo> = definitions
            .into_iter()
            .map(|definition| JobInfo {
                id: Uuid::new_v4(),
                group_id,
                definition,
                status: JobStatus::Pending,
                result: None,
                error_message: None,
                cancel_requested: false,
                created_at: now,
                completed_at: None,
            })
            .collect();

        let mut jobs = self.jobs.write().await;
        for job in &created {
            tracing::debug!(
                job_id = %job.id,
                job_type = job.definition.job_type_name(),
                "Job enqueued"
            );
            jobs.insert(job.id, job.clone());
        }
        Ok(created)
    }

    async fn get_job(&self, id: Uuid) -> Result<JobInfo> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| unknown_job(id))
    }

    async fn complete_job(&self, id: Uuid, outcome: JobOutcome) -> Result<JobInfo> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| unknown_job(id))?;
        if job.is_complete() {
            return Err(Error::JobQueue(format!("job {id} is already finished")));
        }

        match outcome {
            JobOutcome::Succeeded(result) => {
                job.status = JobStatus::Completed;
                job.result = Some(result);
            }
            JobOutcome::Failed(message) => {
                tracing::warn!(job_id = %id, error = %message, "Job failed");
                job.status = JobStatus::Failed;
                job.error_message = Some(message);
            }
        }
        job.completed_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn cancel_job(&self, id: Uuid) -> Result<JobInfo> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| unknown_job(id))?;
        if job.is_complete() {
            return Ok(job.clone());
        }

        job.cancel_requested = true;
        if job.status == JobStatus::Pending {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
        }
        Ok(job.clone())
    }
}
