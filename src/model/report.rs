// src/model/report.rs

//! Values flowing into and out of the reconciliation service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{JobId, TaskId, TaskType};
use crate::status::TaskStatus;

/// A normalised, untrusted status sample produced by an ingestion adapter.
///
/// Consumed once by the reconciliation service; never stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedStatus {
    pub id: TaskId,
    pub status: TaskStatus,

    #[serde(default)]
    pub task_type: Option<TaskType>,

    #[serde(default)]
    pub retry_count: Option<u32>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub failure_reason: Option<String>,

    /// Execution unit (agent, node, pod) the report came from.
    #[serde(default)]
    pub assignee: Option<String>,
}

impl ReportedStatus {
    pub fn new(id: TaskId, status: TaskStatus) -> Self {
        Self {
            id,
            status,
            task_type: None,
            retry_count: None,
            started_at: None,
            finished_at: None,
            failure_reason: None,
            assignee: None,
        }
    }

    /// Whether the report carries anything beyond the bare status.
    pub fn has_details(&self) -> bool {
        self.retry_count.is_some()
            || self.started_at.is_some()
            || self.finished_at.is_some()
            || self.failure_reason.is_some()
            || self.assignee.is_some()
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }
}

/// Event produced by every applied task status change and handed to the
/// watcher chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusChange {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub old: TaskStatus,
    pub new: TaskStatus,
    pub at: DateTime<Utc>,
}
