// src/model/task.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{JobId, TaskId};
use crate::status::{TaskSnapshot, TaskStatus};

/// What a task contributes to its job.
///
/// Pipeline tasks do the actual work; collect tasks aggregate/compare the
/// pipeline output once every pipeline task has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Pipeline,
    Collect,
}

/// A single schedulable unit of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,

    /// Name of the step this task belongs to.
    #[serde(default)]
    pub step: String,

    #[serde(default)]
    pub task_type: TaskType,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub retry_count: u32,

    /// Agent, node or pod currently executing the task.
    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, job_id: JobId, task_type: TaskType) -> Self {
        Self {
            id,
            job_id,
            step: String::new(),
            task_type,
            status: TaskStatus::Created,
            retry_count: 0,
            assignee: None,
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn in_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot::new(self.task_type, self.status)
    }

    /// Build the dispatch instruction handed to a scheduler backend.
    pub fn trigger(&self) -> TaskTrigger {
        TaskTrigger {
            task_id: self.id,
            job_id: self.job_id,
            step: self.step.clone(),
            task_type: self.task_type,
            retry_count: self.retry_count,
        }
    }
}

/// Instruction for a scheduler to start executing a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTrigger {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub step: String,
    pub task_type: TaskType,
    pub retry_count: u32,
}
