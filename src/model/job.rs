// src/model/job.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{JobId, Task};
use crate::status::JobStatus;

/// An ordered group of tasks inside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    /// Wall time between creation and the terminal transition.
    #[serde(default)]
    pub duration_ms: Option<i64>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Created,
            created_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            steps: Vec::new(),
        }
    }

    /// Append a step. Task `job_id` and `step` fields are normalised to this
    /// job and step name.
    pub fn with_step(mut self, name: impl Into<String>, tasks: Vec<Task>) -> Self {
        let name = name.into();
        let tasks = tasks
            .into_iter()
            .map(|mut t| {
                t.job_id = self.id;
                t.step = name.clone();
                t
            })
            .collect();
        self.steps.push(Step { name, tasks });
        self
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.steps.iter().flat_map(|s| s.tasks.iter())
    }

    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.steps.iter_mut().flat_map(|s| s.tasks.iter_mut())
    }

    /// Copy of the job without its step/task tree.
    ///
    /// The hot cache keeps tasks in their own indexes, so only the header is
    /// stored per job.
    pub fn header(&self) -> Job {
        Job {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms,
            steps: Vec::new(),
        }
    }

    /// True while the job itself or any of its tasks can still change.
    pub fn is_active(&self) -> bool {
        !self.status.is_final() || self.tasks().any(|t| !t.status.is_final())
    }
}
