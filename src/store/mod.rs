// src/store/mod.rs

//! Durable task/job store port.
//!
//! The hot cache is the live state; the store is an eventually consistent
//! mirror of it and the recovery source at startup. [`memory`] provides the
//! in-process implementation used by the binary and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::model::{Job, JobId, Task, TaskId};
use crate::status::{JobStatus, TaskStatus};

pub mod memory;

pub use memory::InMemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// Full job including its step/task tree.
    async fn find_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Jobs that are non-terminal or still own a non-terminal task.
    async fn list_active_jobs(&self) -> Result<Vec<Job>>;

    /// Insert or replace a job and its tasks.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Set `status` on every listed task. Returns how many were found.
    async fn batch_update_task_status(&self, ids: &[TaskId], status: TaskStatus)
    -> Result<usize>;

    /// Replace the stored copy of a single task. Returns `false` when the
    /// task is unknown to the store.
    async fn update_task(&self, task: &Task) -> Result<bool>;

    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<()>;

    async fn update_job_finished(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()>;
}
