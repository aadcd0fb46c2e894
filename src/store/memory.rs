// src/store/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::errors::{LifecycleError, Result};
use crate::model::{Job, JobId, Task, TaskId};
use crate::status::{JobStatus, TaskStatus};
use crate::store::Store;

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    /// task id -> owning job, for point lookups.
    task_owner: HashMap<TaskId, JobId>,
}

/// Process-local store backed by a `RwLock`ed map.
///
/// Writes can be switched off with [`InMemoryStore::set_available`] to
/// exercise the retry paths of callers.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
    batch_writes: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            available: AtomicBool::new(true),
            batch_writes: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful `batch_update_task_status` calls.
    pub fn batch_writes(&self) -> usize {
        self.batch_writes.load(Ordering::SeqCst)
    }

    pub fn job_count(&self) -> usize {
        self.read().jobs.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LifecycleError::Store("store unavailable".to_string()));
        }
        Ok(self.tables.write().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        let tables = self.read();
        let task = tables
            .task_owner
            .get(&id)
            .and_then(|job_id| tables.jobs.get(job_id))
            .and_then(|job| job.tasks().find(|t| t.id == id).cloned());
        Ok(task)
    }

    async fn find_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.read().jobs.get(&id).cloned())
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .read()
            .jobs
            .values()
            .filter(|job| job.is_active())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        let mut tables = self.write()?;
        for task in job.tasks() {
            tables.task_owner.insert(task.id, job.id);
        }
        tables.jobs.insert(job.id, job.clone());
        debug!(job = %job.id, "saved job");
        Ok(())
    }

    async fn batch_update_task_status(
        &self,
        ids: &[TaskId],
        status: TaskStatus,
    ) -> Result<usize> {
        let mut tables = self.write()?;
        let Tables { jobs, task_owner } = &mut *tables;

        let mut updated = 0;
        for id in ids {
            let Some(job) = task_owner.get(id).and_then(|job_id| jobs.get_mut(job_id)) else {
                trace!(task = %id, "status write for task unknown to the store");
                continue;
            };
            if let Some(task) = job.tasks_mut().find(|t| t.id == *id) {
                task.status = status;
                updated += 1;
            }
        }

        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn update_task(&self, task: &Task) -> Result<bool> {
        let mut tables = self.write()?;
        let Tables { jobs, task_owner } = &mut *tables;

        let stored = task_owner
            .get(&task.id)
            .and_then(|job_id| jobs.get_mut(job_id))
            .and_then(|job| job.tasks_mut().find(|t| t.id == task.id));
        match stored {
            Some(stored) => {
                *stored = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<()> {
        let mut tables = self.write()?;
        let job = tables
            .jobs
            .get_mut(&id)
            .ok_or(LifecycleError::JobNotFound(id))?;
        job.status = status;
        Ok(())
    }

    async fn update_job_finished(
        &self,
        id: JobId,
        finished_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()> {
        let mut tables = self.write()?;
        let job = tables
            .jobs
            .get_mut(&id)
            .ok_or(LifecycleError::JobNotFound(id))?;
        job.finished_at = Some(finished_at);
        job.duration_ms = Some(duration_ms);
        Ok(())
    }
}
