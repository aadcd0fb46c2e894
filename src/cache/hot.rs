// src/cache/hot.rs

//! Concurrent registry of hot (non-terminal, or owned by a non-terminal job)
//! tasks and jobs.
//!
//! The indexes are separate `DashMap`s with no lock spanning them. Moving a
//! task between status buckets is remove-then-add, so a concurrent reader can
//! briefly see the id in neither or both buckets. The task's own `status`
//! field is the authority; the buckets are a query aid.
//!
//! Lock order: a `tasks` entry may be held while touching `by_status`, never
//! the other way round. No guard is ever held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::model::{Job, JobId, ReportedStatus, Task, TaskId, TaskStatusChange};
use crate::status::{TaskSnapshot, TaskStatus};

/// Outcome of applying a reported status to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
    /// The task is not hot (never adopted or already evicted).
    Cold,
    /// The task already had this status; only metadata was merged.
    Unchanged,
    Changed(TaskStatusChange),
}

#[derive(Debug, Default)]
pub struct HotCache {
    tasks: DashMap<TaskId, Task>,
    by_status: DashMap<TaskStatus, HashSet<TaskId>>,
    by_job: DashMap<JobId, HashSet<TaskId>>,
    jobs: DashMap<JobId, Job>,

    /// Status writes not yet mirrored to the store. Keyed by task so repeated
    /// changes collapse into the latest one, which bounds the backlog by the
    /// number of distinct tasks touched between two drains.
    pending: Mutex<HashMap<TaskId, TaskStatus>>,
}

impl HotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-register tasks under the given status.
    ///
    /// Used at warm start and when a batch of tasks is handed to a scheduler.
    /// Nothing is queued for persistence; the caller owns the durable write.
    pub fn adopt(&self, tasks: impl IntoIterator<Item = Task>, status: TaskStatus) -> usize {
        let mut adopted = 0;
        for mut task in tasks {
            task.status = status;
            self.insert_task(task);
            adopted += 1;
        }
        debug!(count = adopted, ?status, "adopted tasks into hot cache");
        adopted
    }

    /// Register a job header and every task it owns, each under its own
    /// current status.
    pub fn adopt_job(&self, job: &Job) {
        self.jobs.insert(job.id, job.header());
        self.by_job.entry(job.id).or_default();
        for task in job.tasks() {
            self.insert_task(task.clone());
        }
        debug!(job = %job.id, status = ?job.status, "adopted job into hot cache");
    }

    fn insert_task(&self, task: Task) {
        let id = task.id;
        let job_id = task.job_id;
        let status = task.status;

        if let Some(previous) = self.tasks.insert(id, task) {
            if previous.status != status {
                self.unindex(previous.status, id);
            }
        }
        self.by_status.entry(status).or_default().insert(id);
        self.by_job.entry(job_id).or_default().insert(id);
    }

    fn unindex(&self, status: TaskStatus, id: TaskId) {
        if let Some(mut bucket) = self.by_status.get_mut(&status) {
            bucket.remove(&id);
        }
        self.by_status.remove_if(&status, |_, bucket| bucket.is_empty());
    }

    /// Set a task's status. See [`HotCache::apply`].
    pub fn update(&self, id: TaskId, status: TaskStatus) -> CacheUpdate {
        self.apply(&ReportedStatus::new(id, status))
    }

    /// Merge a reported status into the cached task.
    ///
    /// Cold tasks are left alone. A status change moves the id between
    /// status buckets and queues the new status for persistence.
    pub fn apply(&self, report: &ReportedStatus) -> CacheUpdate {
        let Some(mut entry) = self.tasks.get_mut(&report.id) else {
            return CacheUpdate::Cold;
        };
        let task = entry.value_mut();

        if let Some(retry_count) = report.retry_count {
            task.retry_count = retry_count;
        }
        if let Some(at) = report.started_at {
            task.started_at = Some(at);
        }
        if let Some(at) = report.finished_at {
            task.finished_at = Some(at);
        }
        if let Some(reason) = &report.failure_reason {
            task.failure_reason = Some(reason.clone());
        }
        if let Some(assignee) = &report.assignee {
            task.assignee = Some(assignee.clone());
        }

        let old = task.status;
        let new = report.status;
        if old == new {
            return CacheUpdate::Unchanged;
        }

        task.status = new;
        let job_id = task.job_id;

        self.unindex(old, report.id);
        self.by_status.entry(new).or_default().insert(report.id);
        drop(entry);

        self.pending().insert(report.id, new);
        trace!(task = %report.id, ?old, ?new, "task status updated in hot cache");

        CacheUpdate::Changed(TaskStatusChange {
            task_id: report.id,
            job_id,
            old,
            new,
            at: Utc::now(),
        })
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.tasks.get(&id).map(|t| t.value().clone())
    }

    pub fn contains_task(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Ids currently filed under `status` in the status index.
    pub fn ids_of_status(&self, status: TaskStatus) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .by_status
            .get(&status)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Snapshot of the tasks with the given status, ordered by id.
    pub fn of_status(&self, status: TaskStatus) -> Vec<Task> {
        self.ids_of_status(status)
            .into_iter()
            .filter_map(|id| self.task(id))
            .filter(|t| t.status == status)
            .collect()
    }

    /// Snapshot of the requested tasks that are hot, in request order.
    pub fn of_ids(&self, ids: &[TaskId]) -> Vec<Task> {
        ids.iter().filter_map(|id| self.task(*id)).collect()
    }

    /// Snapshot of every hot task owned by `job_id`, ordered by id.
    pub fn of_job(&self, job_id: JobId) -> Vec<Task> {
        self.of_ids(&self.job_task_ids(job_id))
    }

    /// Ids filed under `job_id` in the job index.
    pub fn job_task_ids(&self, job_id: JobId) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .by_job
            .get(&job_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn snapshot_of(&self, job_id: JobId) -> Vec<TaskSnapshot> {
        self.of_job(job_id).iter().map(Task::snapshot).collect()
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        self.jobs.get(&id).map(|j| j.value().clone())
    }

    pub fn contains_job(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id) || self.by_job.contains_key(&id)
    }

    /// Every hot job header, ordered by id.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Mutate a job header in place and return the updated copy.
    pub fn update_job(&self, id: JobId, f: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut entry = self.jobs.get_mut(&id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Drop a job and every task it owns from all indexes.
    ///
    /// Returns the evicted tasks. Pending persistence for them is kept so
    /// their final statuses still reach the store.
    pub fn clear_tasks_of(&self, job_id: JobId) -> Vec<Task> {
        self.jobs.remove(&job_id);
        let ids = self
            .by_job
            .remove(&job_id)
            .map(|(_, ids)| ids)
            .unwrap_or_default();

        let mut evicted = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                self.unindex(task.status, id);
                evicted.push(task);
            }
        }
        evicted.sort_by_key(|t| t.id);

        debug!(job = %job_id, tasks = evicted.len(), "evicted job from hot cache");
        evicted
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<TaskId, TaskStatus>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take every queued status write, leaving the queue empty.
    pub fn take_pending(&self) -> HashMap<TaskId, TaskStatus> {
        std::mem::take(&mut *self.pending())
    }

    /// Put back writes that failed to persist. A newer status recorded since
    /// the take wins over the re-queued one.
    pub fn requeue(&self, entries: impl IntoIterator<Item = (TaskId, TaskStatus)>) {
        let mut pending = self.pending();
        for (id, status) in entries {
            pending.entry(id).or_insert(status);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }
}
