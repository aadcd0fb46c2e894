// src/engine/job_reconciler.rs

//! Per-job status reconciliation.
//!
//! For each triggering change:
//!
//! 1. snapshot every task of the job,
//! 2. compute the desired status,
//! 3. stop if it equals the current one,
//! 4. warn on a transition the table does not list, but carry on,
//! 5. store the new status (plus finish time and duration when terminal),
//! 6. queue the follow-up cascade (`Fail` cancels running tasks,
//!    `ToCollectResult` dispatches collect tasks),
//! 7. evict the job once it is terminal and owns no live task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::HotCache;
use crate::engine::{Cascade, Effects, ReconcileOptions};
use crate::errors::{LifecycleError, Result};
use crate::model::{Job, JobId, Task, TaskType};
use crate::status::{JobStatus, JobStatusCalculator};
use crate::store::Store;

/// A job status change applied by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTransition {
    pub job_id: JobId,
    pub old: JobStatus,
    pub new: JobStatus,
}

pub struct JobReconciler {
    cache: Arc<HotCache>,
    store: Arc<dyn Store>,
    calculator: JobStatusCalculator,
    options: ReconcileOptions,
}

impl JobReconciler {
    pub fn new(cache: Arc<HotCache>, store: Arc<dyn Store>, options: ReconcileOptions) -> Self {
        Self {
            cache,
            store,
            calculator: JobStatusCalculator::new(),
            options,
        }
    }

    pub fn with_calculator(mut self, calculator: JobStatusCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    /// Recompute `job_id` from its current tasks.
    ///
    /// Returns the applied transition, or `None` when the job is cold or
    /// already in the desired status.
    pub async fn reconcile(
        &self,
        job_id: JobId,
        effects: &mut Effects,
    ) -> Result<Option<JobTransition>> {
        let Some(job) = self.cache.job(job_id) else {
            debug!(job = %job_id, "job not hot; nothing to reconcile");
            return Ok(None);
        };

        let tasks = self.cache.of_job(job_id);
        let snapshot: Vec<_> = tasks.iter().map(Task::snapshot).collect();
        let desired = self.calculator.desired_status(&snapshot);

        if desired == job.status {
            // A failed job waits for its cancelled tasks to settle before it
            // can leave the cache, so settled jobs are re-checked here too.
            self.evict_if_settled(job_id, desired, &tasks);
            return Ok(None);
        }

        if desired == JobStatus::Success
            && self.options.require_collect_task
            && !tasks.iter().any(|t| t.task_type == TaskType::Collect)
        {
            return Err(LifecycleError::Validation(format!(
                "{job_id} reached SUCCESS without a collect task"
            )));
        }

        if !job.status.could_transfer(desired) {
            warn!(
                job = %job_id,
                old = ?job.status,
                new = ?desired,
                "unlisted job transition; applying anyway"
            );
        }

        self.apply(&job, desired).await;

        match desired {
            JobStatus::Fail if self.options.cancel_running_on_fail => {
                effects.cascade(Cascade::CancelRunning { job_id });
            }
            JobStatus::ToCollectResult => {
                effects.cascade(Cascade::DispatchCollect { job_id });
            }
            _ => {}
        }

        self.evict_if_settled(job_id, desired, &tasks);

        Ok(Some(JobTransition {
            job_id,
            old: job.status,
            new: desired,
        }))
    }

    /// Set a job status outside the calculator (e.g. `ToCancel` on a user
    /// request) and persist it.
    pub async fn force_status(&self, job_id: JobId, status: JobStatus) -> Result<JobTransition> {
        let job = self
            .cache
            .job(job_id)
            .ok_or(LifecycleError::JobNotFound(job_id))?;
        self.apply(&job, status).await;
        Ok(JobTransition {
            job_id,
            old: job.status,
            new: status,
        })
    }

    async fn apply(&self, job: &Job, status: JobStatus) {
        let now = Utc::now();
        let finished = status.is_final().then(|| {
            let duration_ms = (now - job.created_at).num_milliseconds().max(0);
            (now, duration_ms)
        });

        self.cache.update_job(job.id, |j| {
            j.status = status;
            if let Some((at, duration_ms)) = finished {
                j.finished_at = Some(at);
                j.duration_ms = Some(duration_ms);
            }
        });
        info!(job = %job.id, old = ?job.status, new = ?status, "job status changed");

        self.persist(job.id, status, finished).await;
    }

    /// Store failures are logged only; the hot cache stays authoritative and
    /// the next transition writes the job again.
    async fn persist(
        &self,
        job_id: JobId,
        status: JobStatus,
        finished: Option<(DateTime<Utc>, i64)>,
    ) {
        if let Err(err) = self.store.update_job_status(job_id, status).await {
            warn!(job = %job_id, ?status, error = %err, "failed to persist job status");
        }
        if let Some((at, duration_ms)) = finished {
            if let Err(err) = self.store.update_job_finished(job_id, at, duration_ms).await {
                warn!(job = %job_id, error = %err, "failed to persist job finish time");
            }
        }
    }

    fn evict_if_settled(&self, job_id: JobId, status: JobStatus, tasks: &[Task]) {
        if status.is_final() && tasks.iter().all(|t| t.status.is_final()) {
            let evicted = self.cache.clear_tasks_of(job_id);
            info!(job = %job_id, ?status, tasks = evicted.len(), "job settled; evicted from hot cache");
        }
    }
}
