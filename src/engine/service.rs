// src/engine/service.rs

//! Single entry point for everything that changes task or job status.
//!
//! Status reports, cascades and user commands all funnel through
//! [`ReconciliationService::apply_status_change`], which mutates the hot cache
//! and returns the change event. The caller then dispatches that event to the
//! watcher chain, so the side effects of a change are always explicit.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::cache::{CacheUpdate, HotCache};
use crate::engine::{Cascade, Effects, JobReconciler, ReconcileOptions, Rejection};
use crate::errors::{LifecycleError, Result};
use crate::exec::SchedulerCommand;
use crate::model::{Job, JobId, ReportedStatus, Task, TaskId, TaskStatusChange, TaskTrigger, TaskType};
use crate::status::{JobStatus, TaskStatus};
use crate::store::Store;
use crate::watchers::{
    JobStatusWatcher, LifecycleGraphWatcher, LifecycleRecorder, SuppressedWatchers, WatcherChain,
};

/// Where a task was found by [`ReconciliationService::ensure_hot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Already in the hot cache.
    Hot,
    /// Loaded from the store together with its job.
    Loaded,
    /// Known to the store, but the job is finished.
    Settled(TaskStatus),
    /// Unknown everywhere.
    Missing,
}

pub struct ReconciliationService {
    cache: Arc<HotCache>,
    store: Arc<dyn Store>,
    reconciler: Arc<JobReconciler>,
    chain: WatcherChain,
}

impl ReconciliationService {
    pub fn new(
        cache: Arc<HotCache>,
        store: Arc<dyn Store>,
        reconciler: Arc<JobReconciler>,
        chain: WatcherChain,
    ) -> Self {
        Self {
            cache,
            store,
            reconciler,
            chain,
        }
    }

    /// Service with the job-status and lifecycle-graph watchers registered.
    pub fn with_standard_watchers(
        cache: Arc<HotCache>,
        store: Arc<dyn Store>,
        options: ReconcileOptions,
        recorder: Arc<dyn LifecycleRecorder>,
    ) -> Self {
        let reconciler = Arc::new(JobReconciler::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            options,
        ));
        let chain = WatcherChain::new()
            .register(Arc::new(JobStatusWatcher::new(Arc::clone(&reconciler))))
            .register(Arc::new(LifecycleGraphWatcher::new(recorder)));
        Self::new(cache, store, reconciler, chain)
    }

    pub fn cache(&self) -> &Arc<HotCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn reconciler(&self) -> &Arc<JobReconciler> {
        &self.reconciler
    }

    pub fn watchers(&self) -> &WatcherChain {
        &self.chain
    }

    /// Ingest a batch of reported statuses.
    ///
    /// Reports are applied in order, so several reports for the same task
    /// keep their arrival order. Duplicates and reports repeating the cached
    /// status are no-ops. A change whose watchers fail (e.g. a job that
    /// cannot succeed without a collect task) is listed in
    /// [`Effects::rejected`] and the rest of the batch is still applied.
    pub async fn receive(&self, reports: Vec<ReportedStatus>) -> Result<Effects> {
        let mut effects = Effects::default();
        let suppressed = SuppressedWatchers::none();

        for report in reports {
            if let Some(change) = self.apply_status_change(&report).await? {
                self.notify(&change, &suppressed, &mut effects).await;
            }
        }
        Ok(effects)
    }

    /// Run the watcher chain for one change, turning a failure into a
    /// rejection entry.
    async fn notify(
        &self,
        change: &TaskStatusChange,
        suppressed: &SuppressedWatchers,
        effects: &mut Effects,
    ) {
        if let Err(err) = self.chain.dispatch(change, suppressed, effects).await {
            warn!(
                task = %change.task_id,
                job = %change.job_id,
                error = %err,
                "status change rejected by watchers"
            );
            effects.reject(Rejection {
                task_id: change.task_id,
                job_id: change.job_id,
                reason: err.to_string(),
            });
        }
    }

    /// Apply one report to the hot cache and return the resulting change.
    ///
    /// Cold tasks are written straight to the store and yield no change.
    pub async fn apply_status_change(
        &self,
        report: &ReportedStatus,
    ) -> Result<Option<TaskStatusChange>> {
        match self.cache.apply(report) {
            CacheUpdate::Changed(change) => {
                if !change.old.could_transfer(change.new) {
                    warn!(
                        task = %change.task_id,
                        old = ?change.old,
                        new = ?change.new,
                        "unlisted task transition; applying anyway"
                    );
                }
                if report.has_details() {
                    self.persist_details(report.id).await;
                }
                Ok(Some(change))
            }
            CacheUpdate::Unchanged => {
                trace!(task = %report.id, status = ?report.status, "report repeats cached status");
                Ok(None)
            }
            CacheUpdate::Cold => {
                self.write_through_cold(report).await;
                Ok(None)
            }
        }
    }

    /// Mirror a report for a task outside the hot cache into the store.
    ///
    /// A task the store already holds as terminal is never moved off its
    /// terminal status; such reports are replays of old scheduler state.
    async fn write_through_cold(&self, report: &ReportedStatus) {
        match self.store.find_task(report.id).await {
            Ok(Some(stored)) if stored.status.is_final() => {
                if stored.status != report.status {
                    warn!(
                        task = %report.id,
                        stored = ?stored.status,
                        reported = ?report.status,
                        "stale report for finished task; ignoring"
                    );
                }
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(task = %report.id, error = %err, "store lookup for cold task failed; skipping write");
                return;
            }
        }

        warn!(
            task = %report.id,
            status = ?report.status,
            "status report for cold task; writing through to store"
        );
        if let Err(err) = self
            .store
            .batch_update_task_status(&[report.id], report.status)
            .await
        {
            warn!(task = %report.id, error = %err, "write-through for cold task failed");
        }
    }

    /// Write retry count, timestamps and failure reason through to the store.
    /// The status itself still goes through the persistence drain.
    async fn persist_details(&self, id: TaskId) {
        let Some(task) = self.cache.task(id) else {
            return;
        };
        match self.store.update_task(&task).await {
            Ok(true) => {}
            Ok(false) => debug!(task = %id, "task details not written; task unknown to store"),
            Err(err) => warn!(task = %id, error = %err, "failed to persist task details"),
        }
    }

    async fn transition(
        &self,
        report: ReportedStatus,
        suppressed: &SuppressedWatchers,
        effects: &mut Effects,
    ) -> Result<bool> {
        match self.apply_status_change(&report).await? {
            Some(change) => {
                self.notify(&change, suppressed, effects).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Execute a deferred cascade.
    pub async fn run_cascade(&self, cascade: Cascade) -> Result<Effects> {
        let mut effects = Effects::default();

        match cascade {
            Cascade::CancelRunning { job_id } => {
                // The job is already failing; recomputing it for every
                // cancelled task would only fight the transition in flight.
                let suppressed = SuppressedWatchers::only(JobStatusWatcher::NAME);
                let running: Vec<TaskId> = self
                    .cache
                    .of_job(job_id)
                    .into_iter()
                    .filter(|t| t.status == TaskStatus::Running)
                    .map(|t| t.id)
                    .collect();

                info!(job = %job_id, count = running.len(), "cancelling running tasks of failed job");
                for id in &running {
                    let report = ReportedStatus::new(*id, TaskStatus::Cancelling);
                    self.transition(report, &suppressed, &mut effects).await?;
                }
                effects.command(SchedulerCommand::Cancel { tasks: running });
            }
            Cascade::DispatchCollect { job_id } => {
                let collect: Vec<Task> = self
                    .cache
                    .of_job(job_id)
                    .into_iter()
                    .filter(|t| t.task_type == TaskType::Collect && t.status == TaskStatus::Created)
                    .collect();

                info!(job = %job_id, count = collect.len(), "dispatching collect tasks");
                let suppressed = SuppressedWatchers::none();
                let mut triggers = Vec::with_capacity(collect.len());
                for task in &collect {
                    let report = ReportedStatus::new(task.id, TaskStatus::Ready);
                    if self.transition(report, &suppressed, &mut effects).await? {
                        triggers.push(task.trigger());
                    }
                }
                effects.command(SchedulerCommand::Dispatch { tasks: triggers });
            }
        }

        Ok(effects)
    }

    /// Register a newly split job and dispatch its pipeline tasks.
    pub async fn submit(&self, mut job: Job) -> Result<Effects> {
        if self.cache.contains_job(job.id) {
            warn!(job = %job.id, "job already hot; ignoring resubmission");
            return Ok(Effects::default());
        }
        if !job.tasks().any(|t| t.task_type == TaskType::Pipeline) {
            return Err(LifecycleError::Validation(format!(
                "{} has no pipeline task",
                job.id
            )));
        }
        if !job.tasks().any(|t| t.task_type == TaskType::Collect) {
            warn!(job = %job.id, "job has no collect task; it cannot complete successfully");
        }

        job.status = JobStatus::Created;
        for task in job.tasks_mut() {
            task.status = TaskStatus::Created;
        }
        self.store.save_job(&job).await?;
        self.cache.adopt_job(&job);

        let pipeline: Vec<Task> = job
            .tasks()
            .filter(|t| t.task_type == TaskType::Pipeline)
            .cloned()
            .collect();
        let ids: Vec<TaskId> = pipeline.iter().map(|t| t.id).collect();
        let triggers: Vec<TaskTrigger> = pipeline.iter().map(Task::trigger).collect();

        self.cache.adopt(pipeline, TaskStatus::Ready);
        self.store
            .batch_update_task_status(&ids, TaskStatus::Ready)
            .await?;
        info!(job = %job.id, tasks = ids.len(), "job submitted; pipeline tasks ready");

        let mut effects = Effects::default();
        self.reconciler.reconcile(job.id, &mut effects).await?;
        effects.command(SchedulerCommand::Dispatch { tasks: triggers });
        Ok(effects)
    }

    /// User cancel request.
    ///
    /// Tasks already handed to a scheduler go to `Cancelling` and get a
    /// cancel command; the rest are cancelled on the spot.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<Effects> {
        let job = self
            .cache
            .job(job_id)
            .ok_or(LifecycleError::JobNotFound(job_id))?;
        if job.status.is_final() {
            warn!(job = %job_id, status = ?job.status, "cancel requested for finished job");
            return Ok(Effects::default());
        }

        self.reconciler
            .force_status(job_id, JobStatus::ToCancel)
            .await?;

        let tasks = self.cache.of_job(job_id);
        let (unstarted, started): (Vec<&Task>, Vec<&Task>) = tasks
            .iter()
            .filter(|t| !t.status.is_final() && t.status != TaskStatus::Cancelling)
            .partition(|t| {
                matches!(
                    t.status,
                    TaskStatus::Created | TaskStatus::Ready | TaskStatus::Paused
                )
            });

        let mut effects = Effects::default();
        let suppressed = SuppressedWatchers::none();

        // Cancelling first, so the job never looks fully cancelled while
        // started tasks are still winding down.
        let started_ids: Vec<TaskId> = started.iter().map(|t| t.id).collect();
        for id in &started_ids {
            let report = ReportedStatus::new(*id, TaskStatus::Cancelling);
            self.transition(report, &suppressed, &mut effects).await?;
        }
        for task in unstarted {
            let report = ReportedStatus::new(task.id, TaskStatus::Canceled);
            self.transition(report, &suppressed, &mut effects).await?;
        }

        info!(job = %job_id, started = started_ids.len(), "job cancel requested");
        effects.command(SchedulerCommand::Cancel { tasks: started_ids });
        Ok(effects)
    }

    /// Hold back every ready task of a job. Running tasks are left alone.
    pub async fn pause_job(&self, job_id: JobId) -> Result<Effects> {
        self.move_tasks(job_id, TaskStatus::Ready, TaskStatus::Paused)
            .await
            .map(|(effects, _)| effects)
    }

    /// Release paused tasks and dispatch them again.
    pub async fn resume_job(&self, job_id: JobId) -> Result<Effects> {
        let (mut effects, resumed) = self
            .move_tasks(job_id, TaskStatus::Paused, TaskStatus::Ready)
            .await?;
        let triggers = resumed.iter().map(Task::trigger).collect();
        effects.command(SchedulerCommand::Dispatch { tasks: triggers });
        Ok(effects)
    }

    async fn move_tasks(
        &self,
        job_id: JobId,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<(Effects, Vec<Task>)> {
        let job = self
            .cache
            .job(job_id)
            .ok_or(LifecycleError::JobNotFound(job_id))?;
        if job.status.is_final() {
            warn!(job = %job_id, status = ?job.status, ?to, "ignoring request for finished job");
            return Ok((Effects::default(), Vec::new()));
        }

        let mut effects = Effects::default();
        let mut moved = Vec::new();
        let suppressed = SuppressedWatchers::none();
        for task in self.cache.of_job(job_id).into_iter().filter(|t| t.status == from) {
            let report = ReportedStatus::new(task.id, to);
            if self.transition(report, &suppressed, &mut effects).await? {
                moved.push(task);
            }
        }

        info!(job = %job_id, ?from, ?to, count = moved.len(), "moved job tasks");
        Ok((effects, moved))
    }

    /// Hand up to `capacity` ready tasks to `node`, marking them `Assigning`.
    pub async fn schedule(&self, node: &str, capacity: usize) -> Result<(Vec<TaskTrigger>, Effects)> {
        let mut effects = Effects::default();
        let mut triggers = Vec::new();
        if capacity == 0 {
            return Ok((triggers, effects));
        }

        let suppressed = SuppressedWatchers::none();
        let candidates = self
            .cache
            .of_status(TaskStatus::Ready)
            .into_iter()
            .filter(|t| {
                self.cache.job(t.job_id).is_some_and(|j| {
                    !j.status.is_final()
                        && !matches!(j.status, JobStatus::ToCancel | JobStatus::Canceling)
                })
            })
            .take(capacity);

        for task in candidates {
            let report = ReportedStatus::new(task.id, TaskStatus::Assigning).with_assignee(node);
            if self.transition(report, &suppressed, &mut effects).await? {
                triggers.push(task.trigger());
            }
        }

        debug!(node, count = triggers.len(), "scheduled tasks onto node");
        Ok((triggers, effects))
    }

    /// Make sure `id` is hot, loading its job from the store if needed.
    pub async fn ensure_hot(&self, id: TaskId) -> Result<Residency> {
        if self.cache.contains_task(id) {
            return Ok(Residency::Hot);
        }

        let Some(task) = self.store.find_task(id).await? else {
            return Ok(Residency::Missing);
        };
        let Some(job) = self.store.find_job(task.job_id).await? else {
            return Ok(Residency::Missing);
        };
        if !job.is_active() {
            return Ok(Residency::Settled(task.status));
        }

        self.cache.adopt_job(&job);
        debug!(task = %id, job = %job.id, "lazily loaded job into hot cache");
        Ok(Residency::Loaded)
    }

    /// Adopt every active job from the store. Returns how many were loaded.
    pub async fn warm_start(&self) -> Result<usize> {
        let mut loaded = 0;
        for job in self.store.list_active_jobs().await? {
            if self.cache.contains_job(job.id) {
                continue;
            }
            self.cache.adopt_job(&job);
            loaded += 1;
        }
        info!(jobs = loaded, tasks = self.cache.task_count(), "warm start complete");
        Ok(loaded)
    }
}
