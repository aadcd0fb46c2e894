#![allow(dead_code)]

use lifecycle::config::{
    ConfigFile, PersistenceSection, RawConfigFile, ReconcileSection, SchedulerKind,
    SchedulerSection,
};
use lifecycle::model::{Job, JobId, Task, TaskId, TaskType};
use lifecycle::status::{JobStatus, TaskStatus};

/// Builder for `Job` to simplify test setup.
///
/// Task ids are given explicitly so tests can report against them.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            job: Job::new(JobId(id)),
        }
    }

    /// Step with pipeline tasks in `Created`.
    pub fn pipeline(self, step: &str, ids: &[u64]) -> Self {
        self.step(step, TaskType::Pipeline, ids, TaskStatus::Created)
    }

    /// Step with collect tasks in `Created`.
    pub fn collect(self, step: &str, ids: &[u64]) -> Self {
        self.step(step, TaskType::Collect, ids, TaskStatus::Created)
    }

    pub fn step(mut self, step: &str, task_type: TaskType, ids: &[u64], status: TaskStatus) -> Self {
        let job_id = self.job.id;
        let tasks = ids
            .iter()
            .map(|id| Task::new(TaskId(*id), job_id, task_type).with_status(status))
            .collect();
        self.job = self.job.with_step(step, tasks);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// The usual shape: one pipeline step and one collect step.
pub fn standard_job(id: u64, pipeline: &[u64], collect: &[u64]) -> Job {
    JobBuilder::new(id)
        .pipeline("train", pipeline)
        .collect("collect", collect)
        .build()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                persistence: PersistenceSection::default(),
                reconcile: ReconcileSection::default(),
                scheduler: SchedulerSection::default(),
            },
        }
    }

    pub fn backend(mut self, kind: SchedulerKind) -> Self {
        self.config.scheduler.backend = kind;
        self
    }

    pub fn drain_interval_ms(mut self, ms: u64) -> Self {
        self.config.persistence.drain_interval_ms = ms;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.persistence.batch_size = size;
        self
    }

    pub fn cancel_running_on_fail(mut self, val: bool) -> Self {
        self.config.reconcile.cancel_running_on_fail = val;
        self
    }

    pub fn task_id_label(mut self, label: &str) -> Self {
        self.config.scheduler.task_id_label = label.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
