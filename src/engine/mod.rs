// src/engine/mod.rs

//! Reconciliation engine.
//!
//! - [`job_reconciler`] recomputes one job's status from its tasks and
//!   applies the resulting transition (persistence, cascade, eviction).
//! - [`service`] is the single entry point for status reports and user
//!   commands; it mutates the hot cache and runs the watcher chain.
//! - [`runtime`] is the async shell: it reads [`IngestEvent`]s from a
//!   channel, feeds them to the service and executes the resulting
//!   [`Effects`] on a scheduler backend.

use serde::{Deserialize, Serialize};

use crate::adapters::{ReportRequest, SchedulerEvent};
use crate::exec::SchedulerCommand;
use crate::model::{Job, JobId, ReportedStatus, TaskId};

pub mod job_reconciler;
pub mod runtime;
pub mod service;

pub use job_reconciler::{JobReconciler, JobTransition};
pub use runtime::{Runtime, settle};
pub use service::{ReconciliationService, Residency};

/// Follow-up work a reconciliation step defers until the current watcher
/// chain has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cascade", rename_all = "snake_case")]
pub enum Cascade {
    /// Mark every running task of a failed job as cancelling, without
    /// re-running job status recomputation for those changes.
    CancelRunning { job_id: JobId },
    /// Make the created collect tasks of a job ready and dispatch them.
    DispatchCollect { job_id: JobId },
}

/// A status change that was applied to its task but whose watchers failed,
/// e.g. a job graph that can never succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub reason: String,
}

/// Everything a step asks the outer shell to do next.
///
/// `rejected` lists the changes in a batch whose watchers failed; the rest
/// of the batch is still applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    pub commands: Vec<SchedulerCommand>,
    pub cascades: Vec<Cascade>,
    pub rejected: Vec<Rejection>,
}

impl Effects {
    pub fn command(&mut self, command: SchedulerCommand) {
        if !command.is_empty() {
            self.commands.push(command);
        }
    }

    pub fn cascade(&mut self, cascade: Cascade) {
        self.cascades.push(cascade);
    }

    pub fn extend(&mut self, other: Effects) {
        self.commands.extend(other.commands);
        self.cascades.extend(other.cascades);
        self.rejected.extend(other.rejected);
    }

    pub fn reject(&mut self, rejection: Rejection) {
        self.rejected.push(rejection);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.cascades.is_empty() && self.rejected.is_empty()
    }
}

/// Reconciliation switches, taken from the `[reconcile]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Cancel the running tasks of a job as soon as it fails.
    pub cancel_running_on_fail: bool,
    /// Treat a job succeeding without any collect task as a corrupt graph.
    pub require_collect_task: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            cancel_running_on_fail: true,
            require_collect_task: true,
        }
    }
}

/// Events flowing into the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    /// Normalised status reports from any adapter.
    Reports { reports: Vec<ReportedStatus> },
    /// Raw Kubernetes informer callback.
    Scheduler { event: SchedulerEvent },
    /// Polling agent heartbeat.
    Heartbeat { request: ReportRequest },
    /// A newly split job.
    Submit { job: Job },
    CancelJob { job_id: JobId },
    PauseJob { job_id: JobId },
    ResumeJob { job_id: JobId },
    /// Graceful shutdown (Ctrl-C, end of input).
    Shutdown,
}
