// src/adapters/agent.rs

//! Heartbeat protocol for remote polling agents.
//!
//! An agent periodically sends the statuses of the tasks it runs. The answer
//! carries the tasks it must stop and a fresh batch of tasks to start.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::{ReconciliationService, Residency, settle};
use crate::errors::Result;
use crate::exec::{AgentBackend, AgentQueue};
use crate::model::{ReportedStatus, TaskId, TaskTrigger, TaskType};
use crate::status::{JobStatus, TaskStatus};

pub const DEFAULT_AGENT_BATCH_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub total_slots: u32,
    #[serde(default)]
    pub free_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTaskReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub node: NodeInfo,
    #[serde(default)]
    pub tasks: Vec<AgentTaskReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    /// Tasks the agent must stop.
    pub cancel: Vec<TaskId>,
    /// Tasks the agent should start.
    pub run: Vec<TaskTrigger>,
}

pub struct AgentController {
    service: Arc<ReconciliationService>,
    queue: Arc<AgentQueue>,
    batch_size: usize,
}

impl AgentController {
    pub fn new(service: Arc<ReconciliationService>, queue: Arc<AgentQueue>) -> Self {
        Self {
            service,
            queue,
            batch_size: DEFAULT_AGENT_BATCH_SIZE,
        }
    }

    /// Cap on new tasks handed out per heartbeat.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Handle one heartbeat.
    ///
    /// 1. Make every reported task hot, loading it from the store if needed.
    /// 2. Apply the reported statuses, except running-type reports for tasks
    ///    already being cancelled (the agent has not seen the cancel yet).
    /// 3. Collect cancels: unknown or finished tasks, tasks being cancelled,
    ///    tasks of jobs being cancelled, and queued cancels for this node.
    /// 4. Hand out new ready tasks up to the node's free slots.
    pub async fn report(&self, request: ReportRequest) -> Result<ReportResponse> {
        let node = request.node.name.as_str();
        let cache = self.service.cache();
        let mut backend = AgentBackend::new(Arc::clone(&self.queue));

        let mut cancel: BTreeSet<TaskId> = BTreeSet::new();
        let mut reports = Vec::with_capacity(request.tasks.len());
        let reported: Vec<TaskId> = request.tasks.iter().map(|t| t.task_id).collect();

        for entry in &request.tasks {
            match self.service.ensure_hot(entry.task_id).await? {
                Residency::Hot | Residency::Loaded => {
                    let cancelling = cache
                        .task(entry.task_id)
                        .is_some_and(|t| t.status == TaskStatus::Cancelling);
                    if cancelling && !entry.status.is_final() {
                        cancel.insert(entry.task_id);
                        continue;
                    }

                    let mut report =
                        ReportedStatus::new(entry.task_id, entry.status).with_assignee(node);
                    if let Some(task_type) = entry.task_type {
                        report = report.with_task_type(task_type);
                    }
                    reports.push(report);
                }
                Residency::Settled(status) => {
                    debug!(node, task = %entry.task_id, ?status, "agent reported a task of a finished job");
                    if !entry.status.is_final() {
                        cancel.insert(entry.task_id);
                    }
                }
                Residency::Missing => {
                    warn!(node, task = %entry.task_id, "agent reported an unknown task");
                    if !entry.status.is_final() {
                        cancel.insert(entry.task_id);
                    }
                }
            }
        }

        let effects = self.service.receive(reports).await?;
        settle(&self.service, &mut backend, effects).await?;

        for task in cache.of_ids(&reported) {
            if task.status.is_final() {
                continue;
            }
            let job_cancelling = cache
                .job(task.job_id)
                .is_some_and(|j| matches!(j.status, JobStatus::ToCancel | JobStatus::Canceling));
            if task.status == TaskStatus::Cancelling || job_cancelling {
                cancel.insert(task.id);
            }
        }
        cancel.extend(self.queue.take_for(node, &reported, cache));

        let capacity = (request.node.free_slots as usize).min(self.batch_size);
        let (run, effects) = self.service.schedule(node, capacity).await?;
        settle(&self.service, &mut backend, effects).await?;

        debug!(node, cancel = cancel.len(), run = run.len(), "agent heartbeat answered");
        Ok(ReportResponse {
            cancel: cancel.into_iter().collect(),
            run,
        })
    }
}
