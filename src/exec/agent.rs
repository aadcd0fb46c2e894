// src/exec/agent.rs

//! Backend for remote agents that poll the control plane.
//!
//! Agents cannot be pushed to; they pick up work in their heartbeat. Cancel
//! commands are parked in an [`AgentQueue`] until the agent running the task
//! reports in. Dispatch needs no bookkeeping: ready tasks stay `Ready` in the
//! hot cache and the heartbeat's scheduling step hands them out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashSet;
use tracing::debug;

use crate::cache::HotCache;
use crate::errors::Result;
use crate::exec::{SchedulerBackend, SchedulerCommand};
use crate::model::TaskId;

/// Task ids whose cancellation has not been delivered to an agent yet.
#[derive(Debug, Default)]
pub struct AgentQueue {
    cancels: DashSet<TaskId>,
}

impl AgentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_cancels(&self, ids: impl IntoIterator<Item = TaskId>) {
        for id in ids {
            self.cancels.insert(id);
        }
    }

    pub fn pending_cancels(&self) -> usize {
        self.cancels.len()
    }

    /// Remove and return the queued cancels that belong to `node`: tasks it
    /// just reported, or tasks the cache says are assigned to it.
    pub fn take_for(&self, node: &str, reported: &[TaskId], cache: &HotCache) -> Vec<TaskId> {
        let mine: Vec<TaskId> = self
            .cancels
            .iter()
            .map(|id| *id)
            .filter(|id| {
                reported.contains(id)
                    || cache
                        .task(*id)
                        .is_some_and(|t| t.assignee.as_deref() == Some(node))
            })
            .collect();

        let mut taken: Vec<TaskId> = mine
            .into_iter()
            .filter(|id| self.cancels.remove(id).is_some())
            .collect();
        taken.sort();

        self.forget_settled(cache);
        taken
    }

    /// Drop queued cancels for tasks that left the hot cache or already
    /// finished. Nobody will ever collect those, e.g. when the agent died
    /// and the job was settled without it. Keeps the queue no larger than
    /// the set of hot tasks.
    pub fn forget_settled(&self, cache: &HotCache) -> usize {
        let before = self.cancels.len();
        self.cancels
            .retain(|id| cache.task(*id).is_some_and(|t| !t.status.is_final()));
        let dropped = before.saturating_sub(self.cancels.len());
        if dropped > 0 {
            debug!(dropped, "forgot queued cancels for settled tasks");
        }
        dropped
    }
}

pub struct AgentBackend {
    queue: Arc<AgentQueue>,
}

impl AgentBackend {
    pub fn new(queue: Arc<AgentQueue>) -> Self {
        Self { queue }
    }
}

impl SchedulerBackend for AgentBackend {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn execute(
        &mut self,
        command: SchedulerCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let queue = Arc::clone(&self.queue);

        Box::pin(async move {
            match command {
                SchedulerCommand::Dispatch { tasks } => {
                    debug!(count = tasks.len(), "tasks left ready for agent pickup");
                }
                SchedulerCommand::Cancel { tasks } => {
                    debug!(count = tasks.len(), "queued cancels for agent heartbeat");
                    queue.push_cancels(tasks);
                }
            }
            Ok(())
        })
    }
}
