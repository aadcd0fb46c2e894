// src/watchers/lifecycle_graph.rs

//! Append-only record of every task status transition.
//!
//! Each task gets a chain of nodes, one per status it has been in, linked by
//! an edge per transition. Rendering is left to consumers of the recorder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::trace;

use crate::engine::Effects;
use crate::errors::Result;
use crate::model::{JobId, TaskId, TaskStatusChange};
use crate::status::TaskStatus;
use crate::watchers::TaskWatcher;

/// Sink for status-change events.
pub trait LifecycleRecorder: Send + Sync {
    fn record(&self, change: &TaskStatusChange) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleNode {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub status: TaskStatus,
    /// When the task entered `status`. `None` for the origin node of a chain,
    /// whose entry time is not known to the recorder.
    pub entered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    graph: DiGraph<LifecycleNode, ()>,
    tails: HashMap<TaskId, NodeIndex>,
}

/// [`LifecycleRecorder`] keeping the transitions in a `petgraph` graph.
#[derive(Debug, Default)]
pub struct GraphRecorder {
    inner: Mutex<Inner>,
}

impl GraphRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn node_count(&self) -> usize {
        self.lock().graph.node_count()
    }

    pub fn transition_count(&self) -> usize {
        self.lock().graph.edge_count()
    }

    /// Statuses a task has gone through, oldest first.
    pub fn path_of(&self, task_id: TaskId) -> Vec<TaskStatus> {
        let inner = self.lock();
        let Some(mut node) = inner.tails.get(&task_id).copied() else {
            return Vec::new();
        };

        let mut path = vec![inner.graph[node].status];
        while let Some(prev) = inner
            .graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .next()
        {
            path.push(inner.graph[prev].status);
            node = prev;
        }
        path.reverse();
        path
    }
}

impl LifecycleRecorder for GraphRecorder {
    fn record(&self, change: &TaskStatusChange) -> Result<()> {
        let mut inner = self.lock();
        let Inner { graph, tails } = &mut *inner;

        let from = match tails.get(&change.task_id) {
            Some(idx) => *idx,
            None => graph.add_node(LifecycleNode {
                task_id: change.task_id,
                job_id: change.job_id,
                status: change.old,
                entered_at: None,
            }),
        };
        let to = graph.add_node(LifecycleNode {
            task_id: change.task_id,
            job_id: change.job_id,
            status: change.new,
            entered_at: Some(change.at),
        });
        graph.add_edge(from, to, ());
        tails.insert(change.task_id, to);

        trace!(task = %change.task_id, old = ?change.old, new = ?change.new, "recorded lifecycle transition");
        Ok(())
    }
}

/// Feeds every status change to a [`LifecycleRecorder`].
pub struct LifecycleGraphWatcher {
    recorder: Arc<dyn LifecycleRecorder>,
}

impl LifecycleGraphWatcher {
    pub const NAME: &'static str = "lifecycle-graph";

    pub fn new(recorder: Arc<dyn LifecycleRecorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl TaskWatcher for LifecycleGraphWatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> Option<i32> {
        Some(2)
    }

    async fn on_status_change(
        &self,
        change: &TaskStatusChange,
        _effects: &mut Effects,
    ) -> Result<()> {
        self.recorder.record(change)
    }
}
