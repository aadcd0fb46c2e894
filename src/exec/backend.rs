// src/exec/backend.rs

//! Pluggable scheduler backend abstraction.
//!
//! The runtime talks to a `SchedulerBackend` instead of a concrete client, so
//! Kubernetes, Docker and polling agents are interchangeable strategies and
//! tests can record commands instead of sending them anywhere.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::{LifecycleError, Result};
use crate::model::{TaskId, TaskTrigger};

/// Command produced by reconciliation for the scheduler side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SchedulerCommand {
    /// Start executing these tasks.
    Dispatch { tasks: Vec<TaskTrigger> },
    /// Stop these tasks. Completion is confirmed by a later status report.
    Cancel { tasks: Vec<TaskId> },
}

impl SchedulerCommand {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Dispatch { tasks } => tasks.is_empty(),
            Self::Cancel { tasks } => tasks.is_empty(),
        }
    }
}

pub trait SchedulerBackend: Send {
    fn name(&self) -> &'static str;

    fn execute(
        &mut self,
        command: SchedulerCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Backend that forwards every command over an mpsc channel to whatever
/// drives the real scheduler client.
pub struct ChannelBackend {
    name: &'static str,
    tx: mpsc::Sender<SchedulerCommand>,
}

impl ChannelBackend {
    pub fn new(name: &'static str, tx: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { name, tx }
    }
}

impl SchedulerBackend for ChannelBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(
        &mut self,
        command: SchedulerCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();
        let name = self.name;

        Box::pin(async move {
            tx.send(command).await.map_err(|_| {
                LifecycleError::Scheduler(format!("{name} command channel closed"))
            })
        })
    }
}

impl<T: SchedulerBackend + ?Sized> SchedulerBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn execute(
        &mut self,
        command: SchedulerCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).execute(command)
    }
}
