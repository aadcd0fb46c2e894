use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lifecycle::adapters::{ContainerSource, ContainerSummary, ObjectMeta, PodStartTimeLookup};
use lifecycle::engine::Effects;
use lifecycle::errors::{LifecycleError, Result};
use lifecycle::exec::{SchedulerBackend, SchedulerCommand};
use lifecycle::model::TaskStatusChange;
use lifecycle::watchers::TaskWatcher;

/// A backend that records every command it is asked to execute.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    commands: Arc<Mutex<Vec<SchedulerCommand>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SchedulerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }
}

impl SchedulerBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn execute(
        &mut self,
        command: SchedulerCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let commands = Arc::clone(&self.commands);
        Box::pin(async move {
            commands.lock().unwrap().push(command);
            Ok(())
        })
    }
}

/// A backend whose every call fails.
pub struct FailingBackend;

impl SchedulerBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn execute(
        &mut self,
        _command: SchedulerCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Err(LifecycleError::Scheduler("scheduler offline".into())) })
    }
}

/// Watcher counting invocations and remembering every change it saw.
#[derive(Default)]
pub struct CountingWatcher {
    calls: AtomicUsize,
    seen: Mutex<Vec<TaskStatusChange>>,
}

impl CountingWatcher {
    pub const NAME: &'static str = "counting";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<TaskStatusChange> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskWatcher for CountingWatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> Option<i32> {
        Some(100)
    }

    async fn on_status_change(
        &self,
        change: &TaskStatusChange,
        _effects: &mut Effects,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(change.clone());
        Ok(())
    }
}

/// Container source returning a fixed list, swappable between polls.
#[derive(Default)]
pub struct StaticContainerSource {
    containers: Mutex<Vec<ContainerSummary>>,
    fail: Mutex<bool>,
}

impl StaticContainerSource {
    pub fn new(containers: Vec<ContainerSummary>) -> Self {
        Self {
            containers: Mutex::new(containers),
            fail: Mutex::new(false),
        }
    }

    pub fn set(&self, containers: Vec<ContainerSummary>) {
        *self.containers.lock().unwrap() = containers;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl ContainerSource for StaticContainerSource {
    async fn list(&self) -> Result<Vec<ContainerSummary>> {
        if *self.fail.lock().unwrap() {
            return Err(LifecycleError::Scheduler("docker daemon unreachable".into()));
        }
        Ok(self.containers.lock().unwrap().clone())
    }
}

/// Start-time lookup with a canned answer, counting calls.
pub struct FixedStartTime {
    answer: Option<DateTime<Utc>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedStartTime {
    pub fn returning(answer: Option<DateTime<Utc>>) -> Self {
        Self {
            answer,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PodStartTimeLookup for FixedStartTime {
    async fn start_time(&self, _meta: &ObjectMeta) -> Result<Option<DateTime<Utc>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LifecycleError::Scheduler("pod lookup failed".into()));
        }
        Ok(self.answer)
    }
}
