// src/watchers/mod.rs

//! Side effects triggered by task status changes.
//!
//! Every applied change produces a [`TaskStatusChange`]; the caller hands it
//! to [`WatcherChain::dispatch`], which runs the registered watchers in
//! priority order. A cascade that must not re-trigger some watchers passes
//! their names in a [`SuppressedWatchers`] set.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::engine::Effects;
use crate::errors::Result;
use crate::model::TaskStatusChange;

pub mod job_status;
pub mod lifecycle_graph;

pub use job_status::JobStatusWatcher;
pub use lifecycle_graph::{GraphRecorder, LifecycleGraphWatcher, LifecycleRecorder};

#[async_trait]
pub trait TaskWatcher: Send + Sync {
    /// Stable name, used for suppression.
    fn name(&self) -> &'static str;

    /// Lower runs first. Watchers without a priority run before all others.
    fn priority(&self) -> Option<i32> {
        None
    }

    async fn on_status_change(
        &self,
        change: &TaskStatusChange,
        effects: &mut Effects,
    ) -> Result<()>;
}

/// Names of watchers to skip for one cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuppressedWatchers(BTreeSet<&'static str>);

impl SuppressedWatchers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn only(name: &'static str) -> Self {
        Self::none().with(name)
    }

    pub fn with(mut self, name: &'static str) -> Self {
        self.0.insert(name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }
}

/// Ordered list of watchers, fixed at startup.
#[derive(Default)]
pub struct WatcherChain {
    watchers: Vec<Arc<dyn TaskWatcher>>,
}

impl std::fmt::Debug for WatcherChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherChain")
            .field("watchers", &self.names())
            .finish()
    }
}

impl WatcherChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watcher, keeping the chain sorted by priority. Equal priorities
    /// keep registration order.
    pub fn register(mut self, watcher: Arc<dyn TaskWatcher>) -> Self {
        self.watchers.push(watcher);
        self.watchers.sort_by_key(|w| w.priority());
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.watchers.iter().map(|w| w.name()).collect()
    }

    /// Run every non-suppressed watcher for `change`, in order.
    ///
    /// Returns how many watchers ran. A failing watcher does not stop the
    /// ones after it; the first error is returned once the chain is done.
    pub async fn dispatch(
        &self,
        change: &TaskStatusChange,
        suppressed: &SuppressedWatchers,
        effects: &mut Effects,
    ) -> Result<usize> {
        let mut invoked = 0;
        let mut first_error = None;
        for watcher in &self.watchers {
            if suppressed.contains(watcher.name()) {
                trace!(watcher = watcher.name(), task = %change.task_id, "watcher suppressed");
                continue;
            }
            invoked += 1;
            if let Err(err) = watcher.on_status_change(change, effects).await {
                warn!(watcher = watcher.name(), task = %change.task_id, error = %err, "watcher failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(invoked),
        }
    }
}
