// src/config/model.rs

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::ReconcileOptions;

/// Configuration as read from TOML, before validation.
///
/// ```toml
/// [persistence]
/// drain_interval_ms = 1000
/// batch_size = 500
///
/// [reconcile]
/// cancel_running_on_fail = true
/// require_collect_task = true
///
/// [scheduler]
/// backend = "kubernetes"
/// task_id_label = "lifecycle/task-id"
/// ```
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub persistence: PersistenceSection,

    #[serde(default)]
    pub reconcile: ReconcileSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub persistence: PersistenceSection,
    pub reconcile: ReconcileSection,
    pub scheduler: SchedulerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            persistence: raw.persistence,
            reconcile: raw.reconcile,
            scheduler: raw.scheduler,
        }
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.persistence.drain_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.poll_interval_ms)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            cancel_running_on_fail: self.reconcile.cancel_running_on_fail,
            require_collect_task: self.reconcile.require_collect_task,
        }
    }
}

/// `[persistence]`: how the hot cache is mirrored to the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceSection {
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// Maximum task ids per batch write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_drain_interval_ms() -> u64 {
    crate::cache::persist::DEFAULT_DRAIN_INTERVAL_MS
}

fn default_batch_size() -> usize {
    crate::cache::persist::DEFAULT_BATCH_SIZE
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

/// `[reconcile]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileSection {
    #[serde(default = "default_true")]
    pub cancel_running_on_fail: bool,

    #[serde(default = "default_true")]
    pub require_collect_task: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            cancel_running_on_fail: true,
            require_collect_task: true,
        }
    }
}

/// Which scheduler executes the tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Kubernetes,
    Docker,
    Agent,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Kubernetes => "kubernetes",
            Self::Docker => "docker",
            Self::Agent => "agent",
        };
        f.write_str(name)
    }
}

/// `[scheduler]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    #[serde(default)]
    pub backend: SchedulerKind,

    /// Label (Kubernetes) or container label (Docker) holding the task id.
    #[serde(default = "default_task_id_label")]
    pub task_id_label: String,

    /// Docker poll period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Docker only: JSON file listing container states, re-read every poll.
    #[serde(default)]
    pub container_snapshot: Option<PathBuf>,

    /// Agent only: maximum new tasks handed out per heartbeat.
    #[serde(default = "default_agent_batch_size")]
    pub agent_batch_size: usize,
}

fn default_task_id_label() -> String {
    "lifecycle/task-id".to_string()
}

fn default_poll_interval_ms() -> u64 {
    crate::adapters::docker::DEFAULT_POLL_INTERVAL_MS
}

fn default_agent_batch_size() -> usize {
    crate::adapters::agent::DEFAULT_AGENT_BATCH_SIZE
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            backend: SchedulerKind::default(),
            task_id_label: default_task_id_label(),
            poll_interval_ms: default_poll_interval_ms(),
            container_snapshot: None,
            agent_batch_size: default_agent_batch_size(),
        }
    }
}
