// src/adapters/docker.rs

//! Container state poller for Docker-managed tasks.
//!
//! Docker has no push channel comparable to an informer, so the poller lists
//! containers on a fixed interval and forwards one report batch per tick.
//! Reports are not deduplicated here; the reconciliation service ignores
//! repeats of the cached status.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::engine::IngestEvent;
use crate::errors::Result;
use crate::model::{ReportedStatus, TaskId};
use crate::status::TaskStatus;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Restarting,
    Running,
    Removing,
    Paused,
    Exited,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub state: ContainerState,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ContainerSource: Send + Sync {
    async fn list(&self) -> Result<Vec<ContainerSummary>>;
}

/// Reads a JSON array of [`ContainerSummary`] from a file on every poll,
/// e.g. one refreshed by a sidecar that dumps the Docker API.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContainerSource for JsonFileSource {
    async fn list(&self) -> Result<Vec<ContainerSummary>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading container snapshot {}", self.path.display()))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Map one container to a report, or `None` for containers that are not
/// ours or are in a transient state.
pub fn translate(container: &ContainerSummary, task_id_label: &str) -> Option<ReportedStatus> {
    let Some(id) = container
        .labels
        .get(task_id_label)
        .and_then(|v| v.parse::<TaskId>().ok())
    else {
        trace!(container = %container.id, "container carries no task id");
        return None;
    };

    let report = match container.state {
        ContainerState::Created => ReportedStatus::new(id, TaskStatus::Preparing),
        ContainerState::Running => {
            let mut r = ReportedStatus::new(id, TaskStatus::Running);
            if let Some(at) = container.started_at {
                r = r.with_started_at(at);
            }
            r
        }
        ContainerState::Paused => ReportedStatus::new(id, TaskStatus::Paused),
        ContainerState::Exited => match container.exit_code {
            Some(0) => ReportedStatus::new(id, TaskStatus::Success),
            Some(code) => ReportedStatus::new(id, TaskStatus::Fail)
                .with_failure_reason(format!("container exited with code {code}")),
            None => ReportedStatus::new(id, TaskStatus::Fail)
                .with_failure_reason("container exited without an exit code"),
        },
        ContainerState::Dead => {
            ReportedStatus::new(id, TaskStatus::Fail).with_failure_reason("container is dead")
        }
        ContainerState::Restarting | ContainerState::Removing => {
            trace!(container = %container.id, state = ?container.state, "transient container state");
            return None;
        }
    };

    let mut report = report.with_assignee(container.id.clone());
    if report.status.is_final() {
        report = report.with_finished_at(container.finished_at.unwrap_or_else(Utc::now));
    }
    Some(report)
}

pub struct DockerPoller {
    source: Arc<dyn ContainerSource>,
    task_id_label: String,
    interval: Duration,
    tx: mpsc::Sender<IngestEvent>,
}

impl DockerPoller {
    pub fn new(
        source: Arc<dyn ContainerSource>,
        task_id_label: impl Into<String>,
        tx: mpsc::Sender<IngestEvent>,
    ) -> Self {
        Self {
            source,
            task_id_label: task_id_label.into(),
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            tx,
        }
    }

    /// Tick period. Anything below one millisecond is raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// List containers once and translate them.
    pub async fn poll_once(&self) -> Result<Vec<ReportedStatus>> {
        let containers = self.source.list().await?;
        Ok(containers
            .iter()
            .filter_map(|c| translate(c, &self.task_id_label))
            .collect())
    }

    /// Poll until `shutdown` fires or the runtime stops listening.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "docker poller starting");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("docker poller shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let reports = match self.poll_once().await {
                        Ok(reports) => reports,
                        Err(err) => {
                            warn!(error = %err, "container poll failed; retrying next tick");
                            continue;
                        }
                    };
                    if reports.is_empty() {
                        continue;
                    }
                    debug!(count = reports.len(), "forwarding container reports");
                    if self.tx.send(IngestEvent::Reports { reports }).await.is_err() {
                        info!("runtime channel closed; docker poller stopping");
                        break;
                    }
                }
            }
        }
    }
}
