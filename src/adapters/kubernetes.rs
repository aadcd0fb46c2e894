// src/adapters/kubernetes.rs

//! Kubernetes Job/Pod informer translation.
//!
//! Every task runs as one Kubernetes Job whose pods carry the task id in a
//! label (or, failing that, as the numeric suffix of the resource name).
//!
//! Job events report terminal outcomes from the True-valued conditions
//! (`Failed`, `Complete`). When several are true the strongest known one
//! wins, in the order `Failed`, `Complete`, `Suspended`; only if none is
//! known is the first used. `Suspended` and unknown conditions are logged
//! and report nothing.
//!
//! Pod events report progress: `Pending` maps to `Preparing`, `Running` to
//! `Running`, every other phase is ignored, as is any pod already marked for
//! deletion.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::adapters::{InformerAction, SchedulerEvent};
use crate::errors::{LifecycleError, Result};
use crate::model::{ReportedStatus, TaskId};
use crate::status::TaskStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// Condition entry shared by Job and Node status blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    /// `"True"`, `"False"` or `"Unknown"`.
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl KubeCondition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeJob {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<KubeJobStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeJobStatus {
    #[serde(default)]
    pub conditions: Vec<KubeCondition>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Number of failed pods, i.e. retries consumed.
    #[serde(default)]
    pub failed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubePod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<KubePodStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubePodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeNode {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<KubeNodeStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubeNodeStatus {
    #[serde(default)]
    pub conditions: Vec<KubeCondition>,
}

/// Fallback source for a pod's start time when the informer object lacks it.
#[async_trait]
pub trait PodStartTimeLookup: Send + Sync {
    async fn start_time(&self, pod: &ObjectMeta) -> Result<Option<DateTime<Utc>>>;
}

pub struct KubernetesAdapter {
    task_id_label: String,
    name_pattern: Regex,
    start_times: Option<Arc<dyn PodStartTimeLookup>>,
    /// Node name -> Ready condition.
    nodes: DashMap<String, bool>,
}

impl KubernetesAdapter {
    pub fn new(task_id_label: impl Into<String>) -> Result<Self> {
        let name_pattern = Regex::new(r"(?:^|-)(\d+)$")
            .map_err(|e| LifecycleError::ConfigError(format!("task name pattern: {e}")))?;
        Ok(Self {
            task_id_label: task_id_label.into(),
            name_pattern,
            start_times: None,
            nodes: DashMap::new(),
        })
    }

    pub fn with_start_time_lookup(mut self, lookup: Arc<dyn PodStartTimeLookup>) -> Self {
        self.start_times = Some(lookup);
        self
    }

    /// Translate one informer callback into zero or one reports.
    pub async fn handle(&self, event: SchedulerEvent) -> Vec<ReportedStatus> {
        match event {
            SchedulerEvent::Job { action, object } => match action {
                InformerAction::Delete => {
                    trace!(job = %object.metadata.name, "job deleted; nothing to report");
                    Vec::new()
                }
                InformerAction::Add | InformerAction::Update => {
                    self.job_report(&object).into_iter().collect()
                }
            },
            SchedulerEvent::Pod { action, object } => match action {
                InformerAction::Delete => {
                    trace!(pod = %object.metadata.name, "pod deleted; nothing to report");
                    Vec::new()
                }
                InformerAction::Add | InformerAction::Update => {
                    self.pod_report(&object).await.into_iter().collect()
                }
            },
            SchedulerEvent::Node { action, object } => {
                self.track_node(action, &object);
                Vec::new()
            }
        }
    }

    /// Task id from the configured label, else from the resource name.
    pub fn task_id_of(&self, meta: &ObjectMeta) -> Option<TaskId> {
        if let Some(value) = meta.labels.get(&self.task_id_label) {
            match value.parse::<TaskId>() {
                Ok(id) => return Some(id),
                Err(_) => {
                    warn!(name = %meta.name, label = %self.task_id_label, %value, "unparseable task id label");
                }
            }
        }

        let id = self
            .name_pattern
            .captures(&meta.name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map(TaskId::new);
        if id.is_none() {
            debug!(name = %meta.name, "resource carries no task id; ignoring");
        }
        id
    }

    pub fn job_report(&self, job: &KubeJob) -> Option<ReportedStatus> {
        let name = &job.metadata.name;
        let id = self.task_id_of(&job.metadata)?;
        let Some(status) = &job.status else {
            debug!(job = %name, "job has no status block yet");
            return None;
        };

        let active: Vec<&KubeCondition> =
            status.conditions.iter().filter(|c| c.is_true()).collect();
        let condition = match active.as_slice() {
            [] => {
                trace!(job = %name, "job has no true condition yet");
                return None;
            }
            [only] => *only,
            [first, ..] => {
                let kinds: Vec<&str> = active.iter().map(|c| c.kind.as_str()).collect();
                let chosen = active
                    .iter()
                    .copied()
                    .filter_map(|c| condition_rank(&c.kind).map(|rank| (rank, c)))
                    .min_by_key(|(rank, _)| *rank)
                    .map_or(*first, |(_, c)| c);
                warn!(
                    job = %name,
                    conditions = ?kinds,
                    using = %chosen.kind,
                    "several true job conditions"
                );
                chosen
            }
        };

        let task_status = match condition.kind.as_str() {
            "Failed" => TaskStatus::Fail,
            "Complete" => TaskStatus::Success,
            "Suspended" => {
                warn!(job = %name, "job is suspended; no status reported");
                return None;
            }
            other => {
                warn!(job = %name, condition = other, "unrecognised job condition; no status reported");
                return None;
            }
        };

        let finished_at = condition.last_transition_time.unwrap_or_else(|| {
            warn!(job = %name, "condition has no transition time; using now");
            Utc::now()
        });

        let mut report = ReportedStatus::new(id, task_status).with_finished_at(finished_at);
        if let Some(started) = status.start_time {
            report = report.with_started_at(started);
        }
        if let Some(failed) = status.failed {
            report = report.with_retry_count(failed);
        }
        if task_status == TaskStatus::Fail {
            if let Some(reason) = condition.message.clone().or_else(|| condition.reason.clone()) {
                report = report.with_failure_reason(reason);
            }
        }
        Some(report)
    }

    pub async fn pod_report(&self, pod: &KubePod) -> Option<ReportedStatus> {
        let name = &pod.metadata.name;
        if pod.metadata.deletion_timestamp.is_some() {
            trace!(pod = %name, "pod is terminating; ignoring");
            return None;
        }
        let id = self.task_id_of(&pod.metadata)?;
        let Some(status) = &pod.status else {
            debug!(pod = %name, "pod has no status block yet");
            return None;
        };

        match status.phase.as_deref() {
            Some("Pending") => {
                Some(ReportedStatus::new(id, TaskStatus::Preparing).with_assignee(name.clone()))
            }
            Some("Running") => {
                let started = match status.start_time {
                    Some(at) => at,
                    None => self.lookup_start_time(&pod.metadata).await,
                };
                Some(
                    ReportedStatus::new(id, TaskStatus::Running)
                        .with_started_at(started)
                        .with_assignee(name.clone()),
                )
            }
            other => {
                trace!(pod = %name, phase = ?other, "pod phase not reported");
                None
            }
        }
    }

    async fn lookup_start_time(&self, meta: &ObjectMeta) -> DateTime<Utc> {
        let Some(lookup) = &self.start_times else {
            warn!(pod = %meta.name, "pod has no start time; using now");
            return Utc::now();
        };
        match lookup.start_time(meta).await {
            Ok(Some(at)) => at,
            Ok(None) => {
                warn!(pod = %meta.name, "start time lookup found nothing; using now");
                Utc::now()
            }
            Err(err) => {
                warn!(pod = %meta.name, error = %err, "start time lookup failed; using now");
                Utc::now()
            }
        }
    }

    fn track_node(&self, action: InformerAction, node: &KubeNode) {
        let name = node.metadata.name.clone();
        match action {
            InformerAction::Delete => {
                self.nodes.remove(&name);
                debug!(node = %name, "node removed");
            }
            InformerAction::Add | InformerAction::Update => {
                let ready = node
                    .status
                    .as_ref()
                    .is_some_and(|s| s.conditions.iter().any(|c| c.kind == "Ready" && c.is_true()));
                debug!(node = %name, ready, "node readiness updated");
                self.nodes.insert(name, ready);
            }
        }
    }

    /// Last known readiness of a node, if it has been seen.
    pub fn node_ready(&self, name: &str) -> Option<bool> {
        self.nodes.get(name).map(|r| *r)
    }

    pub fn ready_nodes(&self) -> usize {
        self.nodes.iter().filter(|r| *r.value()).count()
    }
}

/// Precedence of the job conditions this adapter understands; lower wins.
fn condition_rank(kind: &str) -> Option<u8> {
    match kind {
        "Failed" => Some(0),
        "Complete" => Some(1),
        "Suspended" => Some(2),
        _ => None,
    }
}
