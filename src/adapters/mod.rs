// src/adapters/mod.rs

//! Scheduler-specific status ingestion.
//!
//! Each adapter turns scheduler-native state into [`ReportedStatus`] values
//! for `ReconciliationService::receive`:
//!
//! - [`kubernetes`]: Job/Pod/Node informer callbacks, carried as one tagged
//!   [`SchedulerEvent`] and dispatched with a single `match`.
//! - [`docker`]: periodic polling of container state.
//! - [`agent`]: request/response heartbeats from polling agents.
//!
//! [`ReportedStatus`]: crate::model::ReportedStatus

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod docker;
pub mod kubernetes;

pub use agent::{AgentController, AgentTaskReport, NodeInfo, ReportRequest, ReportResponse};
pub use docker::{ContainerSource, ContainerState, ContainerSummary, DockerPoller, JsonFileSource};
pub use kubernetes::{
    KubeCondition, KubeJob, KubeJobStatus, KubeNode, KubeNodeStatus, KubePod, KubePodStatus,
    KubernetesAdapter, ObjectMeta, PodStartTimeLookup,
};

/// Informer callback kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InformerAction {
    Add,
    Update,
    Delete,
}

/// A Kubernetes informer callback for any of the watched resource kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Job {
        action: InformerAction,
        object: KubeJob,
    },
    Pod {
        action: InformerAction,
        object: KubePod,
    },
    Node {
        action: InformerAction,
        object: KubeNode,
    },
}
