// src/exec/mod.rs

//! Scheduler command execution.
//!
//! Reconciliation produces [`SchedulerCommand`]s (dispatch these tasks,
//! cancel those); a [`SchedulerBackend`] carries them to the scheduler that
//! actually runs the work.
//!
//! - [`backend`] defines the command type, the backend trait and
//!   `ChannelBackend`, which forwards commands to an external client task
//!   (the Kubernetes and Docker wiring point).
//! - [`agent`] holds `AgentBackend` and the per-node cancel queue that agent
//!   heartbeats drain.

pub mod agent;
pub mod backend;

pub use agent::{AgentBackend, AgentQueue};
pub use backend::{ChannelBackend, SchedulerBackend, SchedulerCommand};
