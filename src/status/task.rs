// src/status/task.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use super::StatusMachine;

/// Lifecycle of a single task.
///
/// The table is the union of the Kubernetes path (`Created -> Ready ->
/// Preparing -> Running`) and the agent path, which adds `Assigning` and
/// `Paused`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Created,
    Ready,
    Assigning,
    Paused,
    Preparing,
    Running,
    Success,
    Cancelling,
    Canceled,
    Fail,
    Unknown,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 11] = [
        TaskStatus::Created,
        TaskStatus::Ready,
        TaskStatus::Assigning,
        TaskStatus::Paused,
        TaskStatus::Preparing,
        TaskStatus::Running,
        TaskStatus::Success,
        TaskStatus::Cancelling,
        TaskStatus::Canceled,
        TaskStatus::Fail,
        TaskStatus::Unknown,
    ];

    pub fn is_final(self) -> bool {
        matches!(self, Self::Success | Self::Canceled | Self::Fail)
    }

    /// Task is on (or being handed to) a scheduler.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Assigning | Self::Preparing | Self::Running)
    }

    pub fn could_transfer(self, to: Self) -> bool {
        use TaskStatus::*;

        if self == to {
            return false;
        }
        match self {
            Success | Canceled | Fail => false,
            // A task we lost track of may resurface in any state.
            Unknown => true,
            Created => matches!(
                to,
                Ready | Paused | Preparing | Running | Cancelling | Canceled | Fail | Unknown
            ),
            Ready => matches!(
                to,
                Assigning | Paused | Preparing | Running | Cancelling | Canceled | Fail | Unknown
            ),
            Assigning => matches!(
                to,
                Ready | Paused | Preparing | Running | Cancelling | Canceled | Fail | Unknown
            ),
            Paused => matches!(to, Ready | Cancelling | Canceled | Fail | Unknown),
            Preparing => matches!(
                to,
                Running | Success | Cancelling | Canceled | Fail | Unknown
            ),
            Running => matches!(to, Success | Cancelling | Canceled | Fail | Unknown),
            Cancelling => matches!(to, Canceled | Fail | Unknown),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Ready => "READY",
            Self::Assigning => "ASSIGNING",
            Self::Paused => "PAUSED",
            Self::Preparing => "PREPARING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Cancelling => "CANCELLING",
            Self::Canceled => "CANCELED",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl StatusMachine for TaskStatus {
    const ALL: &'static [Self] = &TaskStatus::ALL;

    fn could_transfer(self, to: Self) -> bool {
        TaskStatus::could_transfer(self, to)
    }

    fn is_final(self) -> bool {
        TaskStatus::is_final(self)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
