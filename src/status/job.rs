// src/status/job.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use super::StatusMachine;

/// Lifecycle of a job as derived from its tasks.
///
/// `ToCancel` is only ever set by an explicit cancel request; every other
/// status comes out of the calculator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Created,
    Paused,
    Running,
    ToCancel,
    Canceling,
    Canceled,
    ToCollectResult,
    CollectingResult,
    Success,
    Fail,
    Unknown,
}

impl JobStatus {
    pub const ALL: [JobStatus; 11] = [
        JobStatus::Created,
        JobStatus::Paused,
        JobStatus::Running,
        JobStatus::ToCancel,
        JobStatus::Canceling,
        JobStatus::Canceled,
        JobStatus::ToCollectResult,
        JobStatus::CollectingResult,
        JobStatus::Success,
        JobStatus::Fail,
        JobStatus::Unknown,
    ];

    pub fn is_final(self) -> bool {
        matches!(self, Self::Success | Self::Canceled | Self::Fail)
    }

    pub fn could_transfer(self, to: Self) -> bool {
        use JobStatus::*;

        if self == to {
            return false;
        }
        match self {
            Success | Canceled | Fail => false,
            Unknown => true,
            // Once a cancel is underway the job can only settle.
            ToCancel => matches!(to, Canceling | Canceled | Success | Fail | Unknown),
            Canceling => matches!(to, Canceled | Fail | Unknown),
            // Created is never re-entered once a task has moved.
            Created | Paused | Running | ToCollectResult | CollectingResult => to != Created,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Paused => "PAUSED",
            Self::Running => "RUNNING",
            Self::ToCancel => "TO_CANCEL",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
            Self::ToCollectResult => "TO_COLLECT_RESULT",
            Self::CollectingResult => "COLLECTING_RESULT",
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl StatusMachine for JobStatus {
    const ALL: &'static [Self] = &JobStatus::ALL;

    fn could_transfer(self, to: Self) -> bool {
        JobStatus::could_transfer(self, to)
    }

    fn is_final(self) -> bool {
        JobStatus::is_final(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
