// src/model/mod.rs

//! Domain data carried through the engine: tasks, jobs and the transient
//! values exchanged with schedulers.

pub mod ids;
pub mod job;
pub mod report;
pub mod task;

pub use ids::{JobId, TaskId};
pub use job::{Job, Step};
pub use report::{ReportedStatus, TaskStatusChange};
pub use task::{Task, TaskTrigger, TaskType};
