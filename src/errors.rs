// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::model::{JobId, TaskId};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// A job graph that can never be valid, e.g. a job finishing without a
    /// collect task. Surfaced to the caller instead of being tolerated.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LifecycleError>;
