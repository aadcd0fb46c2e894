// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile, SchedulerKind};
use crate::errors::{LifecycleError, Result};

/// Kubernetes label key: optional DNS prefix, then a name segment.
const LABEL_KEY_PATTERN: &str =
    r"^([a-z0-9]([-a-z0-9.]*[a-z0-9])?/)?[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LifecycleError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_persistence(cfg)?;
    validate_scheduler(cfg)?;
    Ok(())
}

fn validate_persistence(cfg: &RawConfigFile) -> Result<()> {
    if cfg.persistence.drain_interval_ms == 0 {
        return Err(LifecycleError::ConfigError(
            "[persistence].drain_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.persistence.batch_size == 0 {
        return Err(LifecycleError::ConfigError(
            "[persistence].batch_size must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let scheduler = &cfg.scheduler;

    let label_key = Regex::new(LABEL_KEY_PATTERN)
        .map_err(|e| LifecycleError::ConfigError(format!("label key pattern: {e}")))?;
    if !label_key.is_match(&scheduler.task_id_label) {
        return Err(LifecycleError::ConfigError(format!(
            "[scheduler].task_id_label '{}' is not a valid label key",
            scheduler.task_id_label
        )));
    }

    if scheduler.poll_interval_ms == 0 {
        return Err(LifecycleError::ConfigError(
            "[scheduler].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if scheduler.agent_batch_size == 0 {
        return Err(LifecycleError::ConfigError(
            "[scheduler].agent_batch_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if scheduler.container_snapshot.is_some() && scheduler.backend != SchedulerKind::Docker {
        return Err(LifecycleError::ConfigError(format!(
            "[scheduler].container_snapshot requires backend = \"docker\" (got \"{}\")",
            scheduler.backend
        )));
    }
    Ok(())
}
