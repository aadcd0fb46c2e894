// src/watchers/job_status.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{Effects, JobReconciler};
use crate::errors::Result;
use crate::model::TaskStatusChange;
use crate::watchers::TaskWatcher;

/// Recomputes the owning job's status after every task change.
pub struct JobStatusWatcher {
    reconciler: Arc<JobReconciler>,
}

impl JobStatusWatcher {
    pub const NAME: &'static str = "job-status";

    pub fn new(reconciler: Arc<JobReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl TaskWatcher for JobStatusWatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> Option<i32> {
        Some(1)
    }

    async fn on_status_change(
        &self,
        change: &TaskStatusChange,
        effects: &mut Effects,
    ) -> Result<()> {
        self.reconciler.reconcile(change.job_id, effects).await?;
        Ok(())
    }
}
