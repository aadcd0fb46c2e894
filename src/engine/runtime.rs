// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adapters::{AgentController, KubernetesAdapter, ReportResponse};
use crate::errors::Result;
use crate::exec::SchedulerBackend;

use super::{Effects, IngestEvent, ReconciliationService};

/// Drives the reconciliation service in response to [`IngestEvent`]s and
/// delegates scheduler commands to a [`SchedulerBackend`].
///
/// This is a pure IO shell: the status semantics live in the service, this
/// struct only reads the channel, routes events and executes effects.
pub struct Runtime<B: SchedulerBackend> {
    service: Arc<ReconciliationService>,
    kubernetes: Option<Arc<KubernetesAdapter>>,
    agents: Option<(Arc<AgentController>, mpsc::Sender<ReportResponse>)>,
    event_rx: mpsc::Receiver<IngestEvent>,
    backend: B,
}

impl<B: SchedulerBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("backend", &self.backend.name())
            .field("kubernetes", &self.kubernetes.is_some())
            .field("agents", &self.agents.is_some())
            .finish_non_exhaustive()
    }
}

impl<B: SchedulerBackend> Runtime<B> {
    pub fn new(
        service: Arc<ReconciliationService>,
        event_rx: mpsc::Receiver<IngestEvent>,
        backend: B,
    ) -> Self {
        Self {
            service,
            kubernetes: None,
            agents: None,
            event_rx,
            backend,
        }
    }

    /// Route raw Kubernetes informer events through `adapter`.
    pub fn with_kubernetes(mut self, adapter: Arc<KubernetesAdapter>) -> Self {
        self.kubernetes = Some(adapter);
        self
    }

    /// Answer agent heartbeats with `controller`; answers go to `replies`.
    pub fn with_agents(
        mut self,
        controller: Arc<AgentController>,
        replies: mpsc::Sender<ReportResponse>,
    ) -> Self {
        self.agents = Some((controller, replies));
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `IngestEvent`s from `event_rx`.
    /// - Feeds them into the reconciliation service.
    /// - Executes the resulting commands and cascades.
    ///
    /// A failing event (e.g. a corrupt job graph) is logged and the loop goes
    /// on; a failing backend stops the runtime.
    pub async fn run(mut self) -> Result<()> {
        info!(backend = self.backend.name(), "lifecycle runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            if matches!(event, IngestEvent::Shutdown) {
                info!("shutdown requested; stopping runtime");
                break;
            }

            debug!(?event, "runtime received event");

            match self.step(event).await {
                Ok(effects) => settle(&self.service, &mut self.backend, effects).await?,
                Err(err) => error!(error = %err, "failed to process event"),
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    async fn step(&self, event: IngestEvent) -> Result<Effects> {
        match event {
            IngestEvent::Reports { reports } => self.service.receive(reports).await,
            IngestEvent::Scheduler { event } => match &self.kubernetes {
                Some(adapter) => {
                    let reports = adapter.handle(event).await;
                    self.service.receive(reports).await
                }
                None => {
                    warn!("scheduler event received but no Kubernetes adapter is configured");
                    Ok(Effects::default())
                }
            },
            IngestEvent::Heartbeat { request } => match &self.agents {
                Some((controller, replies)) => {
                    let response = controller.report(request).await?;
                    if replies.send(response).await.is_err() {
                        warn!("heartbeat reply channel closed; dropping answer");
                    }
                    // The controller settles its own effects.
                    Ok(Effects::default())
                }
                None => {
                    warn!("agent heartbeat received but no agent controller is configured");
                    Ok(Effects::default())
                }
            },
            IngestEvent::Submit { job } => self.service.submit(job).await,
            IngestEvent::CancelJob { job_id } => self.service.cancel_job(job_id).await,
            IngestEvent::PauseJob { job_id } => self.service.pause_job(job_id).await,
            IngestEvent::ResumeJob { job_id } => self.service.resume_job(job_id).await,
            IngestEvent::Shutdown => Ok(Effects::default()),
        }
    }
}

/// Execute `effects` to completion: send every command to the backend, then
/// run the deferred cascades and repeat with whatever they produce.
///
/// Cascade failures are logged; backend failures are returned.
pub async fn settle<B>(
    service: &ReconciliationService,
    backend: &mut B,
    mut effects: Effects,
) -> Result<()>
where
    B: SchedulerBackend + ?Sized,
{
    loop {
        for rejection in effects.rejected.drain(..) {
            error!(
                task = %rejection.task_id,
                job = %rejection.job_id,
                reason = %rejection.reason,
                "status change rejected"
            );
        }
        for command in effects.commands.drain(..) {
            debug!(backend = backend.name(), ?command, "executing scheduler command");
            backend.execute(command).await?;
        }

        if effects.cascades.is_empty() {
            return Ok(());
        }

        let mut next = Effects::default();
        for cascade in std::mem::take(&mut effects.cascades) {
            match service.run_cascade(cascade).await {
                Ok(more) => next.extend(more),
                Err(err) => error!(?cascade, error = %err, "cascade failed"),
            }
        }
        effects = next;
    }
}
