// src/lib.rs

pub mod adapters;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod model;
pub mod status;
pub mod store;
pub mod watchers;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{AgentController, DockerPoller, JsonFileSource, KubernetesAdapter};
use crate::cache::{HotCache, PersistenceDrain};
use crate::cli::CliArgs;
use crate::config::{
    ConfigFile, RawConfigFile, SchedulerKind, default_config_path, load_and_validate,
};
use crate::engine::{IngestEvent, ReconciliationService, Runtime};
use crate::exec::{AgentBackend, AgentQueue, ChannelBackend, SchedulerBackend, SchedulerCommand};
use crate::model::Job;
use crate::store::{InMemoryStore, Store};
use crate::watchers::GraphRecorder;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - store seeding and hot cache warm start
/// - the persistence drain
/// - the scheduler backend and its adapter
/// - event ingestion and Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &args.seed {
        let jobs = load_seed(path).await?;
        info!(count = jobs.len(), path = %path.display(), "seeding store");
        for job in &jobs {
            store.save_job(job).await?;
        }
    }
    let store: Arc<dyn Store> = store;

    let cache = Arc::new(HotCache::new());
    let recorder = Arc::new(GraphRecorder::new());
    let service = Arc::new(ReconciliationService::with_standard_watchers(
        Arc::clone(&cache),
        Arc::clone(&store),
        cfg.reconcile_options(),
        recorder,
    ));
    service.warm_start().await?;

    let shutdown = CancellationToken::new();
    let drain = PersistenceDrain::new(Arc::clone(&cache), Arc::clone(&store))
        .with_interval(cfg.drain_interval())
        .with_batch_size(cfg.persistence.batch_size);
    let drain_handle = tokio::spawn(drain.run(shutdown.clone()));

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<IngestEvent>(256);

    let runtime = match cfg.scheduler.backend {
        SchedulerKind::Kubernetes => {
            let adapter = Arc::new(KubernetesAdapter::new(cfg.scheduler.task_id_label.clone())?);
            let backend: Box<dyn SchedulerBackend> =
                Box::new(ChannelBackend::new("kubernetes", spawn_printer::<SchedulerCommand>()));
            Runtime::new(Arc::clone(&service), rt_rx, backend).with_kubernetes(adapter)
        }
        SchedulerKind::Docker => {
            if let Some(path) = &cfg.scheduler.container_snapshot {
                let poller = DockerPoller::new(
                    Arc::new(JsonFileSource::new(path.clone())),
                    cfg.scheduler.task_id_label.clone(),
                    rt_tx.clone(),
                )
                .with_interval(cfg.poll_interval());
                tokio::spawn(poller.run(shutdown.clone()));
            }
            let backend: Box<dyn SchedulerBackend> =
                Box::new(ChannelBackend::new("docker", spawn_printer::<SchedulerCommand>()));
            Runtime::new(Arc::clone(&service), rt_rx, backend)
        }
        SchedulerKind::Agent => {
            let queue = Arc::new(AgentQueue::new());
            let controller = Arc::new(
                AgentController::new(Arc::clone(&service), Arc::clone(&queue))
                    .with_batch_size(cfg.scheduler.agent_batch_size),
            );
            let backend: Box<dyn SchedulerBackend> = Box::new(AgentBackend::new(queue));
            Runtime::new(Arc::clone(&service), rt_rx, backend)
                .with_agents(controller, spawn_printer())
        }
    };

    if let Some(source) = args.events.clone() {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            let result = if source == "-" {
                read_events(tokio::io::stdin(), tx).await
            } else {
                match tokio::fs::File::open(&source).await {
                    Ok(file) => read_events(file, tx).await,
                    Err(err) => Err(anyhow::Error::new(err).context(format!("opening {source}"))),
                }
            };
            if let Err(err) = result {
                warn!(error = %err, "event input failed");
            }
        });
    }

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(IngestEvent::Shutdown).await;
        });
    }
    drop(rt_tx);

    let outcome = runtime.run().await;

    shutdown.cancel();
    if let Err(err) = drain_handle.await {
        warn!(error = %err, "persistence drain task panicked");
    }
    info!(
        jobs = cache.job_count(),
        tasks = cache.task_count(),
        pending = cache.pending_len(),
        "lifecycle stopped"
    );

    outcome.map_err(anyhow::Error::from)
}

/// Forward newline-delimited JSON [`IngestEvent`]s from `reader` into the
/// runtime, then ask it to shut down at end of input.
///
/// Blank lines and lines starting with `#` are skipped; malformed lines are
/// logged and skipped.
pub async fn read_events<R>(reader: R, tx: mpsc::Sender<IngestEvent>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<IngestEvent>(line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    debug!("runtime channel closed; stopping event input");
                    return Ok(());
                }
            }
            Err(err) => warn!(line = line_no, error = %err, "skipping malformed event"),
        }
    }

    debug!(lines = line_no, "event input exhausted");
    let _ = tx.send(IngestEvent::Shutdown).await;
    Ok(())
}

/// Read a JSON array of jobs.
pub async fn load_seed(path: &Path) -> Result<Vec<Job>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let jobs = serde_json::from_str(&contents)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    Ok(jobs)
}

fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    if let Some(path) = &args.config {
        return load_and_validate(path)
            .with_context(|| format!("loading config {}", path.display()));
    }

    let path = default_config_path();
    if path.exists() {
        load_and_validate(&path).with_context(|| format!("loading config {}", path.display()))
    } else {
        debug!(path = %path.display(), "no config file; using defaults");
        Ok(ConfigFile::try_from(RawConfigFile::default())?)
    }
}

/// Spawn a task writing every value it receives to stdout as one JSON line.
/// This is where a real scheduler client would pick the values up.
fn spawn_printer<T>() -> mpsc::Sender<T>
where
    T: Serialize + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<T>(64);
    tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            match serde_json::to_string(&value) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "failed to encode outbound message"),
            }
        }
    });
    tx
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("lifecycle dry-run");
    println!("  persistence.drain_interval_ms = {}", cfg.persistence.drain_interval_ms);
    println!("  persistence.batch_size = {}", cfg.persistence.batch_size);
    println!(
        "  reconcile.cancel_running_on_fail = {}",
        cfg.reconcile.cancel_running_on_fail
    );
    println!(
        "  reconcile.require_collect_task = {}",
        cfg.reconcile.require_collect_task
    );
    println!("  scheduler.backend = {}", cfg.scheduler.backend);
    println!("  scheduler.task_id_label = {}", cfg.scheduler.task_id_label);
    match cfg.scheduler.backend {
        SchedulerKind::Kubernetes => {}
        SchedulerKind::Docker => {
            println!("  scheduler.poll_interval_ms = {}", cfg.scheduler.poll_interval_ms);
            if let Some(path) = &cfg.scheduler.container_snapshot {
                println!("  scheduler.container_snapshot = {}", path.display());
            }
        }
        SchedulerKind::Agent => {
            println!("  scheduler.agent_batch_size = {}", cfg.scheduler.agent_batch_size);
        }
    }

    debug!("dry-run complete (no execution)");
}
