pub mod builders;
pub mod fakes;

use std::sync::{Arc, Once};

use lifecycle::cache::HotCache;
use lifecycle::engine::{Effects, JobReconciler, ReconcileOptions, ReconciliationService, settle};
use lifecycle::exec::SchedulerCommand;
use lifecycle::model::{Job, JobId, ReportedStatus, TaskId};
use lifecycle::status::{JobStatus, TaskStatus};
use lifecycle::store::{InMemoryStore, Store};
use lifecycle::watchers::{
    GraphRecorder, JobStatusWatcher, LifecycleGraphWatcher, WatcherChain,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::fakes::{CountingWatcher, RecordingBackend};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A fully wired service over an in-memory store, with a counting watcher
/// appended to the standard chain and a backend that records commands.
pub struct Harness {
    pub cache: Arc<HotCache>,
    pub store: Arc<InMemoryStore>,
    pub recorder: Arc<GraphRecorder>,
    pub counter: Arc<CountingWatcher>,
    pub service: Arc<ReconciliationService>,
    pub backend: RecordingBackend,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(ReconcileOptions::default())
    }

    pub fn with_options(options: ReconcileOptions) -> Self {
        let cache = Arc::new(HotCache::new());
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(GraphRecorder::new());
        let counter = Arc::new(CountingWatcher::new());

        let store_dyn: Arc<dyn Store> = store.clone();
        let reconciler = Arc::new(JobReconciler::new(
            Arc::clone(&cache),
            Arc::clone(&store_dyn),
            options,
        ));
        let chain = WatcherChain::new()
            .register(Arc::new(JobStatusWatcher::new(Arc::clone(&reconciler))))
            .register(Arc::new(LifecycleGraphWatcher::new(recorder.clone())))
            .register(counter.clone());
        let service = Arc::new(ReconciliationService::new(
            Arc::clone(&cache),
            store_dyn,
            reconciler,
            chain,
        ));

        Self {
            cache,
            store,
            recorder,
            counter,
            service,
            backend: RecordingBackend::new(),
        }
    }

    /// Submit `job` and settle the resulting effects.
    pub async fn submit(&mut self, job: Job) {
        let effects = self.service.submit(job).await.expect("submit failed");
        self.settle(effects).await;
    }

    /// Feed `reports` through `receive` and settle the resulting effects.
    pub async fn receive(&mut self, reports: Vec<ReportedStatus>) {
        let effects = self.service.receive(reports).await.expect("receive failed");
        self.settle(effects).await;
    }

    /// Shorthand for one status report.
    pub async fn report(&mut self, task: u64, status: TaskStatus) {
        self.receive(vec![ReportedStatus::new(TaskId(task), status)])
            .await;
    }

    pub async fn settle(&mut self, effects: Effects) {
        settle(&self.service, &mut self.backend, effects)
            .await
            .expect("settle failed");
    }

    pub fn task_status(&self, task: u64) -> Option<TaskStatus> {
        self.cache.task(TaskId(task)).map(|t| t.status)
    }

    pub fn job_status(&self, job: u64) -> Option<JobStatus> {
        self.cache.job(JobId(job)).map(|j| j.status)
    }

    pub fn commands(&self) -> Vec<SchedulerCommand> {
        self.backend.commands()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
