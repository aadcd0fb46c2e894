// tests/reconcile_service.rs

mod common;

use std::sync::Arc;

use lifecycle::cache::PersistenceDrain;
use lifecycle::engine::{Cascade, Effects, ReconcileOptions, Residency};
use lifecycle::errors::LifecycleError;
use lifecycle::exec::SchedulerCommand;
use lifecycle::model::{JobId, ReportedStatus, TaskId, TaskStatusChange, TaskType};
use lifecycle::status::{JobStatus, TaskStatus};
use lifecycle::store::Store;
use lifecycle::watchers::SuppressedWatchers;

use crate::common::builders::{JobBuilder, standard_job};
use crate::common::fakes::CountingWatcher;
use crate::common::{Harness, TestResult, init_tracing};

fn dispatched(command: &SchedulerCommand) -> Vec<TaskId> {
    match command {
        SchedulerCommand::Dispatch { tasks } => tasks.iter().map(|t| t.task_id).collect(),
        other => panic!("expected dispatch, got {other:?}"),
    }
}

fn cancelled(command: &SchedulerCommand) -> Vec<TaskId> {
    match command {
        SchedulerCommand::Cancel { tasks } => tasks.clone(),
        other => panic!("expected cancel, got {other:?}"),
    }
}

fn ids(raw: &[u64]) -> Vec<TaskId> {
    raw.iter().map(|id| TaskId(*id)).collect()
}

#[tokio::test]
async fn job_runs_through_collect_to_success() -> TestResult {
    init_tracing();
    let mut h = Harness::new();

    h.submit(standard_job(1, &[11, 12], &[21])).await;
    assert_eq!(h.job_status(1), Some(JobStatus::Running));
    assert_eq!(h.task_status(11), Some(TaskStatus::Ready));
    assert_eq!(h.task_status(21), Some(TaskStatus::Created));
    assert_eq!(dispatched(&h.commands()[0]), ids(&[11, 12]));

    h.report(11, TaskStatus::Running).await;
    h.report(12, TaskStatus::Running).await;
    h.report(11, TaskStatus::Success).await;
    assert_eq!(h.job_status(1), Some(JobStatus::Running));

    // Last pipeline task done: the collect task is made ready and dispatched.
    h.report(12, TaskStatus::Success).await;
    assert_eq!(h.job_status(1), Some(JobStatus::CollectingResult));
    assert_eq!(h.task_status(21), Some(TaskStatus::Ready));
    let commands = h.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(dispatched(&commands[1]), ids(&[21]));

    h.report(21, TaskStatus::Success).await;

    // Settled jobs leave the hot cache.
    assert_eq!(h.job_status(1), None);
    assert!(!h.cache.contains_task(TaskId(11)));

    let stored = h.store.find_job(JobId(1)).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Success);
    assert!(stored.finished_at.is_some());
    assert!(stored.duration_ms.is_some());

    assert_eq!(
        h.recorder.path_of(TaskId(21)),
        vec![TaskStatus::Created, TaskStatus::Ready, TaskStatus::Success]
    );
    assert_eq!(
        h.recorder.path_of(TaskId(11)),
        vec![TaskStatus::Ready, TaskStatus::Running, TaskStatus::Success]
    );
    Ok(())
}

#[tokio::test]
async fn failure_cancels_running_tasks_without_recomputing_the_job() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(standard_job(2, &[31, 32], &[41])).await;
    h.report(31, TaskStatus::Running).await;
    h.report(32, TaskStatus::Running).await;

    let effects = h
        .service
        .receive(vec![
            ReportedStatus::new(TaskId(31), TaskStatus::Fail).with_failure_reason("exit 137"),
        ])
        .await?;
    assert_eq!(
        effects.cascades,
        vec![Cascade::CancelRunning { job_id: JobId(2) }]
    );
    assert!(effects.commands.is_empty());
    h.settle(effects).await;

    assert_eq!(h.job_status(2), Some(JobStatus::Fail));
    assert_eq!(h.task_status(32), Some(TaskStatus::Cancelling));
    assert_eq!(cancelled(h.commands().last().unwrap()), ids(&[32]));

    // The cascade still reaches the watchers that are not suppressed.
    let seen: Vec<TaskStatusChange> = h.counter.seen();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3].task_id, TaskId(32));
    assert_eq!(seen[3].new, TaskStatus::Cancelling);
    assert_eq!(
        h.recorder.path_of(TaskId(32)),
        vec![TaskStatus::Ready, TaskStatus::Running, TaskStatus::Cancelling]
    );

    h.report(32, TaskStatus::Canceled).await;
    assert_eq!(h.job_status(2), Some(JobStatus::Fail));

    let stored = h.store.find_job(JobId(2)).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Fail);
    assert!(stored.finished_at.is_some());
    Ok(())
}

#[tokio::test]
async fn failure_cascade_can_be_switched_off() -> TestResult {
    let mut h = Harness::with_options(ReconcileOptions {
        cancel_running_on_fail: false,
        ..ReconcileOptions::default()
    });
    h.submit(standard_job(2, &[31, 32], &[41])).await;
    h.report(32, TaskStatus::Running).await;
    h.report(31, TaskStatus::Fail).await;

    assert_eq!(h.job_status(2), Some(JobStatus::Fail));
    assert_eq!(h.task_status(32), Some(TaskStatus::Running));
    assert_eq!(h.commands().len(), 1);
    Ok(())
}

#[tokio::test]
async fn success_without_collect_task_is_a_validation_error() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(JobBuilder::new(5).pipeline("train", &[51]).build())
        .await;

    let effects = h
        .service
        .receive(vec![ReportedStatus::new(TaskId(51), TaskStatus::Success)])
        .await?;
    assert_eq!(effects.rejected.len(), 1);
    let rejection = &effects.rejected[0];
    assert_eq!(rejection.task_id, TaskId(51));
    assert_eq!(rejection.job_id, JobId(5));
    assert!(rejection.reason.contains("Validation error"));
    assert!(rejection.reason.contains("job-5"));
    assert_eq!(h.job_status(5), Some(JobStatus::Running));

    let mut lenient = Harness::with_options(ReconcileOptions {
        require_collect_task: false,
        ..ReconcileOptions::default()
    });
    lenient
        .submit(JobBuilder::new(5).pipeline("train", &[51]).build())
        .await;
    lenient.report(51, TaskStatus::Success).await;
    assert_eq!(lenient.job_status(5), None);
    let stored = lenient.store.find_job(JobId(5)).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Success);
    Ok(())
}

#[tokio::test]
async fn submit_rejects_jobs_without_pipeline_and_ignores_resubmission() -> TestResult {
    let mut h = Harness::new();
    let collect_only = JobBuilder::new(6).collect("collect", &[61]).build();
    assert!(matches!(
        h.service.submit(collect_only).await,
        Err(LifecycleError::Validation(_))
    ));
    assert!(!h.cache.contains_job(JobId(6)));

    h.submit(standard_job(7, &[71], &[72])).await;
    let again = h.service.submit(standard_job(7, &[71], &[72])).await?;
    assert!(again.is_empty());
    assert_eq!(h.commands().len(), 1);
    Ok(())
}

#[tokio::test]
async fn cancel_job_cancels_started_and_unstarted_tasks() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(standard_job(3, &[51, 52], &[61])).await;
    h.report(51, TaskStatus::Running).await;

    let effects = h.service.cancel_job(JobId(3)).await?;
    h.settle(effects).await;

    assert_eq!(h.job_status(3), Some(JobStatus::Canceling));
    assert_eq!(h.task_status(51), Some(TaskStatus::Cancelling));
    assert_eq!(h.task_status(52), Some(TaskStatus::Canceled));
    assert_eq!(h.task_status(61), Some(TaskStatus::Canceled));
    assert_eq!(cancelled(h.commands().last().unwrap()), ids(&[51]));

    // The scheduler confirms.
    h.report(51, TaskStatus::Canceled).await;
    assert_eq!(h.job_status(3), None);
    let stored = h.store.find_job(JobId(3)).await?.unwrap();
    assert_eq!(stored.status, JobStatus::Canceled);

    assert!(matches!(
        h.service.cancel_job(JobId(404)).await,
        Err(LifecycleError::JobNotFound(JobId(404)))
    ));
    Ok(())
}

#[tokio::test]
async fn pause_and_resume_job() -> TestResult {
    let mut h = Harness::new();
    h.submit(standard_job(4, &[71, 72], &[81])).await;

    let effects = h.service.pause_job(JobId(4)).await?;
    h.settle(effects).await;
    assert_eq!(h.job_status(4), Some(JobStatus::Paused));
    assert_eq!(h.task_status(71), Some(TaskStatus::Paused));
    assert_eq!(h.task_status(81), Some(TaskStatus::Created));

    let effects = h.service.resume_job(JobId(4)).await?;
    h.settle(effects).await;
    assert_eq!(h.job_status(4), Some(JobStatus::Running));
    assert_eq!(h.task_status(72), Some(TaskStatus::Ready));
    assert_eq!(dispatched(h.commands().last().unwrap()), ids(&[71, 72]));
    Ok(())
}

#[tokio::test]
async fn schedule_assigns_ready_tasks_up_to_capacity() -> TestResult {
    let mut h = Harness::new();
    h.submit(standard_job(8, &[81, 82, 83], &[89])).await;

    let (none, effects) = h.service.schedule("node-a", 0).await?;
    assert!(none.is_empty());
    assert!(effects.is_empty());

    let (triggers, effects) = h.service.schedule("node-a", 2).await?;
    h.settle(effects).await;

    let scheduled: Vec<TaskId> = triggers.iter().map(|t| t.task_id).collect();
    assert_eq!(scheduled, ids(&[81, 82]));
    let task = h.cache.task(TaskId(81)).unwrap();
    assert_eq!(task.status, TaskStatus::Assigning);
    assert_eq!(task.assignee.as_deref(), Some("node-a"));
    assert_eq!(h.task_status(83), Some(TaskStatus::Ready));
    assert_eq!(triggers[0].task_type, TaskType::Pipeline);
    assert_eq!(triggers[0].step, "train");
    Ok(())
}

#[tokio::test]
async fn repeated_and_unlisted_reports() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(standard_job(9, &[91, 92], &[99])).await;

    h.report(91, TaskStatus::Running).await;
    let effects = h
        .service
        .receive(vec![ReportedStatus::new(TaskId(91), TaskStatus::Running)])
        .await?;
    assert!(effects.is_empty());
    assert_eq!(h.counter.calls(), 1);

    // READY -> SUCCESS is not listed but is applied.
    h.report(92, TaskStatus::Success).await;
    assert_eq!(h.task_status(92), Some(TaskStatus::Success));
    assert_eq!(h.counter.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn cold_reports_are_written_through_to_the_store() -> TestResult {
    init_tracing();
    let h = Harness::new();
    let job = standard_job(10, &[101], &[109]);
    h.store.save_job(&job).await?;

    let effects = h
        .service
        .receive(vec![ReportedStatus::new(TaskId(101), TaskStatus::Running)])
        .await?;

    assert!(effects.is_empty());
    assert_eq!(h.counter.calls(), 0);
    assert!(!h.cache.contains_task(TaskId(101)));
    let stored = h.store.find_task(TaskId(101)).await?.unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    Ok(())
}

#[tokio::test]
async fn warm_start_and_lazy_loading() -> TestResult {
    let h = Harness::new();
    let active = JobBuilder::new(11)
        .step("train", TaskType::Pipeline, &[111], TaskStatus::Running)
        .collect("collect", &[119])
        .status(JobStatus::Running)
        .build();
    let finished = JobBuilder::new(12)
        .step("train", TaskType::Pipeline, &[121], TaskStatus::Success)
        .step("collect", TaskType::Collect, &[129], TaskStatus::Success)
        .status(JobStatus::Success)
        .build();
    h.store.save_job(&active).await?;
    h.store.save_job(&finished).await?;

    // Lazily, before any warm start.
    assert_eq!(h.service.ensure_hot(TaskId(111)).await?, Residency::Loaded);
    assert_eq!(h.service.ensure_hot(TaskId(119)).await?, Residency::Hot);
    assert_eq!(
        h.service.ensure_hot(TaskId(121)).await?,
        Residency::Settled(TaskStatus::Success)
    );
    assert_eq!(h.service.ensure_hot(TaskId(999)).await?, Residency::Missing);

    // Already hot jobs are skipped; finished jobs are never loaded.
    assert_eq!(h.service.warm_start().await?, 0);
    assert_eq!(h.cache.job_count(), 1);

    let fresh = Harness::new();
    fresh.store.save_job(&active).await?;
    fresh.store.save_job(&finished).await?;
    assert_eq!(fresh.service.warm_start().await?, 1);
    assert_eq!(fresh.task_status(111), Some(TaskStatus::Running));
    assert_eq!(fresh.job_status(11), Some(JobStatus::Running));
    Ok(())
}

#[tokio::test]
async fn watcher_chain_order_and_suppression() -> TestResult {
    let h = Harness::new();
    h.cache.adopt_job(&standard_job(13, &[131], &[139]));

    assert_eq!(
        h.service.watchers().names(),
        vec!["job-status", "lifecycle-graph", CountingWatcher::NAME]
    );

    let change = TaskStatusChange {
        task_id: TaskId(131),
        job_id: JobId(13),
        old: TaskStatus::Created,
        new: TaskStatus::Ready,
        at: chrono::Utc::now(),
    };
    let mut effects = Effects::default();
    let suppressed = SuppressedWatchers::only("job-status").with(CountingWatcher::NAME);
    let invoked = h
        .service
        .watchers()
        .dispatch(&change, &suppressed, &mut effects)
        .await?;

    assert_eq!(invoked, 1);
    assert_eq!(h.counter.calls(), 0);
    assert_eq!(h.recorder.transition_count(), 1);
    Ok(())
}

#[tokio::test]
async fn report_details_are_written_through_to_store() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(standard_job(6, &[61, 62], &[63])).await;

    let report = ReportedStatus::new(TaskId(61), TaskStatus::Running).with_retry_count(2);
    h.receive(vec![report]).await;
    let report =
        ReportedStatus::new(TaskId(62), TaskStatus::Fail).with_failure_reason("OOMKilled");
    h.receive(vec![report]).await;

    let retried = h.store.find_task(TaskId(61)).await?.expect("task 61 stored");
    assert_eq!(retried.retry_count, 2);
    let failed = h.store.find_task(TaskId(62)).await?.expect("task 62 stored");
    assert_eq!(failed.failure_reason.as_deref(), Some("OOMKilled"));
    Ok(())
}

#[tokio::test]
async fn rejected_job_does_not_hold_back_the_rest_of_the_batch() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(JobBuilder::new(5).pipeline("train", &[51]).build())
        .await;
    h.submit(standard_job(6, &[61], &[62])).await;
    let graph_before = h.recorder.path_of(TaskId(51)).len();

    let effects = h
        .service
        .receive(vec![
            ReportedStatus::new(TaskId(51), TaskStatus::Success),
            ReportedStatus::new(TaskId(61), TaskStatus::Running),
        ])
        .await?;

    assert_eq!(effects.rejected.len(), 1);
    assert_eq!(effects.rejected[0].job_id, JobId(5));

    // The healthy job's report still went through.
    assert_eq!(h.task_status(61), Some(TaskStatus::Running));
    assert_eq!(h.job_status(6), Some(JobStatus::Running));

    // Watchers after the failing one still saw the rejected change.
    assert_eq!(h.recorder.path_of(TaskId(51)).len(), graph_before + 1);
    assert_eq!(h.recorder.path_of(TaskId(51)).last(), Some(&TaskStatus::Success));
    assert!(h.counter.seen().iter().any(|c| c.task_id == TaskId(51)));
    Ok(())
}

#[tokio::test]
async fn replayed_report_does_not_reopen_a_finished_task() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.submit(standard_job(7, &[71], &[72])).await;
    h.report(71, TaskStatus::Success).await;
    h.report(72, TaskStatus::Success).await;
    assert_eq!(h.job_status(7), None);

    let store: Arc<dyn Store> = h.store.clone();
    PersistenceDrain::new(h.cache.clone(), store).drain_once().await;
    assert_eq!(
        h.store.find_task(TaskId(71)).await?.map(|t| t.status),
        Some(TaskStatus::Success)
    );

    // An informer resync replays the pod as running.
    let effects = h
        .service
        .receive(vec![ReportedStatus::new(TaskId(71), TaskStatus::Running)])
        .await?;
    assert!(effects.is_empty());
    assert_eq!(
        h.store.find_task(TaskId(71)).await?.map(|t| t.status),
        Some(TaskStatus::Success)
    );
    assert!(h.store.list_active_jobs().await?.is_empty());

    assert_eq!(h.service.warm_start().await?, 0);
    assert!(!h.cache.contains_job(JobId(7)));
    Ok(())
}
