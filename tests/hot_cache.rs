// tests/hot_cache.rs

mod common;

use std::sync::Arc;

use lifecycle::cache::{CacheUpdate, HotCache};
use lifecycle::model::{JobId, ReportedStatus, TaskId, TaskType};
use lifecycle::status::TaskStatus;

use crate::common::TestResult;
use crate::common::builders::{JobBuilder, standard_job};

#[test]
fn adopt_job_indexes_every_task() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11, 12], &[21]));

    assert!(cache.contains_job(JobId(1)));
    assert_eq!(cache.task_count(), 3);
    assert_eq!(cache.job_task_ids(JobId(1)), vec![TaskId(11), TaskId(12), TaskId(21)]);
    assert_eq!(
        cache.ids_of_status(TaskStatus::Created),
        vec![TaskId(11), TaskId(12), TaskId(21)]
    );
    // The job header does not carry the task tree.
    assert!(cache.job(JobId(1)).unwrap().steps.is_empty());
    // Adoption is not a status change.
    assert_eq!(cache.pending_len(), 0);
}

#[test]
fn update_moves_between_buckets_and_queues_persistence() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11, 12], &[21]));

    match cache.update(TaskId(11), TaskStatus::Running) {
        CacheUpdate::Changed(change) => {
            assert_eq!(change.task_id, TaskId(11));
            assert_eq!(change.job_id, JobId(1));
            assert_eq!(change.old, TaskStatus::Created);
            assert_eq!(change.new, TaskStatus::Running);
        }
        other => panic!("expected a change, got {other:?}"),
    }

    assert_eq!(cache.ids_of_status(TaskStatus::Running), vec![TaskId(11)]);
    assert_eq!(
        cache.ids_of_status(TaskStatus::Created),
        vec![TaskId(12), TaskId(21)]
    );
    assert_eq!(cache.pending_len(), 1);
}

#[test]
fn repeated_status_is_unchanged_and_cold_task_is_reported() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11], &[21]));

    assert!(matches!(
        cache.update(TaskId(11), TaskStatus::Created),
        CacheUpdate::Unchanged
    ));
    assert!(matches!(
        cache.update(TaskId(999), TaskStatus::Running),
        CacheUpdate::Cold
    ));
    assert_eq!(cache.pending_len(), 0);
}

#[test]
fn report_metadata_is_merged() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11], &[21]));

    let report = ReportedStatus::new(TaskId(11), TaskStatus::Fail)
        .with_retry_count(3)
        .with_failure_reason("OOMKilled")
        .with_assignee("node-a");
    cache.apply(&report);

    let task = cache.task(TaskId(11)).unwrap();
    assert_eq!(task.status, TaskStatus::Fail);
    assert_eq!(task.retry_count, 3);
    assert_eq!(task.failure_reason.as_deref(), Some("OOMKilled"));
    assert_eq!(task.assignee.as_deref(), Some("node-a"));
    assert_eq!(task.task_type, TaskType::Pipeline);
}

#[test]
fn pending_collapses_to_latest_status() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11], &[21]));

    cache.update(TaskId(11), TaskStatus::Ready);
    cache.update(TaskId(11), TaskStatus::Running);
    cache.update(TaskId(11), TaskStatus::Success);

    let pending = cache.take_pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending.get(&TaskId(11)), Some(&TaskStatus::Success));
    assert_eq!(cache.pending_len(), 0);
}

#[test]
fn requeue_does_not_overwrite_newer_status() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11, 12], &[21]));

    cache.update(TaskId(11), TaskStatus::Running);
    let taken = cache.take_pending();

    cache.update(TaskId(11), TaskStatus::Success);
    cache.requeue(taken);
    cache.requeue([(TaskId(12), TaskStatus::Ready)]);

    let pending = cache.take_pending();
    assert_eq!(pending.get(&TaskId(11)), Some(&TaskStatus::Success));
    assert_eq!(pending.get(&TaskId(12)), Some(&TaskStatus::Ready));
}

#[test]
fn clear_tasks_of_evicts_but_keeps_pending() {
    let cache = HotCache::new();
    cache.adopt_job(&standard_job(1, &[11], &[21]));
    cache.adopt_job(&standard_job(2, &[31], &[41]));
    cache.update(TaskId(11), TaskStatus::Success);

    let evicted = cache.clear_tasks_of(JobId(1));

    assert_eq!(evicted.len(), 2);
    assert!(!cache.contains_job(JobId(1)));
    assert!(!cache.contains_task(TaskId(11)));
    assert!(cache.ids_of_status(TaskStatus::Success).is_empty());
    assert_eq!(cache.task_count(), 2);
    assert_eq!(cache.pending_len(), 1);
}

#[test]
fn of_status_filters_by_current_status() {
    let cache = HotCache::new();
    let job = JobBuilder::new(1)
        .step("train", TaskType::Pipeline, &[11, 12], TaskStatus::Ready)
        .collect("collect", &[21])
        .build();
    cache.adopt_job(&job);
    cache.update(TaskId(12), TaskStatus::Assigning);

    let ready: Vec<TaskId> = cache
        .of_status(TaskStatus::Ready)
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ready, vec![TaskId(11)]);
    assert_eq!(cache.of_ids(&[TaskId(21), TaskId(404)]).len(), 1);
}

#[tokio::test]
async fn concurrent_writers_keep_indexes_consistent() -> TestResult {
    let cache = Arc::new(HotCache::new());
    let ids: Vec<u64> = (1..=64).collect();
    cache.adopt_job(&JobBuilder::new(1).pipeline("train", &ids).build());

    let mut handles = Vec::new();
    for chunk in ids.chunks(16) {
        let cache = Arc::clone(&cache);
        let chunk = chunk.to_vec();
        handles.push(tokio::spawn(async move {
            for id in chunk {
                cache.update(TaskId(id), TaskStatus::Ready);
                cache.update(TaskId(id), TaskStatus::Running);
                if id % 2 == 0 {
                    cache.update(TaskId(id), TaskStatus::Success);
                }
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    assert_eq!(cache.ids_of_status(TaskStatus::Success).len(), 32);
    assert_eq!(cache.ids_of_status(TaskStatus::Running).len(), 32);
    assert!(cache.ids_of_status(TaskStatus::Ready).is_empty());
    assert!(cache.ids_of_status(TaskStatus::Created).is_empty());
    assert_eq!(cache.pending_len(), 64);
    Ok(())
}
