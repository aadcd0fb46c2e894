// tests/docker_poller.rs

mod common;

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lifecycle::adapters::docker::translate;
use lifecycle::adapters::{ContainerSource, ContainerState, ContainerSummary, DockerPoller, JsonFileSource};
use lifecycle::engine::IngestEvent;
use lifecycle::model::TaskId;
use lifecycle::status::TaskStatus;

use crate::common::fakes::StaticContainerSource;
use crate::common::{TestResult, init_tracing, with_timeout};

const LABEL: &str = "task-id";

fn container(task: Option<u64>, state: ContainerState, exit_code: Option<i64>) -> ContainerSummary {
    let mut labels = BTreeMap::new();
    if let Some(task) = task {
        labels.insert(LABEL.to_string(), task.to_string());
    }
    ContainerSummary {
        id: format!("c{}", task.unwrap_or(0)),
        labels,
        state,
        exit_code,
        started_at: None,
        finished_at: None,
    }
}

fn status_of(c: &ContainerSummary) -> Option<TaskStatus> {
    translate(c, LABEL).map(|r| r.status)
}

#[test]
fn container_states_map_to_task_statuses() {
    use lifecycle::adapters::ContainerState::*;

    assert_eq!(status_of(&container(Some(1), Created, None)), Some(TaskStatus::Preparing));
    assert_eq!(status_of(&container(Some(1), Running, None)), Some(TaskStatus::Running));
    assert_eq!(status_of(&container(Some(1), Paused, None)), Some(TaskStatus::Paused));
    assert_eq!(status_of(&container(Some(1), Exited, Some(0))), Some(TaskStatus::Success));
    assert_eq!(status_of(&container(Some(1), Exited, Some(2))), Some(TaskStatus::Fail));
    assert_eq!(status_of(&container(Some(1), Dead, None)), Some(TaskStatus::Fail));
    assert_eq!(status_of(&container(Some(1), Restarting, None)), None);
    assert_eq!(status_of(&container(Some(1), Removing, None)), None);
    assert_eq!(status_of(&container(None, Running, None)), None);
}

#[test]
fn exit_details_are_carried_over() {
    let failed = translate(&container(Some(4), ContainerState::Exited, Some(137)), LABEL).unwrap();
    assert_eq!(failed.id, TaskId(4));
    assert_eq!(failed.assignee.as_deref(), Some("c4"));
    assert_eq!(
        failed.failure_reason.as_deref(),
        Some("container exited with code 137")
    );
    assert!(failed.finished_at.is_some());

    let running = translate(&container(Some(4), ContainerState::Running, None), LABEL).unwrap();
    assert_eq!(running.finished_at, None);
}

#[tokio::test]
async fn poll_once_translates_known_containers() -> TestResult {
    let source = Arc::new(StaticContainerSource::new(vec![
        container(Some(1), ContainerState::Running, None),
        container(None, ContainerState::Running, None),
        container(Some(2), ContainerState::Removing, None),
        container(Some(3), ContainerState::Exited, Some(0)),
    ]));
    let (tx, _rx) = mpsc::channel(4);
    let poller = DockerPoller::new(source, LABEL, tx);

    let reports = poller.poll_once().await?;
    let ids: Vec<TaskId> = reports.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![TaskId(1), TaskId(3)]);
    Ok(())
}

#[tokio::test]
async fn poller_survives_failing_polls_and_stops_on_shutdown() -> TestResult {
    init_tracing();
    let source = Arc::new(StaticContainerSource::new(vec![container(
        Some(7),
        ContainerState::Running,
        None,
    )]));
    source.set_failing(true);

    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let poller = DockerPoller::new(source.clone(), LABEL, tx)
        .with_interval(Duration::from_millis(10));
    let handle = tokio::spawn(poller.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(rx.try_recv().is_err());

    source.set_failing(false);
    let event = with_timeout(rx.recv()).await;
    match event {
        Some(IngestEvent::Reports { reports }) => {
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].id, TaskId(7));
            assert_eq!(reports[0].status, TaskStatus::Running);
        }
        other => panic!("expected reports, got {other:?}"),
    }

    shutdown.cancel();
    with_timeout(handle).await?;
    Ok(())
}

#[tokio::test]
async fn poller_stops_when_runtime_is_gone() -> TestResult {
    let source = Arc::new(StaticContainerSource::new(vec![container(
        Some(8),
        ContainerState::Running,
        None,
    )]));
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let poller = DockerPoller::new(source, LABEL, tx).with_interval(Duration::from_millis(5));
    with_timeout(poller.run(CancellationToken::new())).await;
    Ok(())
}

#[tokio::test]
async fn json_file_source_reads_snapshot() -> TestResult {
    let mut file = NamedTempFile::new()?;
    write!(
        file,
        r#"[
  {{ "id": "abc", "labels": {{ "task-id": "12" }}, "state": "exited", "exit_code": 1 }},
  {{ "id": "def", "state": "running" }}
]"#
    )?;

    let source = JsonFileSource::new(file.path());
    let containers = source.list().await?;
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].state, ContainerState::Exited);
    assert_eq!(containers[0].exit_code, Some(1));
    assert_eq!(status_of(&containers[0]), Some(TaskStatus::Fail));

    let missing = JsonFileSource::new(file.path().with_extension("missing"));
    assert!(missing.list().await.is_err());
    Ok(())
}

#[tokio::test]
async fn zero_interval_is_raised_instead_of_panicking() -> TestResult {
    let source = Arc::new(StaticContainerSource::new(vec![container(
        Some(9),
        ContainerState::Running,
        None,
    )]));
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let poller = DockerPoller::new(source, LABEL, tx).with_interval(Duration::ZERO);
    with_timeout(poller.run(CancellationToken::new())).await;
    Ok(())
}
