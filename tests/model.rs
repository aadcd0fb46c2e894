// tests/model.rs

use lifecycle::model::{Job, JobId, Task, TaskId, TaskType};
use lifecycle::status::{JobStatus, TaskStatus};

#[test]
fn ids_display_and_parse_both_forms() {
    assert_eq!(TaskId(7).to_string(), "task-7");
    assert_eq!(JobId(3).to_string(), "job-3");
    assert_eq!("7".parse::<TaskId>().unwrap(), TaskId(7));
    assert_eq!("task-7".parse::<TaskId>().unwrap(), TaskId(7));
    assert!("job-7".parse::<TaskId>().is_err());
    assert_eq!(serde_json::to_string(&TaskId(9)).unwrap(), "9");
}

#[test]
fn with_step_normalises_task_ownership() {
    let job = Job::new(JobId(1)).with_step(
        "train",
        vec![Task::new(TaskId(11), JobId(99), TaskType::Pipeline)],
    );

    let task = job.tasks().next().unwrap();
    assert_eq!(task.job_id, JobId(1));
    assert_eq!(task.step, "train");
    assert_eq!(task.trigger().step, "train");
    assert!(job.header().steps.is_empty());
}

#[test]
fn job_is_active_until_it_and_its_tasks_are_final() {
    let mut job = Job::new(JobId(1)).with_step(
        "train",
        vec![Task::new(TaskId(11), JobId(1), TaskType::Pipeline).with_status(TaskStatus::Running)],
    );
    assert!(job.is_active());

    job.status = JobStatus::Fail;
    assert!(job.is_active());

    for task in job.tasks_mut() {
        task.status = TaskStatus::Canceled;
    }
    assert!(!job.is_active());
}

#[test]
fn job_json_defaults() {
    let job: Job = serde_json::from_str(
        r#"{"id": 4, "steps": [{"name": "collect", "tasks": [{"id": 41, "job_id": 4, "task_type": "collect"}]}]}"#,
    )
    .unwrap();

    assert_eq!(job.status, JobStatus::Created);
    let task = job.tasks().next().unwrap();
    assert_eq!(task.task_type, TaskType::Collect);
    assert_eq!(task.status, TaskStatus::Created);
    assert_eq!(task.retry_count, 0);
}
