// src/status/calculator.rs

//! Job status derivation.
//!
//! The calculator holds an ordered list of `(target, requirements)` rules and
//! returns the target of the first rule whose requirements all hold. The rules
//! overlap: `[Fail, Running]` satisfies both the `Fail` and the `Running`
//! rule, and a pipeline that finished with a pending collect task satisfies
//! `ToCollectResult` as well as `Running`. Declaration order is therefore the
//! priority and must not be reshuffled.

use tracing::trace;

use crate::model::TaskType;
use crate::status::{JobStatus, RequirementSet, StatusRequirement, TaskSnapshot};

use crate::status::TaskStatus::{
    Assigning, Canceled, Cancelling, Created, Fail, Paused, Preparing, Ready, Running, Success,
};

/// A single `(target, requirements)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub target: JobStatus,
    pub requirements: RequirementSet,
}

impl Rule {
    pub fn new(target: JobStatus, requirements: Vec<StatusRequirement>) -> Self {
        Self {
            target,
            requirements: RequirementSet::new(requirements),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStatusCalculator {
    rules: Vec<Rule>,
}

impl Default for JobStatusCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStatusCalculator {
    /// Calculator with the standard rule table.
    ///
    /// Priority, highest first:
    ///
    /// | # | target              | requirements                                                        |
    /// |---|---------------------|---------------------------------------------------------------------|
    /// | 1 | `Fail`              | any `Fail`                                                          |
    /// | 2 | `Canceling`         | any `Cancelling`                                                    |
    /// | 3 | `Canceled`          | any `Canceled`                                                      |
    /// | 4 | `Success`           | all `Success`, at least one                                         |
    /// | 5 | `CollectingResult`  | pipeline all `Success` (at least one), collect any active or ready |
    /// | 6 | `ToCollectResult`   | pipeline all `Success` (at least one), collect any `Created`        |
    /// | 7 | `Paused`            | any `Paused`, none active                                           |
    /// | 8 | `Running`           | any of `Ready`/active/`Success`                                     |
    /// | 9 | `Created`           | all `Created`, at least one                                         |
    ///
    /// Anything else (including an empty job) is `Unknown`.
    pub fn new() -> Self {
        let pipeline_done = || {
            vec![
                StatusRequirement::all(&[Success]).of_type(TaskType::Pipeline),
                StatusRequirement::any(&[Success]).of_type(TaskType::Pipeline),
            ]
        };

        let rules = vec![
            Rule::new(JobStatus::Fail, vec![StatusRequirement::any(&[Fail])]),
            Rule::new(JobStatus::Canceling, vec![StatusRequirement::any(&[Cancelling])]),
            Rule::new(JobStatus::Canceled, vec![StatusRequirement::any(&[Canceled])]),
            Rule::new(
                JobStatus::Success,
                vec![
                    StatusRequirement::all(&[Success]),
                    StatusRequirement::any(&[Success]),
                ],
            ),
            Rule::new(JobStatus::CollectingResult, {
                let mut reqs = pipeline_done();
                reqs.push(
                    StatusRequirement::any(&[Ready, Assigning, Preparing, Running])
                        .of_type(TaskType::Collect),
                );
                reqs
            }),
            Rule::new(JobStatus::ToCollectResult, {
                let mut reqs = pipeline_done();
                reqs.push(StatusRequirement::any(&[Created]).of_type(TaskType::Collect));
                reqs
            }),
            Rule::new(
                JobStatus::Paused,
                vec![
                    StatusRequirement::any(&[Paused]),
                    StatusRequirement::none_of(&[Assigning, Preparing, Running]),
                ],
            ),
            Rule::new(
                JobStatus::Running,
                vec![StatusRequirement::any(&[
                    Ready, Assigning, Preparing, Running, Success,
                ])],
            ),
            Rule::new(
                JobStatus::Created,
                vec![
                    StatusRequirement::all(&[Created]),
                    StatusRequirement::any(&[Created]),
                ],
            ),
        ];

        Self { rules }
    }

    /// Calculator with a custom rule list, evaluated in the given order.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching rule target, or `Unknown`.
    pub fn desired_status(&self, children: &[TaskSnapshot]) -> JobStatus {
        let desired = self
            .rules
            .iter()
            .find(|rule| rule.requirements.fit(children))
            .map(|rule| rule.target)
            .unwrap_or(JobStatus::Unknown);

        trace!(children = children.len(), ?desired, "computed desired job status");
        desired
    }
}
