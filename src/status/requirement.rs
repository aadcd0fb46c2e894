// src/status/requirement.rs

//! Quantified predicates over a collection of child task statuses.

use serde::{Deserialize, Serialize};

use crate::model::TaskType;
use crate::status::TaskStatus;

/// The part of a task the requirement engine looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_type: TaskType,
    pub status: TaskStatus,
}

impl TaskSnapshot {
    pub fn new(task_type: TaskType, status: TaskStatus) -> Self {
        Self { task_type, status }
    }

    pub fn pipeline(status: TaskStatus) -> Self {
        Self::new(TaskType::Pipeline, status)
    }

    pub fn collect(status: TaskStatus) -> Self {
        Self::new(TaskType::Collect, status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// Every considered child is in the set. Vacuously true when nothing is
    /// considered.
    All,
    /// At least one considered child is in the set ("must have").
    Any,
    /// No considered child is in the set ("have no").
    NoneOf,
}

/// One quantified predicate: a status set, a quantifier and an optional task
/// type filter restricting which children are considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequirement {
    statuses: Vec<TaskStatus>,
    quantifier: Quantifier,
    task_type: Option<TaskType>,
}

impl StatusRequirement {
    pub fn new(quantifier: Quantifier, statuses: &[TaskStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            quantifier,
            task_type: None,
        }
    }

    pub fn all(statuses: &[TaskStatus]) -> Self {
        Self::new(Quantifier::All, statuses)
    }

    pub fn any(statuses: &[TaskStatus]) -> Self {
        Self::new(Quantifier::Any, statuses)
    }

    pub fn none_of(statuses: &[TaskStatus]) -> Self {
        Self::new(Quantifier::NoneOf, statuses)
    }

    /// Only consider children of the given type.
    pub fn of_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn quantifier(&self) -> Quantifier {
        self.quantifier
    }

    pub fn statuses(&self) -> &[TaskStatus] {
        &self.statuses
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.task_type
    }

    pub fn fit(&self, children: &[TaskSnapshot]) -> bool {
        let mut considered = children
            .iter()
            .filter(|c| self.task_type.is_none_or(|t| c.task_type == t))
            .map(|c| c.status);

        match self.quantifier {
            Quantifier::All => considered.all(|s| self.statuses.contains(&s)),
            Quantifier::Any => considered.any(|s| self.statuses.contains(&s)),
            Quantifier::NoneOf => !considered.any(|s| self.statuses.contains(&s)),
        }
    }
}

/// Conjunction of requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSet {
    requirements: Vec<StatusRequirement>,
}

impl RequirementSet {
    pub fn new(requirements: Vec<StatusRequirement>) -> Self {
        Self { requirements }
    }

    pub fn requirements(&self) -> &[StatusRequirement] {
        &self.requirements
    }

    pub fn fit(&self, children: &[TaskSnapshot]) -> bool {
        self.requirements.iter().all(|r| r.fit(children))
    }
}

impl FromIterator<StatusRequirement> for RequirementSet {
    fn from_iter<I: IntoIterator<Item = StatusRequirement>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
