// src/status/mod.rs

//! Status model and derivation rules.
//!
//! - [`task`] and [`job`] hold the two state machines (transition tables and
//!   terminal sets).
//! - [`requirement`] evaluates quantified predicates over child statuses.
//! - [`calculator`] derives a job status from its tasks with an ordered rule
//!   list built on top of [`requirement`].
//!
//! Transition tables are advisory. Callers log unlisted transitions and apply
//! them anyway, since uncoordinated schedulers legitimately race.

use std::fmt::Debug;
use std::hash::Hash;

pub mod calculator;
pub mod job;
pub mod requirement;
pub mod task;

pub use calculator::{JobStatusCalculator, Rule};
pub use job::JobStatus;
pub use requirement::{Quantifier, RequirementSet, StatusRequirement, TaskSnapshot};
pub use task::TaskStatus;

/// Shared surface of the task and job state machines.
pub trait StatusMachine: Copy + Eq + Hash + Debug + 'static {
    /// Every status of the machine, in declaration order.
    const ALL: &'static [Self];

    /// Whether `self -> to` is listed in the transition table.
    fn could_transfer(self, to: Self) -> bool;

    /// Whether no further transition is expected from `self`.
    fn is_final(self) -> bool;

    /// Statuses reachable from `self` according to the table.
    fn successors(self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|to| self.could_transfer(*to))
            .collect()
    }
}
