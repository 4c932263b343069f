/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Plan store: the per-task timing intent submitted from user space.
//!
//! A [`Plan`] is an immutable value.  The store keeps one `Arc<Plan>` per
//! task and replaces it wholesale on resubmission, so a reader either sees the
//! old plan or the new one, never a mix of both:
//!
//! ```text
//! submit_plan ──► validate ──► Arc::new(plan) ──► swap map slot (write lock)
//! get_plan    ──────────────────────────────────► clone Arc      (read lock)
//! ```
//!
//! Keeping enqueued run-queue entries in sync with a replaced plan is the
//! runtime's job (see [`SchedulerRuntime::submit_plan`]).
//!
//! [`SchedulerRuntime::submit_plan`]: crate::runtime::SchedulerRuntime::submit_plan

pub mod error;

pub use error::PlanError;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::task::TaskId;

// ── Plan ──────────────────────────────────────────────────────────────────────

/// Submitted timing intent for one task.
///
/// `arrival_us` and `deadline_us` are absolute times on the scheduler clock;
/// `budget_us` is the CPU time a single dispatch may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub task: TaskId,
    pub arrival_us: u64,
    pub deadline_us: u64,
    pub budget_us: u64,
}

impl Plan {
    /// Build a validated plan.
    ///
    /// # Errors
    /// * [`PlanError::InvalidWindow`] if `deadline_us <= arrival_us` (checked
    ///   first).
    /// * [`PlanError::ZeroBudget`] if `budget_us == 0`.
    pub fn new(
        task: TaskId,
        arrival_us: u64,
        deadline_us: u64,
        budget_us: u64,
    ) -> Result<Self, PlanError> {
        if deadline_us <= arrival_us {
            return Err(PlanError::InvalidWindow {
                task,
                arrival_us,
                deadline_us,
            });
        }
        if budget_us == 0 {
            return Err(PlanError::ZeroBudget { task });
        }
        Ok(Self {
            task,
            arrival_us,
            deadline_us,
            budget_us,
        })
    }

    /// Length of the arrival → deadline window.
    pub fn window_us(&self) -> u64 {
        self.deadline_us - self.arrival_us
    }

    /// Fraction of the window the budget claims (`budget / window`).
    pub fn density(&self) -> f64 {
        self.budget_us as f64 / self.window_us() as f64
    }
}

// ── PlanUpdate ────────────────────────────────────────────────────────────────

/// What a successful [`PlanStore::submit_plan`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanUpdate {
    /// First plan for the task.
    Created,
    /// An existing, different plan was replaced.
    Replaced { previous: Arc<Plan> },
    /// The submission was identical to the stored plan.
    Unchanged,
}

impl PlanUpdate {
    /// `true` when ordering keys derived from the plan may have changed.
    pub fn changes_ordering(&self) -> bool {
        !matches!(self, PlanUpdate::Unchanged)
    }
}

// ── PlanStore ─────────────────────────────────────────────────────────────────

/// Shared, concurrently readable map of task → current plan.
#[derive(Debug, Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<TaskId, Arc<Plan>>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a plan for `task` (last write wins).
    ///
    /// # Errors
    /// See [`Plan::new`].  On error the store is left untouched.
    pub fn submit_plan(
        &self,
        task: TaskId,
        arrival_us: u64,
        deadline_us: u64,
        budget_us: u64,
    ) -> Result<PlanUpdate, PlanError> {
        let plan = Plan::new(task, arrival_us, deadline_us, budget_us)?;

        let mut plans = self.plans.write();
        let update = match plans.get(&task) {
            Some(current) if **current == plan => PlanUpdate::Unchanged,
            Some(current) => PlanUpdate::Replaced {
                previous: Arc::clone(current),
            },
            None => PlanUpdate::Created,
        };
        if update != PlanUpdate::Unchanged {
            plans.insert(task, Arc::new(plan));
        }
        drop(plans);

        debug!(
            task = %task,
            arrival_us,
            deadline_us,
            budget_us,
            update = ?update,
            "plan stored"
        );
        Ok(update)
    }

    /// Snapshot of the current plan for `task`.
    pub fn get_plan(&self, task: TaskId) -> Option<Arc<Plan>> {
        self.plans.read().get(&task).cloned()
    }

    /// Current deadline for `task`, if it has a plan.
    pub fn deadline_of(&self, task: TaskId) -> Option<u64> {
        self.plans.read().get(&task).map(|p| p.deadline_us)
    }

    /// Remove the plan for `task`, returning it if one existed.
    pub fn clear_plan(&self, task: TaskId) -> Option<Arc<Plan>> {
        let removed = self.plans.write().remove(&task);
        if removed.is_some() {
            debug!(task = %task, "plan cleared");
        }
        removed
    }

    /// Snapshots of the plans of every task in `tasks` that has one.
    pub fn plans_for<I>(&self, tasks: I) -> Vec<Arc<Plan>>
    where
        I: IntoIterator<Item = TaskId>,
    {
        let plans = self.plans.read();
        tasks
            .into_iter()
            .filter_map(|t| plans.get(&t).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Plan::new ─────────────────────────────────────────────────────────────

    #[test]
    fn deadline_before_arrival_is_invalid_window() {
        // arrival=5, deadline=3, budget=1
        let err = Plan::new(TaskId(7), 5, 3, 1).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidWindow {
                task: TaskId(7),
                arrival_us: 5,
                deadline_us: 3
            }
        );
    }

    #[test]
    fn deadline_equal_to_arrival_is_invalid_window() {
        assert!(matches!(
            Plan::new(TaskId(1), 10, 10, 1),
            Err(PlanError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn window_is_checked_before_budget() {
        assert!(matches!(
            Plan::new(TaskId(1), 10, 5, 0),
            Err(PlanError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert_eq!(
            Plan::new(TaskId(3), 0, 10, 0).unwrap_err(),
            PlanError::ZeroBudget { task: TaskId(3) }
        );
    }

    #[test]
    fn density_is_budget_over_window() {
        let p = Plan::new(TaskId(1), 100, 1_100, 250).unwrap();
        assert_eq!(p.window_us(), 1_000);
        assert!((p.density() - 0.25).abs() < 1e-9);
    }

    // ── PlanStore ─────────────────────────────────────────────────────────────

    #[test]
    fn rejected_submission_leaves_store_untouched() {
        let store = PlanStore::new();
        store.submit_plan(TaskId(1), 0, 10, 2).unwrap();

        assert!(store.submit_plan(TaskId(1), 5, 3, 1).is_err());
        assert!(store.submit_plan(TaskId(2), 0, 10, 0).is_err());

        assert_eq!(store.get_plan(TaskId(1)).unwrap().deadline_us, 10);
        assert!(store.get_plan(TaskId(2)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn resubmission_replaces_plan() {
        let store = PlanStore::new();
        assert_eq!(
            store.submit_plan(TaskId(1), 0, 10, 2).unwrap(),
            PlanUpdate::Created
        );

        let update = store.submit_plan(TaskId(1), 0, 20, 3).unwrap();
        match update {
            PlanUpdate::Replaced { previous } => assert_eq!(previous.deadline_us, 10),
            other => panic!("expected Replaced, got {other:?}"),
        }
        assert_eq!(store.deadline_of(TaskId(1)), Some(20));
    }

    #[test]
    fn identical_resubmission_is_unchanged() {
        let store = PlanStore::new();
        store.submit_plan(TaskId(1), 0, 10, 2).unwrap();
        let update = store.submit_plan(TaskId(1), 0, 10, 2).unwrap();
        assert_eq!(update, PlanUpdate::Unchanged);
        assert!(!update.changes_ordering());
    }

    #[test]
    fn snapshot_survives_replacement() {
        let store = PlanStore::new();
        store.submit_plan(TaskId(1), 0, 10, 2).unwrap();
        let before = store.get_plan(TaskId(1)).unwrap();

        store.submit_plan(TaskId(1), 1, 30, 4).unwrap();

        // The old snapshot is still whole; no field was mutated in place.
        assert_eq!(*before, Plan::new(TaskId(1), 0, 10, 2).unwrap());
        assert_eq!(
            *store.get_plan(TaskId(1)).unwrap(),
            Plan::new(TaskId(1), 1, 30, 4).unwrap()
        );
    }

    #[test]
    fn clear_plan_removes_and_returns() {
        let store = PlanStore::new();
        store.submit_plan(TaskId(1), 0, 10, 2).unwrap();
        assert!(store.clear_plan(TaskId(1)).is_some());
        assert!(store.clear_plan(TaskId(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn plans_for_skips_unplanned_tasks() {
        let store = PlanStore::new();
        store.submit_plan(TaskId(1), 0, 10, 2).unwrap();
        store.submit_plan(TaskId(3), 0, 30, 2).unwrap();

        let plans = store.plans_for([TaskId(1), TaskId(2), TaskId(3)]);
        let ids: Vec<TaskId> = plans.iter().map(|p| p.task).collect();
        assert_eq!(ids, vec![TaskId(1), TaskId(3)]);
    }
}
