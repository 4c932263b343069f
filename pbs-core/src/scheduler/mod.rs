/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduling policies.
//!
//! [`SchedClass`] is the callback contract a processor's proxy executor and
//! the runtime drive.  A policy is chosen per processor when its run queue is
//! attached ([`PolicyKind`]), instead of being registered in some global
//! class table.
//!
//! | Callback | Invoked by | When |
//! |---|---|---|
//! | `on_task_ready` | runtime | host reports a task runnable |
//! | `on_task_blocked` / `on_task_exited` | runtime, executor | task stops being runnable |
//! | `pick_next` | executor | processor is free |
//! | `on_tick` | executor | every tick while a task runs |
//! | `on_yield` / `on_preempted` | executor | running task goes back to ready |
//! | `on_completion` | executor | running task finished its job |
//! | `on_plan_submitted` / `on_plan_cleared` | runtime | plan written for a bound task |
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use pbs_core::lateness::LatenessTable;
//! use pbs_core::plan::PlanStore;
//! use pbs_core::scheduler::{OverrunPolicy, PolicyKind};
//! use pbs_core::task::TaskId;
//!
//! let plans = Arc::new(PlanStore::new());
//! let lateness = Arc::new(LatenessTable::new());
//! let policy = PolicyKind::Edf.build(0, plans.clone(), lateness, OverrunPolicy::KeepDeadline);
//!
//! plans.submit_plan(TaskId(1), 0, 10, 2).unwrap();
//! policy.on_task_ready(TaskId(1), 0);
//! policy.on_task_ready(TaskId(2), 0);
//! assert_eq!(policy.pick_next(0), Some(TaskId(1)));
//! ```

pub mod edf;
pub mod error;
pub mod feasibility;

pub use edf::EdfPolicy;
pub use error::SchedError;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::lateness::{LatenessRecord, LatenessTable};
use crate::plan::{Plan, PlanError, PlanStore, PlanUpdate};
use crate::runqueue::{EnqueueOutcome, RunQueueEntry};
use crate::task::{CpuId, RunningTask, TaskId, TaskState};

// ── Tick outcome ──────────────────────────────────────────────────────────────

/// Verdict of [`SchedClass::on_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Let the task keep running.
    Continue,
    /// The slice has used more than its budget; preempt it.
    ///
    /// A policy signal, not a failure.
    BudgetExceeded { elapsed_us: u64, budget_us: u64 },
}

// ── Configuration enums ───────────────────────────────────────────────────────

/// Where a task goes after it is preempted for exceeding its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    /// Same deadline, fresh enqueue time (behind equal-deadline peers).
    #[default]
    KeepDeadline,
    /// Unplanned tier until the job completes or its plan changes.
    Demote,
}

impl fmt::Display for OverrunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrunPolicy::KeepDeadline => f.write_str("keep_deadline"),
            OverrunPolicy::Demote => f.write_str("demote"),
        }
    }
}

/// Policy implementation selected for a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Earliest deadline first over submitted plans.
    #[default]
    Edf,
}

impl PolicyKind {
    /// Instantiate the policy for `cpu`.
    pub fn build(
        self,
        cpu: CpuId,
        plans: Arc<PlanStore>,
        lateness: Arc<LatenessTable>,
        overrun: OverrunPolicy,
    ) -> Arc<dyn SchedClass> {
        match self {
            PolicyKind::Edf => Arc::new(EdfPolicy::new(cpu, plans, lateness, overrun)),
        }
    }
}

// ── SchedClass ────────────────────────────────────────────────────────────────

/// Callback contract between a processor's scheduling loop and a policy.
///
/// Implementations own their run queue and synchronize it internally; every
/// callback may be invoked from any thread.
pub trait SchedClass: Send + Sync {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// Processor this instance schedules.
    fn cpu(&self) -> CpuId;

    /// Admit a runnable task.
    fn on_task_ready(&self, task: TaskId, now_us: u64) -> EnqueueOutcome;

    /// The task stopped being runnable.
    fn on_task_blocked(&self, task: TaskId, now_us: u64);

    /// The task is gone: dequeue it, clear its plan and finalize its record.
    fn on_task_exited(&self, task: TaskId);

    /// Remove and return the next task to run, or `None` to idle.
    fn pick_next(&self, now_us: u64) -> Option<TaskId>;

    /// Periodic check of the running slice.
    fn on_tick(&self, running: &RunningTask, now_us: u64) -> TickOutcome;

    /// The running task yielded and stays runnable.
    fn on_yield(&self, task: TaskId, now_us: u64);

    /// The running task was preempted after [`TickOutcome::BudgetExceeded`].
    fn on_preempted(&self, task: TaskId, now_us: u64);

    /// The running task finished its job; returns the updated lateness record
    /// (`None` for tasks without a plan).
    fn on_completion(&self, task: TaskId, now_us: u64) -> Option<LatenessRecord>;

    /// Store a plan for `task` and refresh its ordering key in one critical
    /// section, so no `pick_next` sees the new plan with the old key.
    fn on_plan_submitted(
        &self,
        task: TaskId,
        arrival_us: u64,
        deadline_us: u64,
        budget_us: u64,
    ) -> Result<PlanUpdate, PlanError>;

    /// Remove the plan of `task`; a queued entry drops to the unplanned tier.
    fn on_plan_cleared(&self, task: TaskId) -> Option<Arc<Plan>>;

    /// The host could not switch to `task`.
    fn on_dispatch_failed(&self, task: TaskId);

    /// Queued tasks in pick order.
    fn ready_entries(&self) -> Vec<RunQueueEntry>;

    /// Scheduler-visible state of `task`, if the policy knows it.
    fn task_state(&self, task: TaskId) -> Option<TaskState>;
}
