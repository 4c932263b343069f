/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Earliest-deadline-first policy over submitted plans.
//!
//! # Ordering
//! A ready task is keyed by the deadline of its current plan; tasks without a
//! plan go after every planned task.  Ties are FIFO (see
//! [`crate::runqueue`]).
//!
//! # Budget
//! Each dispatch may run for the plan's `budget_us`.  The first tick that
//! sees `now − start > budget` returns [`TickOutcome::BudgetExceeded`]; the
//! executor preempts and calls [`SchedClass::on_preempted`], which re-queues
//! the task according to the configured [`OverrunPolicy`].
//!
//! # Known limitation: starvation
//! EDF gives no bound on how long an unplanned (or late-deadline) task waits
//! while earlier-deadline work keeps arriving.  No aging is applied.
//!
//! # Locking
//! One `parking_lot::Mutex` guards the run queue and per-task bookkeeping.
//! While it is held the policy may take the plan-store lock or the lateness
//! write lock, never the other way round.  Plans for tasks on this processor
//! are written through [`SchedClass::on_plan_submitted`] and
//! [`SchedClass::on_plan_cleared`], which store and rekey under the same
//! critical section.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::{OverrunPolicy, SchedClass, SchedError, TickOutcome};
use crate::lateness::{LatenessRecord, LatenessTable};
use crate::plan::{Plan, PlanError, PlanStore, PlanUpdate};
use crate::runqueue::{EnqueueOutcome, RunQueue, RunQueueEntry};
use crate::task::{CpuId, RunningTask, TaskId, TaskState};

// ── Internal state ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TaskSlot {
    state: TaskState,
    /// A wake-up arrived while the task was running.
    wake_pending: bool,
    /// Queued in the unplanned tier after a budget overrun.
    demoted: bool,
    overruns: u64,
}

#[derive(Debug, Default)]
struct EdfState {
    queue: RunQueue,
    tasks: HashMap<TaskId, TaskSlot>,
}

// ── EdfPolicy ─────────────────────────────────────────────────────────────────

pub struct EdfPolicy {
    cpu: CpuId,
    plans: Arc<PlanStore>,
    lateness: Arc<LatenessTable>,
    overrun: OverrunPolicy,
    state: Mutex<EdfState>,
}

impl EdfPolicy {
    pub fn new(
        cpu: CpuId,
        plans: Arc<PlanStore>,
        lateness: Arc<LatenessTable>,
        overrun: OverrunPolicy,
    ) -> Self {
        Self {
            cpu,
            plans,
            lateness,
            overrun,
            state: Mutex::new(EdfState::default()),
        }
    }

    /// Number of budget overruns recorded for `task` since it was admitted.
    pub fn overruns(&self, task: TaskId) -> u64 {
        self.state
            .lock()
            .tasks
            .get(&task)
            .map(|s| s.overruns)
            .unwrap_or(0)
    }

    /// Deadline `task` should currently be ordered by.
    fn ordering_deadline(&self, task: TaskId, demoted: bool) -> Option<u64> {
        if demoted {
            None
        } else {
            self.plans.deadline_of(task)
        }
    }

    /// Put a task that just left the processor back on the queue.
    fn requeue(&self, st: &mut EdfState, task: TaskId, now_us: u64) {
        let slot = st.tasks.entry(task).or_default();
        slot.state = TaskState::Ready;
        slot.wake_pending = false;
        let deadline = self.ordering_deadline(task, slot.demoted);
        st.queue.enqueue(task, deadline, now_us);
    }

    /// Refresh the key of a queued `task` after its plan changed.
    fn rekey(&self, st: &mut EdfState, task: TaskId) {
        if let Some(slot) = st.tasks.get_mut(&task) {
            slot.demoted = false;
        }
        let deadline = self.plans.deadline_of(task);
        if st.queue.rekey(task, deadline) {
            debug!(cpu = self.cpu, task = %task, deadline_us = ?deadline, "queued task rekeyed");
        }
    }
}

impl SchedClass for EdfPolicy {
    fn name(&self) -> &'static str {
        "edf"
    }

    fn cpu(&self) -> CpuId {
        self.cpu
    }

    fn on_task_ready(&self, task: TaskId, now_us: u64) -> EnqueueOutcome {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let slot = st.tasks.entry(task).or_default();

        if slot.state == TaskState::Running {
            slot.wake_pending = true;
            trace!(cpu = self.cpu, task = %task, "wake-up while running, deferred");
            return EnqueueOutcome::Deferred;
        }

        let deadline = self.ordering_deadline(task, slot.demoted);
        let outcome = st.queue.enqueue(task, deadline, now_us);
        slot.state = TaskState::Ready;

        debug!(
            cpu = self.cpu,
            task = %task,
            deadline_us = ?deadline,
            outcome = ?outcome,
            queued = st.queue.len(),
            "task ready"
        );
        outcome
    }

    fn on_task_blocked(&self, task: TaskId, now_us: u64) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.queue.dequeue(task);

        let Some(slot) = st.tasks.get_mut(&task) else {
            trace!(cpu = self.cpu, task = %task, "block for unknown task ignored");
            return;
        };

        if slot.state == TaskState::Running && slot.wake_pending {
            debug!(cpu = self.cpu, task = %task, "blocked with pending wake-up, requeued");
            self.requeue(st, task, now_us);
        } else {
            slot.state = TaskState::Blocked;
            debug!(cpu = self.cpu, task = %task, "task blocked");
        }
    }

    fn on_task_exited(&self, task: TaskId) {
        {
            let mut st = self.state.lock();
            st.queue.dequeue(task);
            st.tasks.remove(&task);
        }
        self.plans.clear_plan(task);
        self.lateness.finalize(task);
        info!(cpu = self.cpu, task = %task, "task exited");
    }

    fn pick_next(&self, _now_us: u64) -> Option<TaskId> {
        let mut guard = self.state.lock();
        let st = &mut *guard;

        // Each pass either returns or repairs one stale entry.
        let mut repairs = 0usize;
        loop {
            let head = st.queue.peek_entry()?;
            let demoted = st.tasks.get(&head.task).is_some_and(|s| s.demoted);
            let expected = self.ordering_deadline(head.task, demoted);

            if head.deadline_us != expected && repairs <= st.queue.len() {
                let err = SchedError::QueueCorruption {
                    task: head.task,
                    cached: head.deadline_us,
                    actual: expected,
                };
                error!(cpu = self.cpu, error = %err, "recomputing ordering key");
                st.queue.rekey(head.task, expected);
                repairs += 1;
                continue;
            }

            st.queue.pop_min();
            let slot = st.tasks.entry(head.task).or_default();
            slot.state = TaskState::Running;
            slot.wake_pending = false;

            debug!(
                cpu = self.cpu,
                task = %head.task,
                deadline_us = ?head.deadline_us,
                remaining = st.queue.len(),
                "picked"
            );
            return Some(head.task);
        }
    }

    fn on_tick(&self, running: &RunningTask, now_us: u64) -> TickOutcome {
        let Some(plan) = self.plans.get_plan(running.task) else {
            return TickOutcome::Continue;
        };
        let elapsed_us = running.elapsed_us(now_us);
        if elapsed_us > plan.budget_us {
            warn!(
                cpu = self.cpu,
                task = %running.task,
                elapsed_us,
                budget_us = plan.budget_us,
                "budget exceeded, preempting"
            );
            TickOutcome::BudgetExceeded {
                elapsed_us,
                budget_us: plan.budget_us,
            }
        } else {
            trace!(cpu = self.cpu, task = %running.task, elapsed_us, "tick");
            TickOutcome::Continue
        }
    }

    fn on_yield(&self, task: TaskId, now_us: u64) {
        let mut st = self.state.lock();
        self.requeue(&mut st, task, now_us);
        debug!(cpu = self.cpu, task = %task, "yielded");
    }

    fn on_preempted(&self, task: TaskId, now_us: u64) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let slot = st.tasks.entry(task).or_default();
        slot.overruns += 1;
        if self.overrun == OverrunPolicy::Demote {
            slot.demoted = true;
        }
        let overruns = slot.overruns;
        self.requeue(st, task, now_us);
        info!(
            cpu = self.cpu,
            task = %task,
            overruns,
            policy = %self.overrun,
            "preempted task requeued"
        );
    }

    fn on_completion(&self, task: TaskId, now_us: u64) -> Option<LatenessRecord> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.queue.dequeue(task);

        let Some(slot) = st.tasks.get_mut(&task) else {
            trace!(cpu = self.cpu, task = %task, "completion for exited task ignored");
            return None;
        };
        slot.state = TaskState::Completed;
        slot.demoted = false;
        let wake = std::mem::take(&mut slot.wake_pending);

        let record = self
            .plans
            .get_plan(task)
            .map(|plan| self.lateness.record_completion(&plan, now_us));
        match &record {
            Some(r) => info!(
                cpu = self.cpu,
                task = %task,
                lateness_us = r.lateness_us,
                "job completed"
            ),
            None => debug!(cpu = self.cpu, task = %task, "unplanned job completed"),
        }

        if wake {
            self.requeue(st, task, now_us);
        }
        record
    }

    fn on_plan_submitted(
        &self,
        task: TaskId,
        arrival_us: u64,
        deadline_us: u64,
        budget_us: u64,
    ) -> Result<PlanUpdate, PlanError> {
        let mut st = self.state.lock();
        let update = self
            .plans
            .submit_plan(task, arrival_us, deadline_us, budget_us)?;
        if update.changes_ordering() {
            self.rekey(&mut st, task);
        }
        Ok(update)
    }

    fn on_plan_cleared(&self, task: TaskId) -> Option<Arc<Plan>> {
        let mut st = self.state.lock();
        let removed = self.plans.clear_plan(task)?;
        self.rekey(&mut st, task);
        Some(removed)
    }

    fn on_dispatch_failed(&self, task: TaskId) {
        let mut st = self.state.lock();
        let slot = st.tasks.entry(task).or_default();
        slot.state = TaskState::Blocked;
        slot.wake_pending = false;
        warn!(cpu = self.cpu, task = %task, "dispatch failed, task parked as blocked");
    }

    fn ready_entries(&self) -> Vec<RunQueueEntry> {
        self.state.lock().queue.entries()
    }

    fn task_state(&self, task: TaskId) -> Option<TaskState> {
        self.state.lock().tasks.get(&task).map(|s| s.state)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
