/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler runtime: wires plans, policies and executors together per
//! processor.
//!
//! ```text
//!                    ┌──────────── SchedulerRuntime ─────────────┐
//! control ──plan──►  │ PlanStore ─┐                              │
//!                    │            ├─► cpu 0: policy ◄─► executor │
//! host ──ready/──►   │ bindings ──┘   cpu 1: policy ◄─► executor │
//!        block/exit  │ LatenessTable ◄── completions             │
//!                    └───────────────────────────────────────────┘
//! ```
//!
//! # Ownership model
//! Each processor's run queue lives inside its policy and is reachable only
//! through that processor's [`ProcessorLink`].  A task is bound to exactly one
//! processor the first time it is used, so it can never sit in two queues.
//!
//! # Lifecycle
//! 1. [`attach_run_queue`](SchedulerRuntime::attach_run_queue): once per
//!    processor (idempotent).
//! 2. [`activate`](SchedulerRuntime::activate): start the proxy executor
//!    (idempotent while it runs; serialized by the processor table lock).
//! 3. [`deactivate`](SchedulerRuntime::deactivate) /
//!    [`shutdown`](SchedulerRuntime::shutdown): stop and join.
//!
//! # Locking
//! Nested locks are only taken in this order: bindings, processor table,
//! policy state, then the plan store or lateness table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerSettings;
use crate::host::{ExecutorError, ExecutorJoin, ExecutorSpawner};
use crate::lateness::{LatenessRecord, LatenessTable};
use crate::plan::{Plan, PlanError, PlanStore, PlanUpdate};
use crate::proxy::{ProcessorLink, ProxyExecutor, TaskSwitcher};
use crate::runqueue::{EnqueueOutcome, RunQueueEntry};
use crate::scheduler::feasibility::{check_edf_density, EDF_DENSITY_BOUND};
use crate::scheduler::SchedError;
use crate::task::{CpuId, RunningTask, TaskId, TaskState};

// ── Per-processor bookkeeping ─────────────────────────────────────────────────

struct ActiveExecutor {
    shutdown: watch::Sender<bool>,
    join: ExecutorJoin,
}

struct CpuSlot {
    link: ProcessorLink,
    executor: Option<ActiveExecutor>,
}

impl CpuSlot {
    fn is_active(&self) -> bool {
        self.executor
            .as_ref()
            .is_some_and(|e| !e.join.is_finished())
    }
}

/// Snapshot of one processor for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuStatus {
    pub cpu: CpuId,
    pub policy: &'static str,
    pub active: bool,
    pub running: Option<RunningTask>,
    pub ready: Vec<RunQueueEntry>,
}

// ── SchedulerRuntime ──────────────────────────────────────────────────────────

pub struct SchedulerRuntime {
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
    plans: Arc<PlanStore>,
    lateness: Arc<LatenessTable>,
    cpus: Mutex<BTreeMap<CpuId, CpuSlot>>,
    bindings: RwLock<HashMap<TaskId, CpuId>>,
}

impl SchedulerRuntime {
    pub fn new(settings: SchedulerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            plans: Arc::new(PlanStore::new()),
            lateness: Arc::new(LatenessTable::new()),
            cpus: Mutex::new(BTreeMap::new()),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn plans(&self) -> &Arc<PlanStore> {
        &self.plans
    }

    pub fn lateness_table(&self) -> &Arc<LatenessTable> {
        &self.lateness
    }

    pub fn now_us(&self) -> u64 {
        self.clock.now_us()
    }

    // ── Processor lifecycle ───────────────────────────────────────────────────

    /// Create the run queue (and policy) for `cpu`.  Calling it again returns
    /// the existing link.
    pub fn attach_run_queue(&self, cpu: CpuId) -> ProcessorLink {
        let mut cpus = self.cpus.lock();
        let slot = cpus.entry(cpu).or_insert_with(|| {
            let policy = self.settings.policy.build(
                cpu,
                Arc::clone(&self.plans),
                Arc::clone(&self.lateness),
                self.settings.overrun_policy,
            );
            info!(
                cpu,
                policy = policy.name(),
                overrun = %self.settings.overrun_policy,
                "run queue attached"
            );
            CpuSlot {
                link: ProcessorLink::new(cpu, policy),
                executor: None,
            }
        });
        slot.link.clone()
    }

    /// Start the proxy executor for `cpu`.
    ///
    /// A no-op if an executor is already running there (the new `switcher` is
    /// dropped).
    ///
    /// # Errors
    /// * [`ExecutorError::NoRunQueue`] if the run queue was never attached.
    /// * [`ExecutorError::StartFailure`] from the spawner.  Other processors
    ///   are unaffected.
    pub fn activate<S: TaskSwitcher>(
        &self,
        cpu: CpuId,
        switcher: S,
        spawner: &dyn ExecutorSpawner,
    ) -> Result<(), ExecutorError> {
        let mut cpus = self.cpus.lock();
        let slot = cpus.get_mut(&cpu).ok_or(ExecutorError::NoRunQueue(cpu))?;

        if slot.is_active() {
            debug!(cpu, "executor already active");
            return Ok(());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let executor = ProxyExecutor::new(
            slot.link.clone(),
            switcher,
            Arc::clone(&self.clock),
            self.settings.tick_interval(),
            shutdown_rx,
        );

        match spawner.spawn_bound(cpu, Box::pin(executor.run_loop())) {
            Ok(join) => {
                slot.executor = Some(ActiveExecutor { shutdown, join });
                info!(cpu, "processor activated");
                Ok(())
            }
            Err(err) => {
                error!(cpu, error = %err, "processor activation failed");
                Err(err)
            }
        }
    }

    /// Stop the executor of `cpu` and wait for it.  Queued tasks stay queued.
    pub async fn deactivate(&self, cpu: CpuId) {
        let executor = self
            .cpus
            .lock()
            .get_mut(&cpu)
            .and_then(|slot| slot.executor.take());
        if let Some(exec) = executor {
            let _ = exec.shutdown.send(true);
            exec.join.join(cpu).await;
            info!(cpu, "processor deactivated");
        }
    }

    /// Stop every executor.
    pub async fn shutdown(&self) {
        let executors: Vec<(CpuId, ActiveExecutor)> = self
            .cpus
            .lock()
            .iter_mut()
            .filter_map(|(cpu, slot)| slot.executor.take().map(|e| (*cpu, e)))
            .collect();

        for (_, exec) in &executors {
            let _ = exec.shutdown.send(true);
        }
        for (cpu, exec) in executors {
            exec.join.join(cpu).await;
        }
        info!("scheduler runtime shut down");
    }

    pub fn link(&self, cpu: CpuId) -> Result<ProcessorLink, SchedError> {
        self.cpus
            .lock()
            .get(&cpu)
            .map(|s| s.link.clone())
            .ok_or(SchedError::NoRunQueue(cpu))
    }

    // ── Task lifecycle (host side) ────────────────────────────────────────────

    /// Bind `task` to `cpu`.  Re-binding to the same processor is a no-op.
    pub fn bind_task(&self, task: TaskId, cpu: CpuId) -> Result<(), SchedError> {
        self.link(cpu)?;
        let mut bindings = self.bindings.write();
        match bindings.get(&task) {
            Some(&bound) if bound != cpu => Err(SchedError::WrongProcessor {
                task,
                bound,
                requested: cpu,
            }),
            Some(_) => Ok(()),
            None => {
                bindings.insert(task, cpu);
                debug!(task = %task, cpu, "task bound");
                Ok(())
            }
        }
    }

    pub fn cpu_of(&self, task: TaskId) -> Option<CpuId> {
        self.bindings.read().get(&task).copied()
    }

    fn link_for(&self, task: TaskId) -> Result<ProcessorLink, SchedError> {
        let cpu = self.cpu_of(task).ok_or(SchedError::UnboundTask(task))?;
        self.link(cpu)
    }

    /// The host reports `task` runnable.
    pub fn task_ready(&self, task: TaskId) -> Result<EnqueueOutcome, SchedError> {
        let link = self.link_for(task)?;
        let outcome = link.policy.on_task_ready(task, self.now_us());
        if outcome == EnqueueOutcome::Queued {
            link.wake.notify_one();
        }
        Ok(outcome)
    }

    /// The host reports `task` blocked while it was not running.
    pub fn task_blocked(&self, task: TaskId) -> Result<(), SchedError> {
        let link = self.link_for(task)?;
        link.policy.on_task_blocked(task, self.now_us());
        Ok(())
    }

    /// The host tore `task` down.  Dequeues it before dropping its binding,
    /// plan and (finalized) lateness record.
    pub fn task_exited(&self, task: TaskId) {
        match self.link_for(task) {
            Ok(link) => link.policy.on_task_exited(task),
            Err(_) => {
                self.plans.clear_plan(task);
                self.lateness.finalize(task);
            }
        }
        self.bindings.write().remove(&task);
    }

    pub fn task_state(&self, task: TaskId) -> Option<TaskState> {
        self.link_for(task).ok()?.policy.task_state(task)
    }

    // ── Plans (control side) ──────────────────────────────────────────────────

    /// Validate and store a plan; an enqueued task is rekeyed before this
    /// returns.
    ///
    /// A bound task's plan is written through its policy, so the store and
    /// the queue key change in one critical section.  The bindings read lock
    /// is held throughout so the task cannot become bound in between.
    ///
    /// # Errors
    /// [`PlanError`]; nothing changes.
    pub fn submit_plan(
        &self,
        task: TaskId,
        arrival_us: u64,
        deadline_us: u64,
        budget_us: u64,
    ) -> Result<(), PlanError> {
        let (result, bound) = {
            let bindings = self.bindings.read();
            let bound = bindings.get(&task).copied();
            let result = match bound.and_then(|cpu| self.link(cpu).ok()) {
                Some(link) => link
                    .policy
                    .on_plan_submitted(task, arrival_us, deadline_us, budget_us),
                None => self
                    .plans
                    .submit_plan(task, arrival_us, deadline_us, budget_us),
            };
            (result, bound)
        };

        let update = match result {
            Ok(update) => update,
            Err(err) => {
                warn!(task = %task, error = %err, "plan rejected");
                return Err(err);
            }
        };

        // A re-admitted id starts a fresh lateness history.
        if update == PlanUpdate::Created {
            self.lateness.discard_finalized(task);
        }
        if let (true, Some(cpu)) = (update.changes_ordering(), bound) {
            self.check_feasibility(cpu);
        }

        info!(task = %task, arrival_us, deadline_us, budget_us, "plan accepted");
        Ok(())
    }

    pub fn get_plan(&self, task: TaskId) -> Option<Arc<Plan>> {
        self.plans.get_plan(task)
    }

    /// Remove the plan of `task`; if queued it drops to the unplanned tier.
    pub fn clear_plan(&self, task: TaskId) {
        let bindings = self.bindings.read();
        let removed = match bindings.get(&task).and_then(|&cpu| self.link(cpu).ok()) {
            Some(link) => link.policy.on_plan_cleared(task),
            None => self.plans.clear_plan(task),
        };
        if removed.is_some() {
            debug!(task = %task, "plan removed by control");
        }
    }

    /// Latest lateness record of `task`, or `None` if it never completed a
    /// planned job.  Reading the record of an exited task hands it out one
    /// last time and drops it.
    pub fn lateness(&self, task: TaskId) -> Option<LatenessRecord> {
        self.lateness.read(task)
    }

    /// Warn when the plans bound to `cpu` exceed the EDF density bound.
    fn check_feasibility(&self, cpu: CpuId) {
        let tasks: Vec<TaskId> = self
            .bindings
            .read()
            .iter()
            .filter(|(_, c)| **c == cpu)
            .map(|(&t, _)| t)
            .collect();
        let plans = self.plans.plans_for(tasks);
        let refs: Vec<&Plan> = plans.iter().map(|p| p.as_ref()).collect();

        if let Some(density) = check_edf_density(&refs) {
            warn!(
                cpu,
                density,
                bound = EDF_DENSITY_BOUND,
                plan_count = refs.len(),
                "plan set exceeds the EDF density bound, deadlines may be missed"
            );
        }
    }

    // ── Status ────────────────────────────────────────────────────────────────

    pub fn status(&self) -> Vec<CpuStatus> {
        self.cpus
            .lock()
            .iter()
            .map(|(&cpu, slot)| CpuStatus {
                cpu,
                policy: slot.link.policy.name(),
                active: slot.is_active(),
                running: slot.link.running(),
                ready: slot.link.policy.ready_entries(),
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
