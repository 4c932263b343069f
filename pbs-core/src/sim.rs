/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulated host: tasks are amounts of CPU work consumed on tokio time.
//!
//! A dispatch sleeps for the job's remaining work and then reports
//! `Completed`; a preemption aborts the sleep and debits what was consumed.
//! Work launched while a slice is in flight becomes the task's next job.
//!
//! Work is consumed on the tokio timer, so it resolves to whole
//! milliseconds: 1500 µs of work completes after 2 ms.
//!
//! [`SimHost`] is cheap to clone; all clones share one job table, so a single
//! host can back every processor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::control::TaskLauncher;
use crate::proxy::{Relinquisher, SwitchError, TaskSwitcher};
use crate::runtime::SchedulerRuntime;
use crate::task::{CpuId, TaskId};

struct InFlight {
    sleeper: JoinHandle<()>,
    started: Instant,
    relinquish: Relinquisher,
}

#[derive(Default)]
struct SimJob {
    remaining_us: u64,
    /// Work launched while a slice was in flight.
    pending_us: u64,
    in_flight: Option<InFlight>,
}

#[derive(Clone, Default)]
pub struct SimHost {
    jobs: Arc<Mutex<HashMap<TaskId, SimJob>>>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `task` another `work_us` of work.
    pub fn add_work(&self, task: TaskId, work_us: u64) {
        let mut jobs = self.jobs.lock();
        let job = jobs.entry(task).or_default();
        if job.in_flight.is_some() {
            job.pending_us += work_us;
        } else {
            job.remaining_us += work_us;
        }
        trace!(task = %task, work_us, remaining_us = job.remaining_us, "work added");
    }

    pub fn remaining_us(&self, task: TaskId) -> Option<u64> {
        self.jobs.lock().get(&task).map(|j| j.remaining_us)
    }

    /// Forget `task`.  A task that is on a processor reports `Exited`.
    pub fn remove_task(&self, task: TaskId) -> bool {
        let Some(job) = self.jobs.lock().remove(&task) else {
            return false;
        };
        if let Some(run) = job.in_flight {
            run.sleeper.abort();
            run.relinquish.exited();
        }
        debug!(task = %task, "simulated task removed");
        true
    }
}

impl TaskSwitcher for SimHost {
    fn switch_to(&mut self, task: TaskId, relinquish: Relinquisher) -> Result<(), SwitchError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&task).ok_or(SwitchError::UnknownTask(task))?;
        if let Some(stale) = job.in_flight.take() {
            stale.sleeper.abort();
        }

        let work = job.remaining_us;
        let table = Arc::clone(&self.jobs);
        let done = relinquish.clone();
        let sleeper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_micros(work)).await;
            if let Some(job) = table.lock().get_mut(&task) {
                job.remaining_us = std::mem::take(&mut job.pending_us);
                job.in_flight = None;
            }
            done.completed();
        });

        job.in_flight = Some(InFlight {
            sleeper,
            started: Instant::now(),
            relinquish,
        });
        trace!(task = %task, work_us = work, "simulated slice started");
        Ok(())
    }

    fn preempt(&mut self, task: TaskId) {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&task) else {
            return;
        };
        if let Some(run) = job.in_flight.take() {
            run.sleeper.abort();
            let used = u64::try_from(run.started.elapsed().as_micros()).unwrap_or(u64::MAX);
            job.remaining_us = job.remaining_us.saturating_sub(used) + std::mem::take(&mut job.pending_us);
            trace!(task = %task, used_us = used, remaining_us = job.remaining_us, "simulated slice preempted");
        }
    }
}

// ── SimLauncher ───────────────────────────────────────────────────────────────

/// `LAUNCH` handler backed by a [`SimHost`]: bind, add work, report ready.
pub struct SimLauncher {
    runtime: Arc<SchedulerRuntime>,
    host: SimHost,
}

impl SimLauncher {
    pub fn new(runtime: Arc<SchedulerRuntime>, host: SimHost) -> Self {
        Self { runtime, host }
    }
}

impl TaskLauncher for SimLauncher {
    fn launch(&self, task: TaskId, cpu: CpuId, work_us: u64) -> anyhow::Result<()> {
        self.runtime
            .bind_task(task, cpu)
            .with_context(|| format!("cannot place task {task} on cpu {cpu}"))?;
        self.host.add_work(task, work_us);
        self.runtime.task_ready(task)?;
        debug!(task = %task, cpu, work_us, "simulated task launched");
        Ok(())
    }

    fn exit(&self, task: TaskId) {
        self.host.remove_task(task);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::TokioClock;
    use crate::config::SchedulerSettings;
    use crate::control::{ControlInterface, Response};
    use crate::host::RuntimeSpawner;
    use crate::task::TaskState;

    fn runtime(cpus: &[CpuId]) -> Arc<SchedulerRuntime> {
        let rt = Arc::new(SchedulerRuntime::new(
            SchedulerSettings {
                cpus: cpus.to_vec(),
                ..SchedulerSettings::default()
            },
            Arc::new(TokioClock::new()),
        ));
        for &cpu in cpus {
            rt.attach_run_queue(cpu);
        }
        rt
    }

    fn activate(rt: &SchedulerRuntime, cpu: CpuId, host: &SimHost) {
        let spawner = RuntimeSpawner::current(cpu).unwrap();
        rt.activate(cpu, host.clone(), &spawner).unwrap();
    }

    fn completion(rt: &SchedulerRuntime, task: u64) -> u64 {
        rt.lateness(TaskId(task))
            .unwrap_or_else(|| panic!("task {task} never completed"))
            .completion_us
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_in_deadline_order() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        let launcher = SimLauncher::new(rt.clone(), host.clone());

        // A(d=10ms) B(d=5ms) C(d=20ms), all ready before the executor starts.
        for (task, deadline) in [(1, 10_000), (2, 5_000), (3, 20_000)] {
            rt.submit_plan(TaskId(task), 0, deadline, 2_000).unwrap();
            launcher.launch(TaskId(task), 0, 1_000).unwrap();
        }
        activate(&rt, 0, &host);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (a, b, c) = (completion(&rt, 1), completion(&rt, 2), completion(&rt, 3));
        assert!(b < a && a < c, "expected B < A < C, got {b} {a} {c}");
        assert_eq!(c, 3_000);
        assert!(rt.lateness(TaskId(3)).unwrap().lateness_us < 0);
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_job_is_preempted_and_resumed() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        let launcher = SimLauncher::new(rt.clone(), host.clone());
        activate(&rt, 0, &host);

        rt.submit_plan(TaskId(1), 0, 100_000, 4_000).unwrap();
        launcher.launch(TaskId(1), 0, 11_000).unwrap();

        // First check past the budget is the 5 ms tick; the second slice is
        // in flight by 6 ms.
        tokio::time::sleep(Duration::from_millis(6)).await;
        assert_eq!(host.remaining_us(TaskId(1)), Some(6_000));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let rec = rt.lateness(TaskId(1)).unwrap();
        assert_eq!(rec.completions, 1);
        assert_eq!(rec.completion_us, 11_000);
        assert_eq!(host.remaining_us(TaskId(1)), Some(0));
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn partial_millisecond_work_completes_on_next_timer_tick() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        let launcher = SimLauncher::new(rt.clone(), host.clone());
        activate(&rt, 0, &host);

        rt.submit_plan(TaskId(1), 0, 50_000, 5_000).unwrap();
        launcher.launch(TaskId(1), 0, 1_500).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(completion(&rt, 1), 2_000);
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_waits_for_running_slice() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        let launcher = SimLauncher::new(rt.clone(), host.clone());
        activate(&rt, 0, &host);

        rt.submit_plan(TaskId(1), 0, 50_000, 5_000).unwrap();
        launcher.launch(TaskId(1), 0, 3_000).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        rt.submit_plan(TaskId(2), 0, 2_000, 1_000).unwrap();
        launcher.launch(TaskId(2), 0, 1_000).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(completion(&rt, 1), 3_000);
        assert_eq!(completion(&rt, 2), 4_000);
        assert!(rt.lateness(TaskId(2)).unwrap().missed_deadline());
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn launch_during_slice_queues_next_job() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        let launcher = SimLauncher::new(rt.clone(), host.clone());
        activate(&rt, 0, &host);

        rt.submit_plan(TaskId(1), 0, 50_000, 5_000).unwrap();
        launcher.launch(TaskId(1), 0, 3_000).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        launcher.launch(TaskId(1), 0, 2_000).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let rec = rt.lateness(TaskId(1)).unwrap();
        assert_eq!(rec.completions, 2);
        assert_eq!(rec.completion_us, 5_000);
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exit_while_running_frees_processor() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        let launcher = Arc::new(SimLauncher::new(rt.clone(), host.clone()));
        let control = ControlInterface::new(rt.clone()).with_launcher(launcher);
        activate(&rt, 0, &host);

        assert_eq!(control.handle_line("PLAN 1 0 100000 90000"), Response::Ok);
        assert_eq!(control.handle_line("LAUNCH 1 0 80000"), Response::Ok);
        assert_eq!(control.handle_line("PLAN 2 0 200000 1000"), Response::Ok);
        assert_eq!(control.handle_line("LAUNCH 2 0 1000"), Response::Ok);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(rt.status()[0].running.map(|r| r.task), Some(TaskId(1)));

        assert_eq!(control.handle_line("EXIT 1"), Response::Ok);
        tokio::time::sleep(Duration::from_millis(2)).await;

        assert_eq!(control.handle_line("LATENESS 1"), Response::None);
        assert!(matches!(control.handle_line("LATENESS 2"), Response::Lateness(_)));
        assert!(rt.get_plan(TaskId(1)).is_none());
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_task_dispatch_parks_it() {
        let rt = runtime(&[0]);
        let host = SimHost::new();
        activate(&rt, 0, &host);

        rt.bind_task(TaskId(9), 0).unwrap();
        rt.task_ready(TaskId(9)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(rt.task_state(TaskId(9)), Some(TaskState::Blocked));
        assert!(rt.status()[0].ready.is_empty());
        rt.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn processors_run_independently() {
        let rt = runtime(&[0, 1]);
        let host = SimHost::new();
        let launcher = SimLauncher::new(rt.clone(), host.clone());
        activate(&rt, 0, &host);
        activate(&rt, 1, &host);

        rt.submit_plan(TaskId(1), 0, 10_000, 3_000).unwrap();
        rt.submit_plan(TaskId(2), 0, 10_000, 3_000).unwrap();
        launcher.launch(TaskId(1), 0, 2_000).unwrap();
        launcher.launch(TaskId(2), 1, 2_000).unwrap();
        assert!(launcher.launch(TaskId(2), 0, 1).is_err());

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(completion(&rt, 1), 2_000);
        assert_eq!(completion(&rt, 2), 2_000);
        rt.shutdown().await;
    }
}
