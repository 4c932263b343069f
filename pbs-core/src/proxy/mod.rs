/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Proxy executor: the per-processor loop that turns policy decisions into
//! context switches.
//!
//! ```text
//!            ┌────────────── wake (Notify) ◄── runtime.task_ready
//!            ▼
//!   ┌──► pick_next ──none──► idle
//!   │        │ task
//!   │        ▼
//!   │   switch_to(task, relinquisher) ──err──► on_dispatch_failed ──┐
//!   │        │                                                      │
//!   │        ▼                                                      │
//!   │   select! { relinquish | tick → on_tick | shutdown }          │
//!   │        │                                                      │
//!   │        ▼                                                      │
//!   └── on_yield / on_task_blocked / on_completion /                │
//!       on_task_exited / on_preempted ◄─────────────────────────────┘
//! ```
//!
//! The executor is the only writer of its processor's *current task* slot.
//! A failing task never stops the loop: the error is logged, the task is
//! parked and the next pick happens immediately.

pub mod switch;

pub use switch::{Relinquisher, SwitchError, TaskSwitcher};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::TIMER_RESOLUTION_US;
use crate::scheduler::{SchedClass, TickOutcome};
use crate::task::{CpuId, Relinquish, RelinquishKind, RunningTask, TaskId};

/// Shared, read-mostly view of what a processor is running.
pub type CurrentSlot = Arc<RwLock<Option<RunningTask>>>;

/// Everything a processor shares between its executor and the runtime.
#[derive(Clone)]
pub struct ProcessorLink {
    pub cpu: CpuId,
    pub policy: Arc<dyn SchedClass>,
    /// Signalled whenever a task is admitted to an idle processor.
    pub wake: Arc<Notify>,
    pub current: CurrentSlot,
}

impl ProcessorLink {
    pub fn new(cpu: CpuId, policy: Arc<dyn SchedClass>) -> Self {
        Self {
            cpu,
            policy,
            wake: Arc::new(Notify::new()),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Copy of the running slot.
    pub fn running(&self) -> Option<RunningTask> {
        *self.current.read()
    }
}

// ── Loop internals ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SliceEnd {
    Relinquished(RelinquishKind),
    Preempted,
    DispatchFailed,
    Shutdown,
}

enum Wait {
    Event(Option<Relinquish>),
    Shutdown,
    Tick,
}

/// Smallest whole multiple of the timer resolution that is `>= tick`, and
/// never zero.
fn timer_ticks(tick: Duration) -> Duration {
    let us = tick.as_micros().min(u64::MAX as u128) as u64;
    let ticks = us.div_ceil(TIMER_RESOLUTION_US).max(1);
    Duration::from_micros(ticks.saturating_mul(TIMER_RESOLUTION_US))
}

// ── ProxyExecutor ─────────────────────────────────────────────────────────────

pub struct ProxyExecutor<S: TaskSwitcher> {
    link: ProcessorLink,
    switcher: S,
    clock: Arc<dyn Clock>,
    tick: Duration,
    shutdown: watch::Receiver<bool>,
    events_tx: mpsc::UnboundedSender<Relinquish>,
    events_rx: mpsc::UnboundedReceiver<Relinquish>,
    slice: u64,
}

impl<S: TaskSwitcher> ProxyExecutor<S> {
    /// `tick` is rounded up to whole milliseconds, the resolution of the
    /// tokio timer; the configuration layer only admits such values.
    pub fn new(
        link: ProcessorLink,
        switcher: S,
        clock: Arc<dyn Clock>,
        tick: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let rounded = timer_ticks(tick);
        if rounded != tick {
            warn!(
                cpu = link.cpu,
                requested_us = tick.as_micros() as u64,
                tick_us = rounded.as_micros() as u64,
                "tick rounded up to timer resolution"
            );
        }
        Self {
            link,
            switcher,
            clock,
            tick: rounded,
            shutdown,
            events_tx,
            events_rx,
            slice: 0,
        }
    }

    /// Run until shutdown is signalled (or its sender is dropped).
    pub async fn run_loop(mut self) {
        let cpu = self.link.cpu;
        info!(
            cpu,
            policy = self.link.policy.name(),
            tick_us = self.tick.as_micros() as u64,
            "proxy executor started"
        );

        while !self.stopping() {
            let now = self.clock.now_us();
            match self.link.policy.pick_next(now) {
                Some(task) => {
                    if self.run_slice(task).await == SliceEnd::Shutdown {
                        break;
                    }
                }
                None => self.idle().await,
            }
        }

        *self.link.current.write() = None;
        info!(cpu, slices = self.slice, "proxy executor stopped");
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    async fn idle(&mut self) {
        trace!(cpu = self.link.cpu, "run queue empty, idling");
        tokio::select! {
            _ = self.link.wake.notified() => {}
            _ = self.shutdown.changed() => {}
        }
    }

    /// Dispatch `task` and wait for its slice to end.
    async fn run_slice(&mut self, task: TaskId) -> SliceEnd {
        let cpu = self.link.cpu;
        self.slice += 1;
        let running = RunningTask {
            task,
            cpu,
            slice: self.slice,
            started_us: self.clock.now_us(),
        };

        let relinquisher = Relinquisher::new(self.events_tx.clone(), task, running.slice);
        if let Err(err) = self.switcher.switch_to(task, relinquisher) {
            warn!(cpu, task = %task, error = %err, "context switch failed, retrying pick-next");
            self.link.policy.on_dispatch_failed(task);
            return SliceEnd::DispatchFailed;
        }
        *self.link.current.write() = Some(running);
        debug!(cpu, task = %task, slice = running.slice, "dispatched");

        let mut ticker = time::interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            let wait = tokio::select! {
                biased;
                ev = self.events_rx.recv() => Wait::Event(ev),
                _ = self.shutdown.changed() => Wait::Shutdown,
                _ = ticker.tick() => Wait::Tick,
            };

            match wait {
                Wait::Event(Some(ev)) if ev.slice == running.slice => {
                    break SliceEnd::Relinquished(ev.kind);
                }
                Wait::Event(Some(ev)) => {
                    trace!(cpu, task = %ev.task, slice = ev.slice, "stale relinquish ignored");
                }
                // Unreachable while we hold `events_tx`.
                Wait::Event(None) => break SliceEnd::Shutdown,
                Wait::Shutdown => {
                    if self.stopping() {
                        self.switcher.preempt(task);
                        break SliceEnd::Shutdown;
                    }
                }
                Wait::Tick => {
                    let now = self.clock.now_us();
                    if let TickOutcome::BudgetExceeded { .. } =
                        self.link.policy.on_tick(&running, now)
                    {
                        self.switcher.preempt(task);
                        break SliceEnd::Preempted;
                    }
                }
            }
        };

        *self.link.current.write() = None;
        let now = self.clock.now_us();
        let policy = &self.link.policy;
        match end {
            SliceEnd::Relinquished(RelinquishKind::Yielded) => policy.on_yield(task, now),
            SliceEnd::Relinquished(RelinquishKind::Blocked) => policy.on_task_blocked(task, now),
            SliceEnd::Relinquished(RelinquishKind::Completed) => {
                policy.on_completion(task, now);
            }
            SliceEnd::Relinquished(RelinquishKind::Exited) => policy.on_task_exited(task),
            SliceEnd::Preempted => policy.on_preempted(task, now),
            // Leave it runnable so a restarted executor picks it up again.
            SliceEnd::Shutdown => policy.on_yield(task, now),
            SliceEnd::DispatchFailed => {}
        }
        end
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use crate::clock::TokioClock;
    use crate::lateness::LatenessTable;
    use crate::plan::PlanStore;
    use crate::runqueue::EnqueueOutcome;
    use crate::scheduler::{EdfPolicy, OverrunPolicy};
    use crate::task::TaskState;

    // ── Scripted host ─────────────────────────────────────────────────────────

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Complete,
        Hang,
        Fail,
        /// Yield on the first dispatch, complete on every later one.
        YieldOnce,
        /// Run for the given number of milliseconds, then block.
        BlockAfter(u64),
        /// Hang, and on every later dispatch replay a completion through the
        /// previous slice's relinquisher.
        StaleCompletion,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Action {
        Switch(TaskId),
        Preempt(TaskId, u64),
    }

    #[derive(Clone)]
    struct Script {
        clock: Arc<TokioClock>,
        behavior: Arc<HashMap<TaskId, Behavior>>,
        log: Arc<Mutex<Vec<Action>>>,
        saved: Arc<Mutex<Option<Relinquisher>>>,
    }

    impl Script {
        fn new(clock: Arc<TokioClock>, behavior: &[(u64, Behavior)]) -> Self {
            Self {
                clock,
                behavior: Arc::new(behavior.iter().map(|(t, b)| (TaskId(*t), *b)).collect()),
                log: Arc::default(),
                saved: Arc::default(),
            }
        }

        fn switches(&self) -> Vec<u64> {
            self.log
                .lock()
                .iter()
                .filter_map(|a| match a {
                    Action::Switch(t) => Some(t.0),
                    _ => None,
                })
                .collect()
        }

        fn preempts(&self) -> Vec<(u64, u64)> {
            self.log
                .lock()
                .iter()
                .filter_map(|a| match a {
                    Action::Preempt(t, at) => Some((t.0, *at)),
                    _ => None,
                })
                .collect()
        }
    }

    impl TaskSwitcher for Script {
        fn switch_to(&mut self, task: TaskId, r: Relinquisher) -> Result<(), SwitchError> {
            let earlier = {
                let mut log = self.log.lock();
                let n = log.iter().filter(|a| **a == Action::Switch(task)).count();
                log.push(Action::Switch(task));
                n
            };
            match self.behavior.get(&task).copied().unwrap_or(Behavior::Complete) {
                Behavior::Complete => {
                    r.completed();
                }
                Behavior::YieldOnce if earlier == 0 => {
                    r.yielded();
                }
                Behavior::YieldOnce => {
                    r.completed();
                }
                Behavior::BlockAfter(ms) => {
                    tokio::spawn(async move {
                        time::sleep(Duration::from_millis(ms)).await;
                        r.blocked();
                    });
                }
                Behavior::Hang => {}
                Behavior::Fail => {
                    return Err(SwitchError::Failed {
                        task,
                        reason: "scripted failure".into(),
                    })
                }
                Behavior::StaleCompletion => {
                    if let Some(old) = self.saved.lock().replace(r) {
                        old.completed();
                    }
                }
            }
            Ok(())
        }

        fn preempt(&mut self, task: TaskId) {
            let at = self.clock.now_us();
            self.log.lock().push(Action::Preempt(task, at));
        }
    }

    // ── Harness ───────────────────────────────────────────────────────────────

    struct Harness {
        plans: Arc<PlanStore>,
        lateness: Arc<LatenessTable>,
        policy: Arc<EdfPolicy>,
        link: ProcessorLink,
        clock: Arc<TokioClock>,
    }

    fn harness() -> Harness {
        let plans = Arc::new(PlanStore::new());
        let lateness = Arc::new(LatenessTable::new());
        let policy = Arc::new(EdfPolicy::new(
            0,
            plans.clone(),
            lateness.clone(),
            OverrunPolicy::KeepDeadline,
        ));
        let link = ProcessorLink::new(0, policy.clone());
        Harness {
            plans,
            lateness,
            policy,
            link,
            clock: Arc::new(TokioClock::new()),
        }
    }

    async fn run_for(h: &Harness, script: Script, tick: Duration, run: Duration) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let exec = ProxyExecutor::new(h.link.clone(), script, h.clock.clone(), tick, stop_rx);
        let join = tokio::spawn(exec.run_loop());
        time::sleep(run).await;
        stop_tx.send(true).unwrap();
        join.await.unwrap();
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn dispatches_in_edf_order() {
        let h = harness();
        h.plans.submit_plan(TaskId(1), 0, 10_000, 1_000).unwrap(); // A
        h.plans.submit_plan(TaskId(2), 0, 5_000, 1_000).unwrap(); // B
        for t in [1, 2, 3] {
            h.policy.on_task_ready(TaskId(t), 0);
        }

        let script = Script::new(h.clock.clone(), &[]);
        run_for(&h, script.clone(), Duration::from_millis(1), Duration::from_millis(5)).await;

        assert_eq!(script.switches(), vec![2, 1, 3]);
        assert!(h.lateness.get(TaskId(1)).is_some());
        assert!(h.lateness.get(TaskId(2)).is_some());
        assert!(h.lateness.get(TaskId(3)).is_none(), "unplanned task");
    }

    #[tokio::test(start_paused = true)]
    async fn budget_overrun_is_preempted_within_one_tick() {
        let h = harness();
        h.plans.submit_plan(TaskId(7), 0, 100_000, 4_000).unwrap();
        h.policy.on_task_ready(TaskId(7), 0);

        let script = Script::new(h.clock.clone(), &[(7, Behavior::Hang)]);
        run_for(&h, script.clone(), Duration::from_millis(1), Duration::from_micros(6_500)).await;

        let preempts = script.preempts();
        let (task, at) = preempts[0];
        assert_eq!(task, 7);
        assert!(at > 4_000 && at <= 5_000, "first preempt at {at}µs");
        assert!(h.policy.overruns(TaskId(7)) >= 1);
        // Shutdown leaves the task runnable, not running.
        assert_eq!(h.policy.task_state(TaskId(7)), Some(TaskState::Ready));
        assert!(h.link.running().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sub_millisecond_tick_is_rounded_to_timer_resolution() {
        let h = harness();
        h.plans.submit_plan(TaskId(7), 0, 100_000, 200).unwrap();
        h.policy.on_task_ready(TaskId(7), 0);

        let (_stop_tx, stop_rx) = watch::channel(false);
        let script = Script::new(h.clock.clone(), &[(7, Behavior::Hang)]);
        let exec = ProxyExecutor::new(
            h.link.clone(),
            script,
            h.clock.clone(),
            Duration::from_micros(100),
            stop_rx,
        );
        assert_eq!(exec.tick, Duration::from_millis(1));
        assert_eq!(timer_ticks(Duration::from_micros(1_500)), Duration::from_millis(2));
        assert_eq!(timer_ticks(Duration::from_millis(3)), Duration::from_millis(3));
        assert_eq!(timer_ticks(Duration::ZERO), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn yielded_task_requeues_behind_equal_deadline_peer() {
        let h = harness();
        h.plans.submit_plan(TaskId(1), 0, 10_000, 1_000).unwrap();
        h.plans.submit_plan(TaskId(2), 0, 10_000, 1_000).unwrap();
        h.policy.on_task_ready(TaskId(1), 0);
        h.policy.on_task_ready(TaskId(2), 0);

        let script = Script::new(h.clock.clone(), &[(1, Behavior::YieldOnce)]);
        run_for(&h, script.clone(), Duration::from_millis(1), Duration::from_millis(2)).await;

        assert_eq!(script.switches(), vec![1, 2, 1]);
        assert_eq!(h.lateness.get(TaskId(1)).map(|r| r.completions), Some(1));
        assert_eq!(h.lateness.get(TaskId(2)).map(|r| r.completions), Some(1));
        assert!(script.preempts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_deferred_during_slice_requeues_on_block() {
        let h = harness();
        h.policy.on_task_ready(TaskId(5), 0);
        let script = Script::new(h.clock.clone(), &[(5, Behavior::BlockAfter(2))]);

        let (stop_tx, stop_rx) = watch::channel(false);
        let exec = ProxyExecutor::new(
            h.link.clone(),
            script.clone(),
            h.clock.clone(),
            Duration::from_millis(1),
            stop_rx,
        );
        let join = tokio::spawn(exec.run_loop());

        // t=1ms: task 5 is mid-slice.
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.link.running().map(|r| r.task), Some(TaskId(5)));
        assert_eq!(
            h.policy.on_task_ready(TaskId(5), h.clock.now_us()),
            EnqueueOutcome::Deferred
        );

        // t=3ms: the block at t=2ms applied the pending wake-up.
        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(h.link.running().map(|r| r.slice), Some(2));

        // t=5ms: the second block had no wake-up pending.
        time::sleep(Duration::from_millis(2)).await;
        assert!(h.link.running().is_none());
        assert_eq!(h.policy.task_state(TaskId(5)), Some(TaskState::Blocked));
        assert_eq!(script.switches(), vec![5, 5]);

        stop_tx.send(true).unwrap();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_switch_does_not_stop_the_loop() {
        let h = harness();
        h.plans.submit_plan(TaskId(1), 0, 1_000, 100).unwrap();
        h.plans.submit_plan(TaskId(2), 0, 2_000, 100).unwrap();
        h.policy.on_task_ready(TaskId(1), 0);
        h.policy.on_task_ready(TaskId(2), 0);

        let script = Script::new(h.clock.clone(), &[(1, Behavior::Fail)]);
        run_for(&h, script.clone(), Duration::from_millis(1), Duration::from_millis(3)).await;

        assert_eq!(script.switches(), vec![1, 2]);
        assert_eq!(h.policy.task_state(TaskId(1)), Some(TaskState::Blocked));
        assert!(h.lateness.get(TaskId(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_executor_wakes_on_notify() {
        let h = harness();
        let script = Script::new(h.clock.clone(), &[]);

        let (stop_tx, stop_rx) = watch::channel(false);
        let exec = ProxyExecutor::new(
            h.link.clone(),
            script.clone(),
            h.clock.clone(),
            Duration::from_millis(1),
            stop_rx,
        );
        let join = tokio::spawn(exec.run_loop());

        time::sleep(Duration::from_millis(2)).await;
        assert!(script.switches().is_empty());

        h.policy.on_task_ready(TaskId(5), h.clock.now_us());
        h.link.wake.notify_one();
        time::sleep(Duration::from_millis(2)).await;

        stop_tx.send(true).unwrap();
        join.await.unwrap();
        assert_eq!(script.switches(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_relinquish_from_earlier_slice_is_ignored() {
        let h = harness();
        h.plans.submit_plan(TaskId(9), 0, 100_000, 2_000).unwrap();
        h.policy.on_task_ready(TaskId(9), 0);

        let script = Script::new(h.clock.clone(), &[(9, Behavior::StaleCompletion)]);
        run_for(&h, script.clone(), Duration::from_millis(1), Duration::from_micros(4_500)).await;

        assert!(script.switches().len() >= 2, "re-dispatched after preemption");
        assert!(
            h.lateness.get(TaskId(9)).is_none(),
            "completion from slice 1 must not end slice 2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_shutdown_sender_stops_the_loop() {
        let h = harness();
        let script = Script::new(h.clock.clone(), &[]);
        let (stop_tx, stop_rx) = watch::channel(false);
        let exec = ProxyExecutor::new(
            h.link.clone(),
            script,
            h.clock.clone(),
            Duration::from_millis(1),
            stop_rx,
        );
        let join = tokio::spawn(exec.run_loop());
        drop(stop_tx);
        time::timeout(Duration::from_secs(1), join)
            .await
            .expect("executor should stop")
            .unwrap();
    }
}
