/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task identity and scheduler-visible task state.
//!
//! The scheduler never owns a task.  The host (a real thread runtime, or the
//! simulated host in [`crate::sim`]) owns the work; everything inside PBS
//! refers to it by [`TaskId`] only:
//!
//! ```text
//! host ──(TaskId)──► runtime ──► policy / run queue ──► proxy executor
//!   ▲                                                        │
//!   └──────────────(switch_to / preempt, Relinquish)─────────┘
//! ```

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Stable identifier of a schedulable task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(TaskId)
    }
}

impl From<u64> for TaskId {
    fn from(v: u64) -> Self {
        TaskId(v)
    }
}

/// Logical processor number.
pub type CpuId = u32;

// ── State machine ─────────────────────────────────────────────────────────────

/// Scheduler-visible lifecycle of a task.
///
/// ```text
/// Unplanned ──► Ready ──► Running ──┬──► Ready      (yield / budget overrun)
///                 ▲                 ├──► Blocked ──► Ready (wake-up)
///                 │                 └──► Completed
///                 └────────────── next job ◄──┘
/// ```
///
/// `Running` is owned by exactly one processor's proxy executor at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Known to the scheduler but never made ready.
    #[default]
    Unplanned,
    /// Waiting in a run queue.
    Ready,
    /// Dispatched by a proxy executor.
    Running,
    /// Off the run queue until the host wakes it.
    Blocked,
    /// The current job finished; lateness has been recorded.
    Completed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Unplanned => "unplanned",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Blocked => "blocked",
            TaskState::Completed => "completed",
        };
        f.write_str(s)
    }
}

// ── Running slot ──────────────────────────────────────────────────────────────

/// The task currently dispatched on a processor.
///
/// Written only by that processor's proxy executor; everybody else reads a
/// copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningTask {
    pub task: TaskId,
    pub cpu: CpuId,
    /// Dispatch counter of the executor, used to discard stale host events.
    pub slice: u64,
    /// Scheduler-clock time (µs) at which this slice started.
    pub started_us: u64,
}

impl RunningTask {
    /// Microseconds this slice has been running at `now_us`.
    pub fn elapsed_us(&self, now_us: u64) -> u64 {
        now_us.saturating_sub(self.started_us)
    }
}

// ── Host → executor events ────────────────────────────────────────────────────

/// Why a running task gave the processor back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelinquishKind {
    /// Voluntary yield; the task stays runnable.
    Yielded,
    /// The task is waiting on something.
    Blocked,
    /// The current job finished.
    Completed,
    /// The task is gone for good.
    Exited,
}

/// A relinquish notification sent by the host to the proxy executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relinquish {
    pub task: TaskId,
    pub slice: u64,
    pub kind: RelinquishKind,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_parses_decimal() {
        assert_eq!("42".parse::<TaskId>().unwrap(), TaskId(42));
        assert!("-1".parse::<TaskId>().is_err());
        assert!("x".parse::<TaskId>().is_err());
    }

    #[test]
    fn default_state_is_unplanned() {
        assert_eq!(TaskState::default(), TaskState::Unplanned);
    }

    #[test]
    fn elapsed_saturates_when_clock_is_behind_start() {
        let r = RunningTask {
            task: TaskId(1),
            cpu: 0,
            slice: 1,
            started_us: 100,
        };
        assert_eq!(r.elapsed_us(150), 50);
        assert_eq!(r.elapsed_us(90), 0);
    }
}
