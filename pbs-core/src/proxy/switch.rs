/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The host side of a context switch.
//!
//! The proxy executor decides *which* task runs; a [`TaskSwitcher`] makes it
//! run.  The host reports back through the [`Relinquisher`] it was handed at
//! dispatch time.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::task::{Relinquish, RelinquishKind, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("task {0} is unknown to the host")]
    UnknownTask(TaskId),

    #[error("context switch to task {task} failed: {reason}")]
    Failed { task: TaskId, reason: String },
}

/// Host capability that performs context switches for one processor.
pub trait TaskSwitcher: Send + 'static {
    /// Start (or resume) `task`.  Must return promptly; the end of the slice is
    /// reported through `relinquish`.
    fn switch_to(&mut self, task: TaskId, relinquish: Relinquisher) -> Result<(), SwitchError>;

    /// Take the processor away from `task` immediately.
    fn preempt(&mut self, task: TaskId);
}

/// One-slice handle the host uses to give the processor back.
#[derive(Debug, Clone)]
pub struct Relinquisher {
    tx: mpsc::UnboundedSender<Relinquish>,
    task: TaskId,
    slice: u64,
}

impl Relinquisher {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Relinquish>, task: TaskId, slice: u64) -> Self {
        Self { tx, task, slice }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn yielded(&self) -> bool {
        self.send(RelinquishKind::Yielded)
    }

    pub fn blocked(&self) -> bool {
        self.send(RelinquishKind::Blocked)
    }

    pub fn completed(&self) -> bool {
        self.send(RelinquishKind::Completed)
    }

    pub fn exited(&self) -> bool {
        self.send(RelinquishKind::Exited)
    }

    /// Returns `false` if the executor is gone.
    pub fn send(&self, kind: RelinquishKind) -> bool {
        let ev = Relinquish {
            task: self.task,
            slice: self.slice,
            kind,
        };
        match self.tx.send(ev) {
            Ok(()) => true,
            Err(_) => {
                debug!(task = %self.task, kind = ?kind, "executor gone, relinquish dropped");
                false
            }
        }
    }
}
