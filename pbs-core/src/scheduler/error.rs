/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the scheduler core.
//!
//! Two layers, like the rest of PBS:
//!
//! * per-task problems ([`SchedError`]) are handled at the runtime / policy
//!   boundary and never stop a processor's executor;
//! * per-processor problems ([`ExecutorError`](crate::host::ExecutorError))
//!   go back to whoever activated that processor.
//!
//! | Variant | Raised by | Handling |
//! |---|---|---|
//! | `NoRunQueue` | runtime | returned to caller |
//! | `UnboundTask` | runtime | returned to caller |
//! | `WrongProcessor` | runtime | returned to caller |
//! | `QueueCorruption` | policy (`pick_next`) | logged, entry rekeyed, never returned |
//! | `Plan` | runtime (`submit_plan`) | returned to caller |

use thiserror::Error;

use crate::plan::PlanError;
use crate::task::{CpuId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    /// No run queue has been attached to the processor.
    #[error("no run queue attached to cpu {0}")]
    NoRunQueue(CpuId),

    /// The task was never bound to a processor.
    #[error("task {0} is not bound to any processor")]
    UnboundTask(TaskId),

    /// A task may only ever sit in one processor's run queue.
    #[error("task {task} is bound to cpu {bound}, not cpu {requested}")]
    WrongProcessor {
        task: TaskId,
        bound: CpuId,
        requested: CpuId,
    },

    /// A run-queue entry was ordered by a deadline that no longer matches the
    /// plan store.  Internal invariant violation; recovered by rekeying.
    #[error("run queue entry for task {task} cached deadline {cached:?} but its plan says {actual:?}")]
    QueueCorruption {
        task: TaskId,
        cached: Option<u64>,
        actual: Option<u64>,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}
