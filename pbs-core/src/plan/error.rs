/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Plan validation errors.
//!
//! A rejected submission never changes any scheduler state; the error goes
//! straight back to the control-interface caller.

use thiserror::Error;

use crate::task::TaskId;

/// Why a submitted plan was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// `deadline_us <= arrival_us`: the plan leaves no time to run.
    #[error("task {task}: deadline {deadline_us}µs is not after arrival {arrival_us}µs")]
    InvalidWindow {
        task: TaskId,
        arrival_us: u64,
        deadline_us: u64,
    },

    /// A plan must grant some CPU time.
    #[error("task {task}: budget must be greater than zero")]
    ZeroBudget { task: TaskId },
}
