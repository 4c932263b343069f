/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! PBS – plan-based EDF CPU scheduler
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── task.rs         – task identity, states, relinquish events
//! ├── plan/           – validated plans and the plan store
//! ├── lateness.rs     – signed lateness records per task
//! ├── runqueue.rs     – per-processor deadline-ordered queue
//! ├── clock.rs        – scheduler time source (tokio / manual)
//! ├── scheduler/      – SchedClass trait, EDF policy, density check
//! ├── proxy/          – per-processor proxy executor + TaskSwitcher seam
//! ├── host.rs         – executor spawners (OS thread / tokio task)
//! ├── runtime.rs      – processor lifecycle and task bindings
//! ├── control/        – control interface, line codec, TCP server
//! ├── sim.rs          – simulated host used by pbsd and tests
//! └── config/         – YAML configuration
//! ```

pub mod clock;
pub mod config;
pub mod control;
pub mod host;
pub mod lateness;
pub mod plan;
pub mod proxy;
pub mod runqueue;
pub mod runtime;
pub mod scheduler;
pub mod sim;
pub mod task;
