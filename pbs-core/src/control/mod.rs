/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Control Interface: the user-facing surface for plans and lateness.
//!
//! | Operation | Effect |
//! |---|---|
//! | [`write_plan`](ControlInterface::write_plan) | parse `"<task> <arrival_us> <deadline_us> <budget_us>"`, validate, store |
//! | [`read_lateness`](ControlInterface::read_lateness) | latest lateness record, empty for unknown tasks; an exited task's record is read once more, then dropped |
//! | [`handle`](ControlInterface::handle) | one [`Request`] of the line protocol |
//!
//! Rejected input never changes scheduler state.

pub mod codec;
pub mod server;

pub use codec::{CodecError, CpuLine, LatenessReport, PlanBody, Request, Response};
pub use server::ControlServer;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::lateness::LatenessRecord;
use crate::plan::PlanError;
use crate::runtime::SchedulerRuntime;
use crate::scheduler::SchedError;
use crate::task::{CpuId, TaskId};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed request: {0}")]
    Malformed(#[from] CodecError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Sched(#[from] SchedError),

    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    #[error("launch of task {task} failed: {reason}")]
    Launch { task: TaskId, reason: String },
}

/// Host hook that creates tasks on behalf of `LAUNCH` requests.
pub trait TaskLauncher: Send + Sync {
    /// Create `task` on `cpu` with `work_us` of CPU work and report it ready.
    fn launch(&self, task: TaskId, cpu: CpuId, work_us: u64) -> anyhow::Result<()>;

    /// Tear `task` down on the host side.
    fn exit(&self, _task: TaskId) {}
}

pub struct ControlInterface {
    runtime: Arc<SchedulerRuntime>,
    launcher: Option<Arc<dyn TaskLauncher>>,
}

impl ControlInterface {
    pub fn new(runtime: Arc<SchedulerRuntime>) -> Self {
        Self {
            runtime,
            launcher: None,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn TaskLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn runtime(&self) -> &Arc<SchedulerRuntime> {
        &self.runtime
    }

    /// Device-write style plan submission.  Returns the number of bytes
    /// consumed on success.
    ///
    /// # Errors
    /// * [`ControlError::Malformed`] for non-UTF-8 or badly shaped input.
    /// * [`ControlError::Plan`] if the plan fails validation.
    pub fn write_plan(&self, buf: &[u8]) -> Result<usize, ControlError> {
        let text = std::str::from_utf8(buf).map_err(|_| CodecError::NotUtf8)?;
        let body: PlanBody = text.parse()?;
        self.runtime
            .submit_plan(body.task, body.arrival_us, body.deadline_us, body.budget_us)?;
        Ok(buf.len())
    }

    pub fn read_lateness(&self, task: TaskId) -> Option<LatenessRecord> {
        self.runtime.lateness(task)
    }

    /// Execute one request.  Failures are rendered as [`Response::Err`].
    pub fn handle(&self, req: Request) -> Response {
        debug!(request = %req, "control request");
        match self.execute(req) {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "control request failed");
                Response::Err(err.to_string())
            }
        }
    }

    pub fn handle_line(&self, line: &str) -> Response {
        match line.parse::<Request>() {
            Ok(req) => self.handle(req),
            Err(err) => {
                warn!(line, error = %err, "unparseable control request");
                Response::Err(ControlError::from(err).to_string())
            }
        }
    }

    fn execute(&self, req: Request) -> Result<Response, ControlError> {
        match req {
            Request::Plan(body) => {
                self.runtime.submit_plan(
                    body.task,
                    body.arrival_us,
                    body.deadline_us,
                    body.budget_us,
                )?;
                Ok(Response::Ok)
            }
            Request::Lateness(task) => Ok(self
                .read_lateness(task)
                .map(|r| Response::Lateness(LatenessReport::from(&r)))
                .unwrap_or(Response::None)),
            Request::Launch { task, cpu, work_us } => {
                let launcher = self
                    .launcher
                    .as_ref()
                    .ok_or(ControlError::Unsupported("LAUNCH"))?;
                launcher
                    .launch(task, cpu, work_us)
                    .map_err(|e| ControlError::Launch {
                        task,
                        reason: format!("{e:#}"),
                    })?;
                Ok(Response::Ok)
            }
            Request::Exit(task) => {
                if let Some(launcher) = &self.launcher {
                    launcher.exit(task);
                }
                self.runtime.task_exited(task);
                Ok(Response::Ok)
            }
            Request::Now => Ok(Response::Now(self.runtime.now_us())),
            Request::Status => Ok(Response::Status(
                self.runtime.status().iter().map(CpuLine::from).collect(),
            )),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
