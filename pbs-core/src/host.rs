/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lifecycle collaborators: starting a proxy executor for a processor.
//!
//! Two spawners cover the two ways PBS is hosted:
//!
//! | Spawner | Executor runs on | Used by |
//! |---|---|---|
//! | [`ThreadSpawner`] | its own OS thread `pbs-proxy/<cpu>` with a current-thread tokio runtime | `pbsd` |
//! | [`RuntimeSpawner`] | a task on an existing tokio runtime | tests, embedding |
//!
//! A start failure is fatal for that processor only and is returned to the
//! activation caller as [`ExecutorError::StartFailure`].

use std::future::Future;
use std::pin::Pin;
use std::thread;

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::task::CpuId;

/// The executor's `run_loop()` future, type-erased.
pub type ExecutorFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The processor-bound loop could not be created.
    #[error("failed to start proxy executor on cpu {cpu}: {reason}")]
    StartFailure { cpu: CpuId, reason: String },

    /// `activate` was called before `attach_run_queue`.
    #[error("no run queue attached to cpu {0}")]
    NoRunQueue(CpuId),
}

/// Handle to a running executor.
#[derive(Debug)]
pub enum ExecutorJoin {
    Thread(thread::JoinHandle<()>),
    Task(JoinHandle<()>),
}

impl ExecutorJoin {
    /// Wait for the executor to finish.
    pub async fn join(self, cpu: CpuId) {
        let panicked = match self {
            ExecutorJoin::Thread(handle) => {
                match tokio::task::spawn_blocking(move || handle.join()).await {
                    Ok(res) => res.is_err(),
                    Err(_) => true,
                }
            }
            ExecutorJoin::Task(handle) => handle.await.is_err(),
        };
        if panicked {
            error!(cpu, "proxy executor terminated abnormally");
        } else {
            debug!(cpu, "proxy executor joined");
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            ExecutorJoin::Thread(h) => h.is_finished(),
            ExecutorJoin::Task(h) => h.is_finished(),
        }
    }
}

/// "Create a background executor bound to a processor."
pub trait ExecutorSpawner: Send + Sync {
    fn spawn_bound(&self, cpu: CpuId, executor: ExecutorFuture)
        -> Result<ExecutorJoin, ExecutorError>;
}

// ── ThreadSpawner ─────────────────────────────────────────────────────────────

/// One OS thread per processor, each driving a current-thread runtime.
///
/// `spawn_bound` never waits on the new thread, so it may be called from
/// async code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl ExecutorSpawner for ThreadSpawner {
    fn spawn_bound(
        &self,
        cpu: CpuId,
        executor: ExecutorFuture,
    ) -> Result<ExecutorJoin, ExecutorError> {
        let rt = ProxyRuntime::build(cpu)?;

        let handle = thread::Builder::new()
            .name(format!("pbs-proxy/{cpu}"))
            .spawn(move || rt.block_on(executor))
            .map_err(|e| ExecutorError::StartFailure {
                cpu,
                reason: format!("thread: {e}"),
            })?;

        debug!(cpu, "proxy thread spawned");
        Ok(ExecutorJoin::Thread(handle))
    }
}

/// Current-thread runtime that shuts down without blocking whichever thread
/// drops it, including a caller inside another runtime when the proxy
/// thread could not be spawned.
struct ProxyRuntime(Option<Runtime>);

impl ProxyRuntime {
    fn build(cpu: CpuId) -> Result<Self, ExecutorError> {
        Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|rt| Self(Some(rt)))
            .map_err(|e| ExecutorError::StartFailure {
                cpu,
                reason: format!("runtime: {e}"),
            })
    }

    fn block_on(&self, executor: ExecutorFuture) {
        if let Some(rt) = &self.0 {
            rt.block_on(executor);
        }
    }
}

impl Drop for ProxyRuntime {
    fn drop(&mut self) {
        if let Some(rt) = self.0.take() {
            rt.shutdown_background();
        }
    }
}

// ── RuntimeSpawner ────────────────────────────────────────────────────────────

/// Spawns executors as tasks on an existing runtime.
#[derive(Debug, Clone)]
pub struct RuntimeSpawner {
    handle: Handle,
}

impl RuntimeSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawner for the runtime of the calling task.
    ///
    /// # Errors
    /// [`ExecutorError::StartFailure`] if called outside a tokio runtime.
    pub fn current(cpu: CpuId) -> Result<Self, ExecutorError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ExecutorError::StartFailure {
                cpu,
                reason: e.to_string(),
            })
    }
}

impl ExecutorSpawner for RuntimeSpawner {
    fn spawn_bound(
        &self,
        cpu: CpuId,
        executor: ExecutorFuture,
    ) -> Result<ExecutorJoin, ExecutorError> {
        debug!(cpu, "proxy task spawned");
        Ok(ExecutorJoin::Task(self.handle.spawn(executor)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
