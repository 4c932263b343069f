/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler time base.
//!
//! Plans, run-queue keys and lateness records are all expressed in
//! microseconds on one [`Clock`].

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

pub trait Clock: Send + Sync + 'static {
    /// Microseconds since the clock's origin.
    fn now_us(&self) -> u64;
}

/// Monotonic clock backed by `tokio::time`, so it follows a paused test
/// runtime as well as wall time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven clock for policy tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: u64) -> u64 {
        self.now.fetch_add(delta_us, Ordering::SeqCst) + delta_us
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
