/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lateness records: how far past (or ahead of) its deadline each task
//! finished its most recent job.
//!
//! Written by the owning processor right after a completion; read by the
//! control interface as a copied snapshot so a reader never holds the lock
//! for longer than a map lookup.
//!
//! A record outlives its task only until someone reads it: exit marks it
//! finalized, the next [`read`](LatenessTable::read) hands it out and drops
//! it.  A fresh plan for a reused task id also drops a finalized record.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::plan::Plan;
use crate::task::TaskId;

/// Most recent completion of a planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatenessRecord {
    pub task: TaskId,
    /// Scheduler-clock time of the last completion.
    pub completion_us: u64,
    /// Deadline that completion was measured against.
    pub deadline_us: u64,
    /// `completion − deadline`; negative means the job finished early.
    pub lateness_us: i64,
    /// `completion − arrival`.
    pub response_us: i64,
    /// Number of completions recorded so far.
    pub completions: u64,
    /// Number of those completions that finished after their deadline.
    pub deadline_misses: u64,
    /// Set once the task has exited; the record is kept for a final read.
    pub finalized: bool,
}

impl LatenessRecord {
    pub fn missed_deadline(&self) -> bool {
        self.lateness_us > 0
    }
}

/// Signed `a − b` for clock values, saturating at the `i64` range.
pub fn signed_diff(a: u64, b: u64) -> i64 {
    let d = a as i128 - b as i128;
    d.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// ── LatenessTable ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LatenessTable {
    records: RwLock<HashMap<TaskId, LatenessRecord>>,
}

impl LatenessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion of `plan.task` at `now_us` and return the updated
    /// record.
    pub fn record_completion(&self, plan: &Plan, now_us: u64) -> LatenessRecord {
        let lateness_us = signed_diff(now_us, plan.deadline_us);
        let response_us = signed_diff(now_us, plan.arrival_us);
        let missed = lateness_us > 0;

        let mut records = self.records.write();
        let record = records
            .entry(plan.task)
            .and_modify(|r| {
                r.completion_us = now_us;
                r.deadline_us = plan.deadline_us;
                r.lateness_us = lateness_us;
                r.response_us = response_us;
                r.completions += 1;
                r.deadline_misses += missed as u64;
                r.finalized = false;
            })
            .or_insert(LatenessRecord {
                task: plan.task,
                completion_us: now_us,
                deadline_us: plan.deadline_us,
                lateness_us,
                response_us,
                completions: 1,
                deadline_misses: missed as u64,
                finalized: false,
            });
        let snapshot = *record;
        drop(records);

        if missed {
            warn!(
                task = %plan.task,
                lateness_us,
                deadline_us = plan.deadline_us,
                "deadline missed"
            );
        } else {
            debug!(task = %plan.task, lateness_us, "completed before deadline");
        }
        snapshot
    }

    /// Snapshot of the record for `task`; `None` until its first completion.
    /// Never drops anything.
    pub fn get(&self, task: TaskId) -> Option<LatenessRecord> {
        self.records.read().get(&task).copied()
    }

    /// Snapshot for a reader outside the scheduler.  A finalized record is
    /// returned one last time and removed.
    pub fn read(&self, task: TaskId) -> Option<LatenessRecord> {
        let record = self.get(task)?;
        if record.finalized {
            self.discard_finalized(task);
        }
        Some(record)
    }

    /// Mark the record of an exited task as final.
    pub fn finalize(&self, task: TaskId) {
        if let Some(r) = self.records.write().get_mut(&task) {
            r.finalized = true;
        }
    }

    /// Drop the record of `task` if its task has exited.
    pub fn discard_finalized(&self, task: TaskId) -> bool {
        let mut records = self.records.write();
        if records.get(&task).is_some_and(|r| r.finalized) {
            records.remove(&task);
            debug!(task = %task, "finalized lateness record dropped");
            true
        } else {
            false
        }
    }

    /// Number of records held, finalized ones included.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
