/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-processor run queue ordered earliest-deadline-first.
//!
//! Every ready task owns exactly one [`QueueKey`]:
//!
//! | Field | Order | Purpose |
//! |---|---|---|
//! | `tier` | `Planned { deadline }` ascending, then `Unplanned` | EDF, unplanned last |
//! | `enqueue_us` | ascending | FIFO among equal deadlines |
//! | `seq` | ascending | FIFO within the same microsecond |
//! | `task` | ascending | total order (never reached in practice) |
//!
//! Keys live in a `BTreeSet` (O(log n) insert / remove / min) with a
//! `HashMap` index from task to key so that dequeue and rekey do not scan.
//!
//! The queue is deliberately not synchronized.  The owning policy wraps it in
//! a single mutex, which is the one synchronization point for a processor.

use std::collections::{BTreeSet, HashMap};

use crate::task::TaskId;

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Priority tier of an entry.  Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Task has a plan; earlier deadline sorts first.
    Planned { deadline_us: u64 },
    /// No plan (or demoted after a budget overrun); after every planned task.
    Unplanned,
}

impl Tier {
    pub fn from_deadline(deadline_us: Option<u64>) -> Self {
        match deadline_us {
            Some(deadline_us) => Tier::Planned { deadline_us },
            None => Tier::Unplanned,
        }
    }

    pub fn deadline_us(&self) -> Option<u64> {
        match self {
            Tier::Planned { deadline_us } => Some(*deadline_us),
            Tier::Unplanned => None,
        }
    }
}

/// Cached ordering key of a run-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    tier: Tier,
    enqueue_us: u64,
    seq: u64,
    task: TaskId,
}

/// Read-only view of one queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunQueueEntry {
    pub task: TaskId,
    pub enqueue_us: u64,
    /// Deadline the entry is currently ordered by (`None` = unplanned tier).
    pub deadline_us: Option<u64>,
}

impl From<&QueueKey> for RunQueueEntry {
    fn from(k: &QueueKey) -> Self {
        RunQueueEntry {
            task: k.task,
            enqueue_us: k.enqueue_us,
            deadline_us: k.tier.deadline_us(),
        }
    }
}

/// Result of [`RunQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new entry was inserted.
    Queued,
    /// The task was already queued; nothing changed.
    AlreadyQueued,
    /// The task is running right now; the wake-up is applied when it
    /// relinquishes the processor (policy-level outcome).
    Deferred,
}

// ── RunQueue ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RunQueue {
    order: BTreeSet<QueueKey>,
    index: HashMap<TaskId, QueueKey>,
    next_seq: u64,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `task` ordered by `deadline_us` (`None` = unplanned tier).
    ///
    /// Enqueueing a task that is already present is a no-op and reports
    /// [`EnqueueOutcome::AlreadyQueued`]; the existing entry keeps its place.
    pub fn enqueue(
        &mut self,
        task: TaskId,
        deadline_us: Option<u64>,
        now_us: u64,
    ) -> EnqueueOutcome {
        if self.index.contains_key(&task) {
            return EnqueueOutcome::AlreadyQueued;
        }
        let key = QueueKey {
            tier: Tier::from_deadline(deadline_us),
            enqueue_us: now_us,
            seq: self.bump_seq(),
            task,
        };
        self.order.insert(key);
        self.index.insert(task, key);
        EnqueueOutcome::Queued
    }

    /// Remove `task`.  Returns `false` (and does nothing) if it was absent.
    pub fn dequeue(&mut self, task: TaskId) -> bool {
        match self.index.remove(&task) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Highest-priority task without removing it.
    pub fn peek_min(&self) -> Option<TaskId> {
        self.order.first().map(|k| k.task)
    }

    /// Highest-priority entry without removing it.
    pub fn peek_entry(&self) -> Option<RunQueueEntry> {
        self.order.first().map(RunQueueEntry::from)
    }

    /// Remove and return the highest-priority task.
    pub fn pop_min(&mut self) -> Option<TaskId> {
        let key = self.order.pop_first()?;
        self.index.remove(&key.task);
        Some(key.task)
    }

    /// Re-order an enqueued task under a new deadline.
    ///
    /// The entry keeps its enqueue time and sequence number, so resubmitting a
    /// plan never moves a task behind peers that became ready after it.
    /// Returns `false` if the task is not queued.
    pub fn rekey(&mut self, task: TaskId, deadline_us: Option<u64>) -> bool {
        let Some(old) = self.index.get(&task).copied() else {
            return false;
        };
        let tier = Tier::from_deadline(deadline_us);
        if old.tier == tier {
            return true;
        }
        let new = QueueKey { tier, ..old };
        self.order.remove(&old);
        self.order.insert(new);
        self.index.insert(task, new);
        true
    }

    /// Deadline the entry for `task` is currently ordered by.
    ///
    /// `None` if the task is not queued, `Some(None)` if it is queued in the
    /// unplanned tier.
    pub fn cached_deadline(&self, task: TaskId) -> Option<Option<u64>> {
        self.index.get(&task).map(|k| k.tier.deadline_us())
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.index.contains_key(&task)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in pick order.
    pub fn entries(&self) -> Vec<RunQueueEntry> {
        self.order.iter().map(RunQueueEntry::from).collect()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
