/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! EDF feasibility analysis over submitted plans.
//!
//! # Status: warning only
//!
//! The density of the plans bound to a processor is **computed and logged**
//! after every plan change.  Plans are never rejected because of it; the
//! practical gates are plan validation and per-dispatch budget enforcement.
//!
//! # Theory
//! On one processor, preemptive EDF meets every deadline of a set of jobs
//! whose windows `[a_i, d_i)` all overlap if:
//!
//! $$\Delta = \sum_{i=1}^{n} \frac{C_i}{d_i - a_i} \leq 1$$
//!
//! where `C_i` is the budget.  For independent windows the density test is
//! sufficient but pessimistic; above `1.0` the plan set **may or may not** be
//! feasible, depending on how far the windows actually overlap.

use crate::plan::Plan;

/// Density above which a plan set is flagged.
pub const EDF_DENSITY_BOUND: f64 = 1.0;

/// Total density `Σ budget / window` of `plans`.
pub fn total_density(plans: &[&Plan]) -> f64 {
    plans.iter().map(|p| p.density()).sum()
}

/// Returns `None` if the plans are provably EDF-feasible by the density test,
/// or `Some(total_density)` if the bound is exceeded.
pub fn check_edf_density(plans: &[&Plan]) -> Option<f64> {
    if plans.is_empty() {
        return None;
    }
    let total = total_density(plans);
    if total > EDF_DENSITY_BOUND {
        Some(total)
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
