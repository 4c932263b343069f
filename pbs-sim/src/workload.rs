/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Workload description and the end-of-run summary.
//!
//! ```yaml
//! tasks:
//!   - id: 1
//!     cpu: 0
//!     arrival_offset_us: 0
//!     deadline_offset_us: 10000
//!     budget_us: 2000
//!     work_us: 1500
//! ```
//!
//! Offsets are relative to the daemon clock sampled (`NOW`) just before the
//! plans are submitted.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use pbs_core::control::{LatenessReport, PlanBody, Request};
use pbs_core::task::{CpuId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub id: u64,
    #[serde(default)]
    pub cpu: CpuId,
    #[serde(default)]
    pub arrival_offset_us: u64,
    pub deadline_offset_us: u64,
    pub budget_us: u64,
    pub work_us: u64,
}

impl TaskSpec {
    pub fn task(&self) -> TaskId {
        TaskId(self.id)
    }

    pub fn plan_request(&self, base_us: u64) -> Request {
        Request::Plan(PlanBody {
            task: self.task(),
            arrival_us: base_us.saturating_add(self.arrival_offset_us),
            deadline_us: base_us.saturating_add(self.deadline_offset_us),
            budget_us: self.budget_us,
        })
    }

    pub fn launch_request(&self) -> Request {
        Request::Launch {
            task: self.task(),
            cpu: self.cpu,
            work_us: self.work_us,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    pub tasks: Vec<TaskSpec>,
}

impl Workload {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading workload from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open workload file: {}", path.display()))?;
        let workload: Workload = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;
        workload.validate()?;

        for t in &workload.tasks {
            debug!(
                task = t.id,
                cpu = t.cpu,
                deadline_offset_us = t.deadline_offset_us,
                budget_us = t.budget_us,
                work_us = t.work_us,
                "workload task"
            );
        }
        Ok(workload)
    }

    /// Plan windows are validated by the daemon; only the shape is checked
    /// here.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            bail!("workload contains no tasks");
        }
        let mut seen = HashSet::new();
        for t in &self.tasks {
            if !seen.insert(t.id) {
                bail!("task id {} appears more than once", t.id);
            }
        }
        Ok(())
    }
}

// ── Summary ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub pending: Vec<TaskId>,
    pub missed: Vec<TaskId>,
    /// Largest observed lateness; negative when every job finished early.
    pub worst_lateness_us: Option<i64>,
}

impl Summary {
    pub fn from_reports(workload: &Workload, reports: &[Option<LatenessReport>]) -> Self {
        let mut summary = Summary::default();
        for (spec, report) in workload.tasks.iter().zip(reports) {
            match report {
                Some(r) => {
                    summary.completed += 1;
                    if r.missed_deadline() {
                        summary.missed.push(spec.task());
                    }
                    summary.worst_lateness_us = Some(
                        summary
                            .worst_lateness_us
                            .map_or(r.lateness_us, |w| w.max(r.lateness_us)),
                    );
                }
                None => summary.pending.push(spec.task()),
            }
        }
        summary
    }

    pub fn all_completed(&self) -> bool {
        self.pending.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn report(task: u64, lateness_us: i64) -> LatenessReport {
        LatenessReport {
            task: TaskId(task),
            lateness_us,
            completion_us: 0,
            deadline_us: 0,
            completions: 1,
            deadline_misses: u64::from(lateness_us > 0),
        }
    }

    #[test]
    fn load_workload_with_defaults() {
        let yaml = r#"
tasks:
  - id: 1
    deadline_offset_us: 5000
    budget_us: 1000
    work_us: 800
  - id: 2
    cpu: 1
    arrival_offset_us: 200
    deadline_offset_us: 9000
    budget_us: 2000
    work_us: 1500
"#;
        let f = yaml_tempfile(yaml);
        let w = Workload::load_from_file(f.path()).unwrap();

        assert_eq!(w.tasks.len(), 2);
        assert_eq!(w.tasks[0].cpu, 0);
        assert_eq!(w.tasks[0].arrival_offset_us, 0);
        assert_eq!(w.tasks[1].cpu, 1);
    }

    #[test]
    fn requests_are_offset_from_base() {
        let spec = TaskSpec {
            id: 4,
            cpu: 2,
            arrival_offset_us: 100,
            deadline_offset_us: 900,
            budget_us: 300,
            work_us: 250,
        };
        assert_eq!(spec.plan_request(10_000).to_string(), "PLAN 4 10100 10900 300");
        assert_eq!(spec.launch_request().to_string(), "LAUNCH 4 2 250");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let yaml = r#"
tasks:
  - { id: 1, deadline_offset_us: 10, budget_us: 1, work_us: 1 }
  - { id: 1, deadline_offset_us: 20, budget_us: 1, work_us: 1 }
"#;
        let f = yaml_tempfile(yaml);
        assert!(Workload::load_from_file(f.path()).is_err());
    }

    #[test]
    fn empty_workload_is_rejected() {
        let f = yaml_tempfile("tasks: []\n");
        assert!(Workload::load_from_file(f.path()).is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let f = yaml_tempfile("tasks:\n  - { id: 1, budget_us: 1, work_us: 1 }\n");
        assert!(Workload::load_from_file(f.path()).is_err());
    }

    #[test]
    fn summary_counts_misses_and_pending() {
        let yaml = r#"
tasks:
  - { id: 1, deadline_offset_us: 10, budget_us: 1, work_us: 1 }
  - { id: 2, deadline_offset_us: 10, budget_us: 1, work_us: 1 }
  - { id: 3, deadline_offset_us: 10, budget_us: 1, work_us: 1 }
"#;
        let w: Workload = serde_yaml::from_str(yaml).unwrap();
        let s = Summary::from_reports(&w, &[Some(report(1, -40)), Some(report(2, 15)), None]);

        assert_eq!(s.completed, 2);
        assert_eq!(s.missed, vec![TaskId(2)]);
        assert_eq!(s.pending, vec![TaskId(3)]);
        assert_eq!(s.worst_lateness_us, Some(15));
        assert!(!s.all_completed());
    }
}
