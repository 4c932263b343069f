/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   cpus: [0, 1]
//!   tick_interval_us: 1000
//!   overrun_policy: keep_deadline   # or: demote
//!   policy: edf
//! control:
//!   listen_addr: "127.0.0.1:7878"
//! ```
//!
//! Every field is optional; missing values fall back to
//! [`SchedConfig::default`].

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::scheduler::{OverrunPolicy, PolicyKind};
use crate::task::CpuId;

pub const DEFAULT_TICK_INTERVAL_US: u64 = 1_000;
/// Resolution of the tokio timer driving the budget tick; tick intervals
/// must be whole multiples of it.
pub const TIMER_RESOLUTION_US: u64 = 1_000;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7878";

// ── Private YAML deserialization types ────────────────────────────────────────

/// Maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedConfigFile {
    #[serde(default)]
    scheduler: SchedulerSection,
    #[serde(default)]
    control: ControlSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedulerSection {
    cpus: Option<Vec<CpuId>>,
    tick_interval_us: Option<u64>,
    overrun_policy: Option<OverrunPolicy>,
    policy: Option<PolicyKind>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ControlSection {
    listen_addr: Option<String>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Settings consumed by [`SchedulerRuntime`](crate::runtime::SchedulerRuntime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Processors to attach and activate.
    pub cpus: Vec<CpuId>,
    /// Budget-check period of every proxy executor, in whole milliseconds.
    pub tick_interval_us: u64,
    pub overrun_policy: OverrunPolicy,
    pub policy: PolicyKind,
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(self.tick_interval_us)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cpus: vec![0],
            tick_interval_us: DEFAULT_TICK_INTERVAL_US,
            overrun_policy: OverrunPolicy::default(),
            policy: PolicyKind::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSettings {
    pub listen_addr: String,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedConfig {
    pub scheduler: SchedulerSettings,
    pub control: ControlSettings,
}

impl SchedConfig {
    /// Parse and validate `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, or the values fail [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let cfg = Self::from_yaml(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?;

        info!(
            cpus = ?cfg.scheduler.cpus,
            tick_interval_us = cfg.scheduler.tick_interval_us,
            overrun_policy = %cfg.scheduler.overrun_policy,
            listen_addr = %cfg.control.listen_addr,
            "configuration loaded"
        );
        Ok(cfg)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping.
        let file: SchedConfigFile = if content.trim().is_empty() {
            SchedConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        let defaults = SchedConfig::default();
        let cfg = SchedConfig {
            scheduler: SchedulerSettings {
                cpus: file.scheduler.cpus.unwrap_or(defaults.scheduler.cpus),
                tick_interval_us: file
                    .scheduler
                    .tick_interval_us
                    .unwrap_or(defaults.scheduler.tick_interval_us),
                overrun_policy: file
                    .scheduler
                    .overrun_policy
                    .unwrap_or(defaults.scheduler.overrun_policy),
                policy: file.scheduler.policy.unwrap_or(defaults.scheduler.policy),
            },
            control: ControlSettings {
                listen_addr: file
                    .control
                    .listen_addr
                    .unwrap_or(defaults.control.listen_addr),
            },
        };

        cfg.validate()?;
        debug!(?cfg, "configuration parsed");
        Ok(cfg)
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.cpus.is_empty() {
            bail!("scheduler.cpus must list at least one processor");
        }
        let tick = self.scheduler.tick_interval_us;
        if tick == 0 {
            bail!("scheduler.tick_interval_us must be greater than zero");
        }
        if tick % TIMER_RESOLUTION_US != 0 {
            bail!(
                "scheduler.tick_interval_us must be a multiple of {TIMER_RESOLUTION_US}, got {tick}"
            );
        }
        let mut seen = self.scheduler.cpus.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.scheduler.cpus.len() {
            bail!("scheduler.cpus contains duplicates: {:?}", self.scheduler.cpus);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
scheduler:
  cpus: [2, 3]
  tick_interval_us: 2000
  overrun_policy: demote
  policy: edf
control:
  listen_addr: "0.0.0.0:9000"
"#;
        let f = yaml_tempfile(yaml);
        let cfg = SchedConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.scheduler.cpus, vec![2, 3]);
        assert_eq!(cfg.scheduler.tick_interval(), Duration::from_millis(2));
        assert_eq!(cfg.scheduler.overrun_policy, OverrunPolicy::Demote);
        assert_eq!(cfg.scheduler.policy, PolicyKind::Edf);
        assert_eq!(cfg.control.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let f = yaml_tempfile("scheduler:\n  cpus: [1]\n");
        let cfg = SchedConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.scheduler.cpus, vec![1]);
        assert_eq!(cfg.scheduler.tick_interval_us, DEFAULT_TICK_INTERVAL_US);
        assert_eq!(cfg.scheduler.overrun_policy, OverrunPolicy::KeepDeadline);
        assert_eq!(cfg.control.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn empty_file_is_default_config() {
        let f = yaml_tempfile("");
        let cfg = SchedConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg, SchedConfig::default());
    }

    #[test]
    fn zero_tick_is_rejected() {
        let err = SchedConfig::from_yaml("scheduler:\n  tick_interval_us: 0\n").unwrap_err();
        assert!(err.to_string().contains("tick_interval_us"));
    }

    #[test]
    fn sub_millisecond_tick_is_rejected() {
        for tick in [100, 500, 1_500] {
            let yaml = format!("scheduler:\n  tick_interval_us: {tick}\n");
            let err = SchedConfig::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("multiple of 1000"), "tick {tick}: {err}");
        }
        let cfg = SchedConfig::from_yaml("scheduler:\n  tick_interval_us: 3000\n").unwrap();
        assert_eq!(cfg.scheduler.tick_interval(), Duration::from_millis(3));
    }

    #[test]
    fn empty_cpu_list_is_rejected() {
        assert!(SchedConfig::from_yaml("scheduler:\n  cpus: []\n").is_err());
    }

    #[test]
    fn duplicate_cpus_are_rejected() {
        assert!(SchedConfig::from_yaml("scheduler:\n  cpus: [0, 0]\n").is_err());
    }

    #[test]
    fn unknown_overrun_policy_is_rejected() {
        assert!(SchedConfig::from_yaml("scheduler:\n  overrun_policy: reset\n").is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(SchedConfig::from_yaml("schedular:\n  cpus: [0]\n").is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = SchedConfig::load_from_file(Path::new("/nonexistent/path/pbs.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(SchedConfig::load_from_file(f.path()).is_err());
    }
}
