/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Line protocol spoken by the control server.
//!
//! One request per line, whitespace separated, keyword first:
//!
//! | Request | Response |
//! |---|---|
//! | `PLAN <task> <arrival_us> <deadline_us> <budget_us>` | `OK` / `ERR <reason>` |
//! | `LATENESS <task>` | `LATENESS <task> <lateness> <completion> <deadline> <completions> <misses>` / `NONE` |
//! | `LAUNCH <task> <cpu> <work_us>` | `OK` / `ERR <reason>` |
//! | `EXIT <task>` | `OK` |
//! | `NOW` | `NOW <us>` |
//! | `STATUS` | `CPU …` per processor, then `END` |
//!
//! Keywords are case-insensitive on input and always upper-case on output.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::lateness::LatenessRecord;
use crate::runtime::CpuStatus;
use crate::task::{CpuId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty request")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command} expects {expected} argument(s), got {got}")]
    Arity {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid {field} '{value}'")]
    BadField { field: &'static str, value: String },

    #[error("request is not valid UTF-8")]
    NotUtf8,
}

fn field<T: FromStr>(name: &'static str, value: &str) -> Result<T, CodecError> {
    value.parse().map_err(|_| CodecError::BadField {
        field: name,
        value: value.to_string(),
    })
}

fn expect_args(command: &'static str, args: &[&str], expected: usize) -> Result<(), CodecError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CodecError::Arity {
            command,
            expected,
            got: args.len(),
        })
    }
}

// ── Plan body ─────────────────────────────────────────────────────────────────

/// The four numbers of a plan submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanBody {
    pub task: TaskId,
    pub arrival_us: u64,
    pub deadline_us: u64,
    pub budget_us: u64,
}

impl PlanBody {
    fn from_args(args: &[&str]) -> Result<Self, CodecError> {
        expect_args("PLAN", args, 4)?;
        Ok(Self {
            task: field("task", args[0])?,
            arrival_us: field("arrival", args[1])?,
            deadline_us: field("deadline", args[2])?,
            budget_us: field("budget", args[3])?,
        })
    }
}

impl FromStr for PlanBody {
    type Err = CodecError;

    /// Parses `"<task> <arrival_us> <deadline_us> <budget_us>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let args: Vec<&str> = s.split_whitespace().collect();
        Self::from_args(&args)
    }
}

impl fmt::Display for PlanBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.task, self.arrival_us, self.deadline_us, self.budget_us
        )
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Plan(PlanBody),
    Lateness(TaskId),
    Launch {
        task: TaskId,
        cpu: CpuId,
        work_us: u64,
    },
    Exit(TaskId),
    Now,
    Status,
}

impl FromStr for Request {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let keyword = words.next().ok_or(CodecError::Empty)?;
        let args: Vec<&str> = words.collect();

        match keyword.to_ascii_uppercase().as_str() {
            "PLAN" => PlanBody::from_args(&args).map(Request::Plan),
            "LATENESS" => {
                expect_args("LATENESS", &args, 1)?;
                Ok(Request::Lateness(field("task", args[0])?))
            }
            "LAUNCH" => {
                expect_args("LAUNCH", &args, 3)?;
                Ok(Request::Launch {
                    task: field("task", args[0])?,
                    cpu: field("cpu", args[1])?,
                    work_us: field("work", args[2])?,
                })
            }
            "EXIT" => {
                expect_args("EXIT", &args, 1)?;
                Ok(Request::Exit(field("task", args[0])?))
            }
            "NOW" => {
                expect_args("NOW", &args, 0)?;
                Ok(Request::Now)
            }
            "STATUS" => {
                expect_args("STATUS", &args, 0)?;
                Ok(Request::Status)
            }
            _ => Err(CodecError::UnknownCommand(keyword.to_string())),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Plan(body) => write!(f, "PLAN {body}"),
            Request::Lateness(task) => write!(f, "LATENESS {task}"),
            Request::Launch { task, cpu, work_us } => write!(f, "LAUNCH {task} {cpu} {work_us}"),
            Request::Exit(task) => write!(f, "EXIT {task}"),
            Request::Now => f.write_str("NOW"),
            Request::Status => f.write_str("STATUS"),
        }
    }
}

// ── Lateness report ───────────────────────────────────────────────────────────

/// The part of a [`LatenessRecord`] that travels over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatenessReport {
    pub task: TaskId,
    pub lateness_us: i64,
    pub completion_us: u64,
    pub deadline_us: u64,
    pub completions: u64,
    pub deadline_misses: u64,
}

impl LatenessReport {
    pub fn missed_deadline(&self) -> bool {
        self.lateness_us > 0
    }
}

impl From<&LatenessRecord> for LatenessReport {
    fn from(r: &LatenessRecord) -> Self {
        Self {
            task: r.task,
            lateness_us: r.lateness_us,
            completion_us: r.completion_us,
            deadline_us: r.deadline_us,
            completions: r.completions,
            deadline_misses: r.deadline_misses,
        }
    }
}

// ── Status line ───────────────────────────────────────────────────────────────

/// `CPU <cpu> <policy> <active|idle> running=<task|-> ready=<task@deadline,…|->`
///
/// Unplanned queue entries print their deadline as `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuLine {
    pub cpu: CpuId,
    pub policy: String,
    pub active: bool,
    pub running: Option<TaskId>,
    pub ready: Vec<(TaskId, Option<u64>)>,
}

impl From<&CpuStatus> for CpuLine {
    fn from(s: &CpuStatus) -> Self {
        Self {
            cpu: s.cpu,
            policy: s.policy.to_string(),
            active: s.active,
            running: s.running.map(|r| r.task),
            ready: s.ready.iter().map(|e| (e.task, e.deadline_us)).collect(),
        }
    }
}

impl fmt::Display for CpuLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "idle" };
        write!(f, "CPU {} {} {} running=", self.cpu, self.policy, state)?;
        match self.running {
            Some(t) => write!(f, "{t}")?,
            None => f.write_str("-")?,
        }
        f.write_str(" ready=")?;
        if self.ready.is_empty() {
            return f.write_str("-");
        }
        for (i, (task, deadline)) in self.ready.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match deadline {
                Some(d) => write!(f, "{task}@{d}")?,
                None => write!(f, "{task}@-")?,
            }
        }
        Ok(())
    }
}

impl FromStr for CpuLine {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.first() {
            Some(w) if w.eq_ignore_ascii_case("CPU") => {}
            Some(w) => return Err(CodecError::UnknownCommand(w.to_string())),
            None => return Err(CodecError::Empty),
        }
        expect_args("CPU", &words[1..], 5)?;

        let active = match words[3] {
            "active" => true,
            "idle" => false,
            other => {
                return Err(CodecError::BadField {
                    field: "state",
                    value: other.to_string(),
                })
            }
        };

        let running = match words[4].strip_prefix("running=") {
            Some("-") => None,
            Some(t) => Some(field("running", t)?),
            None => {
                return Err(CodecError::BadField {
                    field: "running",
                    value: words[4].to_string(),
                })
            }
        };

        let ready = match words[5].strip_prefix("ready=") {
            Some("-") => Vec::new(),
            Some(list) => list
                .split(',')
                .map(|item| -> Result<(TaskId, Option<u64>), CodecError> {
                    let (task, deadline) = item.split_once('@').ok_or(CodecError::BadField {
                        field: "ready",
                        value: item.to_string(),
                    })?;
                    let deadline = match deadline {
                        "-" => None,
                        d => Some(field("deadline", d)?),
                    };
                    Ok((field("task", task)?, deadline))
                })
                .collect::<Result<_, CodecError>>()?,
            None => {
                return Err(CodecError::BadField {
                    field: "ready",
                    value: words[5].to_string(),
                })
            }
        };

        Ok(Self {
            cpu: field("cpu", words[1])?,
            policy: words[2].to_string(),
            active,
            running,
            ready,
        })
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Err(String),
    Lateness(LatenessReport),
    None,
    Now(u64),
    /// Rendered as one line per processor followed by `END`.
    Status(Vec<CpuLine>),
}

/// Terminator of a multi-line `STATUS` reply.
pub const STATUS_END: &str = "END";

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            // Reasons are single-line by construction; flatten just in case.
            Response::Err(reason) => write!(f, "ERR {}", reason.replace('\n', " ")),
            Response::Lateness(r) => write!(
                f,
                "LATENESS {} {} {} {} {} {}",
                r.task, r.lateness_us, r.completion_us, r.deadline_us, r.completions, r.deadline_misses
            ),
            Response::None => f.write_str("NONE"),
            Response::Now(us) => write!(f, "NOW {us}"),
            Response::Status(lines) => {
                for line in lines {
                    writeln!(f, "{line}")?;
                }
                f.write_str(STATUS_END)
            }
        }
    }
}

impl FromStr for Response {
    type Err = CodecError;

    /// Parses a single-line response.  `STATUS` replies are read line by line
    /// with [`CpuLine`] until [`STATUS_END`].
    fn from_str(line: &str) -> Result<Self, CodecError> {
        let line = line.trim();
        let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        match keyword {
            "" => Err(CodecError::Empty),
            "OK" => Ok(Response::Ok),
            "ERR" => Ok(Response::Err(rest.trim().to_string())),
            "NONE" => Ok(Response::None),
            "NOW" => {
                expect_args("NOW", &args, 1)?;
                Ok(Response::Now(field("time", args[0])?))
            }
            "LATENESS" => {
                expect_args("LATENESS", &args, 6)?;
                Ok(Response::Lateness(LatenessReport {
                    task: field("task", args[0])?,
                    lateness_us: field("lateness", args[1])?,
                    completion_us: field("completion", args[2])?,
                    deadline_us: field("deadline", args[3])?,
                    completions: field("completions", args[4])?,
                    deadline_misses: field("misses", args[5])?,
                }))
            }
            other => Err(CodecError::UnknownCommand(other.to_string())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
