use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Job Types ────────────────────

/// A named, reusable command definition with optional environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job name, the primary key.
    pub name: String,
    /// Command argument vector; the first element is the executable.
    pub command: Vec<String>,
    /// Environment overrides, applied on top of the ambient environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Job {
    /// Materialize the environment overlay with upper-cased variable names.
    pub fn env_overlay(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|(k, v)| (k.to_uppercase(), v.clone()))
            .collect()
    }
}

// ──────────────────── Task Types ────────────────────

/// Verbosity policy for reporting a job run's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// No message on success. Failures escalate to `LastLine`.
    None,
    /// One status line only.
    Result,
    /// The last non-blank line of captured output.
    LastLine,
    /// Status line plus the entire captured output.
    #[default]
    Full,
}

impl OutputMode {
    /// Stable token used for persistence and operator input.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::None => "none",
            OutputMode::Result => "result",
            OutputMode::LastLine => "last",
            OutputMode::Full => "all",
        }
    }

    /// Parse an operator-supplied token.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(OutputMode::None),
            "result" => Some(OutputMode::Result),
            "last" => Some(OutputMode::LastLine),
            "all" => Some(OutputMode::Full),
            _ => None,
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a task fires: exactly once at a fixed instant, or recurring per a
/// cron expression with the next occurrence cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Once {
        fire_at: DateTime<Utc>,
    },
    Cron {
        expr: String,
        next_fire: DateTime<Utc>,
    },
}

impl Schedule {
    /// The next instant this schedule fires at.
    pub fn fire_at(&self) -> DateTime<Utc> {
        match self {
            Schedule::Once { fire_at } => *fire_at,
            Schedule::Cron { next_fire, .. } => *next_fire,
        }
    }

    /// The cron expression, if this schedule is recurring.
    pub fn cron_expr(&self) -> Option<&str> {
        match self {
            Schedule::Once { .. } => None,
            Schedule::Cron { expr, .. } => Some(expr),
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Schedule::Cron { .. })
    }
}

/// A scheduled invocation of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID, assigned by the store.
    pub id: i64,
    /// Name of the job this task runs. A weak reference: the job may have
    /// been deleted since, which callers must handle.
    pub job_name: String,
    /// One-shot or cron-recurring schedule.
    pub schedule: Schedule,
    /// Paused tasks are retained but excluded from due-scans.
    pub paused: bool,
    /// How much of the run's output is reported.
    pub output: OutputMode,
}

impl Task {
    /// Whether this task should fire in a scan referenced at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.paused && self.schedule.fire_at() <= now
    }
}

// ──────────────────── Execution Types ────────────────────

/// Outcome of one job run, with the operator-facing message already
/// rendered according to the task's output mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Name of the job that ran.
    pub job_name: String,
    /// Whether the subprocess spawned and exited with status zero.
    pub succeeded: bool,
    /// Rendered report text. `None` means nothing should be sent.
    pub message: Option<String>,
}
