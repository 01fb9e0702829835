//! Task records for taskgraph.
//!
//! Tasks live one-per-file as YAML under the configured tasks root. The
//! loader turns each file into a [`Task`]; the graph and picker treat the
//! resulting records as read-only for the rest of the invocation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

const MAX_PRIORITY_LEVEL: u8 = 9;

/// Default priority for tasks that do not declare one.
pub const DEFAULT_TASK_PRIORITY: Priority = Priority(2);

/// Task priority band. `P0` is the most urgent and sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    pub const P0: Priority = Priority(0);
    pub const P1: Priority = Priority(1);
    pub const P2: Priority = Priority(2);
    pub const P3: Priority = Priority(3);
    pub const P4: Priority = Priority(4);

    pub fn new(level: u8) -> Option<Self> {
        (level <= MAX_PRIORITY_LEVEL).then_some(Priority(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        DEFAULT_TASK_PRIORITY
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidArgument("priority cannot be empty".to_string()));
        }
        let digits = trimmed
            .strip_prefix('P')
            .or_else(|| trimmed.strip_prefix('p'))
            .unwrap_or(trimmed);
        digits
            .parse::<u8>()
            .ok()
            .and_then(Priority::new)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown task priority '{trimmed}' (expected P0-P{MAX_PRIORITY_LEVEL})"
                ))
            })
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PriorityVisitor;

        impl Visitor<'_> for PriorityVisitor {
            type Value = Priority;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a priority such as \"P1\" or 1")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Priority, E> {
                value.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Priority, E> {
                u8::try_from(value)
                    .ok()
                    .and_then(Priority::new)
                    .ok_or_else(|| E::custom(format!("priority level {value} out of range")))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Priority, E> {
                u64::try_from(value)
                    .map_err(|_| E::custom(format!("priority level {value} out of range")))
                    .and_then(|level| self.visit_u64(level))
            }
        }

        deserializer.deserialize_any(PriorityVisitor)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    Todo,
    #[serde(alias = "in-progress")]
    InProgress,
    Blocked,
    #[serde(alias = "done")]
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Draft,
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Draft => "draft",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }

    /// Whether moving from `self` to `next` is an allowed lifecycle step.
    ///
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Draft, Todo)
                | (Todo, InProgress)
                | (Todo, Blocked)
                | (InProgress, Completed)
                | (InProgress, Blocked)
                | (InProgress, Todo)
                | (Blocked, Todo)
                | (Blocked, InProgress)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(TaskStatus::Draft),
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" | "in-progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "completed" | "done" => Ok(TaskStatus::Completed),
            other => Err(Error::InvalidArgument(format!(
                "unknown task status '{other}' (expected draft|todo|in_progress|blocked|completed)"
            ))),
        }
    }
}

fn default_task_status() -> TaskStatus {
    TaskStatus::Todo
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One task as loaded for this invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub area: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    /// Hard dependencies: every id here must be completed before this task is ready.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    /// Soft dependencies: provenance only, never blocks readiness.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub unblocker: bool,
    pub hash: String,
    pub mtime: DateTime<Utc>,
}

impl Task {
    /// Check that this task may move to `next`, returning the new status.
    pub fn transition(&self, next: TaskStatus) -> Result<TaskStatus> {
        if self.status.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// On-disk YAML shape of a task file.
///
/// Unknown keys are kept in `extra` so a rewrite does not drop them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unblocker: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl TaskFile {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(data)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Build the runtime record for this file.
    pub fn into_task(self, path: PathBuf, hash: String, mtime: DateTime<Utc>) -> Result<Task> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "task id cannot be empty ({})",
                path.display()
            )));
        }

        Ok(Task {
            id,
            title: self.title,
            status: self.status,
            priority: self.priority,
            area: self.area,
            path,
            order: self.order,
            blocked_by: dedup_ids(self.blocked_by),
            depends_on: dedup_ids(self.depends_on),
            unblocker: self.unblocker,
            hash,
            mtime,
        })
    }
}

/// Trim ids and drop repeats, keeping first-occurrence order.
fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
