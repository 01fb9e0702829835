//! Next-task selection.
//!
//! Ranking is a strict total order over ready tasks:
//! status band, then unblocker flag, then priority, then explicit order,
//! then id. Unblockers outrank every non-unblocker in the same band no matter
//! what their priority says.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::task::{Priority, Task, TaskStatus};

/// Why a task was ranked where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PickReason {
    BlockedManualIntervention,
    ResumeInProgress,
    Unblocker,
    HighestPriority,
    ExplicitOrder,
    IdTiebreak,
}

impl PickReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PickReason::BlockedManualIntervention => "blocked_manual_intervention",
            PickReason::ResumeInProgress => "resume_in_progress",
            PickReason::Unblocker => "unblocker",
            PickReason::HighestPriority => "highest_priority",
            PickReason::ExplicitOrder => "explicit_order",
            PickReason::IdTiebreak => "id_tiebreak",
        }
    }
}

impl fmt::Display for PickReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready task with its computed annotations. The task itself is untouched.
#[derive(Debug, Clone, Serialize)]
pub struct RankedTask<'a> {
    pub task: &'a Task,
    pub effective_priority: Priority,
    pub reason: PickReason,
}

pub fn compare_tasks(left: &Task, right: &Task) -> Ordering {
    status_band(left.status)
        .cmp(&status_band(right.status))
        .then_with(|| right.unblocker.cmp(&left.unblocker))
        .then_with(|| left.priority.cmp(&right.priority))
        .then_with(|| order_rank(left).cmp(&order_rank(right)))
        .then_with(|| left.id.cmp(&right.id))
}

/// Blocked work needs a human first, then work already underway.
fn status_band(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Blocked => 0,
        TaskStatus::InProgress => 1,
        TaskStatus::Todo => 2,
        TaskStatus::Draft => 3,
        TaskStatus::Completed => 4,
    }
}

fn order_rank(task: &Task) -> (bool, i64) {
    (task.order.is_none(), task.order.unwrap_or_default())
}

fn effective_priority(task: &Task) -> Priority {
    if task.unblocker {
        Priority::P0
    } else {
        task.priority
    }
}

/// Reason derived from the task's own most significant attribute.
fn own_reason(task: &Task) -> PickReason {
    match task.status {
        TaskStatus::Blocked => PickReason::BlockedManualIntervention,
        TaskStatus::InProgress => PickReason::ResumeInProgress,
        _ if task.unblocker => PickReason::Unblocker,
        _ => PickReason::HighestPriority,
    }
}

/// Reason naming the first ranking level that separates `winner` from `runner_up`.
fn separating_reason(winner: &Task, runner_up: &Task) -> PickReason {
    if status_band(winner.status) != status_band(runner_up.status) {
        return match winner.status {
            TaskStatus::Blocked => PickReason::BlockedManualIntervention,
            TaskStatus::InProgress => PickReason::ResumeInProgress,
            _ => own_reason(winner),
        };
    }
    if winner.unblocker != runner_up.unblocker {
        return PickReason::Unblocker;
    }
    if winner.priority != runner_up.priority {
        return PickReason::HighestPriority;
    }
    if order_rank(winner) != order_rank(runner_up) {
        return PickReason::ExplicitOrder;
    }
    PickReason::IdTiebreak
}

fn ranked(task: &Task, reason: PickReason) -> RankedTask<'_> {
    RankedTask {
        task,
        effective_priority: effective_priority(task),
        reason,
    }
}

/// Ranks the ready subset of a graph.
#[derive(Debug, Clone, Copy)]
pub struct TaskPicker<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> TaskPicker<'a> {
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Best next task given `completed_ids`, or `None` when nothing is ready.
    ///
    /// Drafts are never picked.
    pub fn pick_next_task(&self, completed_ids: &HashSet<String>) -> Option<RankedTask<'a>> {
        let mut candidates: Vec<&'a Task> = self
            .graph
            .topological_ready_set(completed_ids)
            .into_iter()
            .filter(|task| task.status != TaskStatus::Draft)
            .collect();
        candidates.sort_by(|left, right| compare_tasks(left, right));

        let winner = *candidates.first()?;
        let reason = match candidates.get(1) {
            Some(runner_up) => separating_reason(winner, runner_up),
            None => own_reason(winner),
        };

        debug!(
            task = %winner.id,
            reason = %reason,
            candidates = candidates.len(),
            "picked next task"
        );
        Some(ranked(winner, reason))
    }

    /// Ready tasks in rank order, using the graph's own completed set.
    ///
    /// Drafts only appear when `status_filter` asks for them.
    pub fn list_tasks(
        &self,
        status_filter: Option<TaskStatus>,
        unblocker_only: bool,
    ) -> Vec<RankedTask<'a>> {
        let completed = self.graph.completed_ids();
        let mut tasks: Vec<&'a Task> = self
            .graph
            .topological_ready_set(&completed)
            .into_iter()
            .filter(|task| match status_filter {
                Some(status) => task.status == status,
                None => task.status != TaskStatus::Draft,
            })
            .filter(|task| !unblocker_only || task.unblocker)
            .collect();
        tasks.sort_by(|left, right| compare_tasks(left, right));

        tasks
            .into_iter()
            .map(|task| ranked(task, own_reason(task)))
            .collect()
    }
}
