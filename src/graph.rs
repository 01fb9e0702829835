//! Dependency graph over task records.
//!
//! Only `blocked_by` edges are structural: they drive readiness and cycle
//! detection. `depends_on` edges are carried for provenance and show up in
//! missing-reference checks, closures and DOT output, nothing else.
//!
//! Every query here is total. Cycles and dangling references are reported as
//! data; the only construction failure is a duplicate task id.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;

use crate::archive::ArchiveMatcher;
use crate::error::{Error, Result};
use crate::task::{Task, TaskStatus};

/// Immutable dependency graph for one invocation.
#[derive(Debug)]
pub struct DependencyGraph {
    tasks: BTreeMap<String, Task>,
    /// Reverse `blocked_by` adjacency: blocker id -> ids it blocks.
    dependents: HashMap<String, Vec<String>>,
    archived: BTreeSet<String>,
}

/// Transitive reach of one task, for impact analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyClosure {
    pub task_id: String,
    /// Everything that must complete before this task (transitive `blocked_by`).
    pub blocking: BTreeSet<String>,
    /// Everything waiting on this task (transitive dependents).
    pub blocked: BTreeSet<String>,
    /// Transitive `depends_on` reach.
    pub related: BTreeSet<String>,
}

/// Aggregated structural findings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub cycles: Vec<Vec<String>>,
    pub missing: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build a graph using the default archive location.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        Self::with_archive_matcher(tasks, &ArchiveMatcher::default())
    }

    /// Build a graph, classifying archived tasks with `matcher`.
    pub fn with_archive_matcher(tasks: Vec<Task>, matcher: &ArchiveMatcher) -> Result<Self> {
        let mut by_id: BTreeMap<String, Task> = BTreeMap::new();
        let mut archived = BTreeSet::new();

        for task in tasks {
            if let Some(existing) = by_id.get(&task.id) {
                return Err(Error::DuplicateTaskId {
                    id: task.id.clone(),
                    first: existing.path.clone(),
                    second: task.path.clone(),
                });
            }
            if matcher.is_archived(&task.path) {
                archived.insert(task.id.clone());
            }
            by_id.insert(task.id.clone(), task);
        }

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut edges = 0usize;
        for task in by_id.values() {
            for blocker in &task.blocked_by {
                dependents
                    .entry(blocker.clone())
                    .or_default()
                    .push(task.id.clone());
                edges += 1;
            }
        }

        debug!(
            tasks = by_id.len(),
            archived = archived.len(),
            edges,
            "built dependency graph"
        );

        Ok(Self {
            tasks: by_id,
            dependents,
            archived,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks, ordered by id.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_archived(&self, id: &str) -> bool {
        self.archived.contains(id)
    }

    pub fn archived_ids(&self) -> &BTreeSet<String> {
        &self.archived
    }

    /// Direct dependents of `id` through `blocked_by`.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents
            .get(id)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Ids with `status == completed` plus every archived id.
    pub fn completed_ids(&self) -> HashSet<String> {
        self.tasks
            .values()
            .filter(|task| task.status == TaskStatus::Completed || self.is_archived(&task.id))
            .map(|task| task.id.clone())
            .collect()
    }

    /// Every distinct cycle in the `blocked_by` subgraph.
    ///
    /// Each cycle lists ids so that every element is blocked by the next one,
    /// wrapping around at the end. Self-blocking tasks come back as one-node
    /// cycles.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut cycles = Vec::new();

        for start in self.tasks.keys() {
            if !visited.insert(start.as_str()) {
                continue;
            }

            // Explicit DFS stack of (node, index of next blocker to visit).
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            let mut on_stack: HashMap<&str, usize> = HashMap::from([(start.as_str(), 0)]);

            while let Some(frame) = stack.last_mut() {
                let (node, next_index) = *frame;
                let blockers = self.blockers_of(node);

                let Some(next) = blockers.get(next_index) else {
                    on_stack.remove(node);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                let next = next.as_str();
                if !self.tasks.contains_key(next) {
                    continue;
                }

                if let Some(&position) = on_stack.get(next) {
                    let cycle: Vec<String> = stack[position..]
                        .iter()
                        .map(|(id, _)| id.to_string())
                        .collect();
                    if seen.insert(canonical_rotation(&cycle)) {
                        debug!(cycle = ?cycle, "found dependency cycle");
                        cycles.push(cycle);
                    }
                } else if visited.insert(next) {
                    on_stack.insert(next, stack.len());
                    stack.push((next, 0));
                }
            }
        }

        cycles
    }

    /// Referenced ids that resolve to no loaded task, keyed by the referencing task.
    ///
    /// Archived tasks are historical and never reported.
    pub fn missing_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        let mut missing = BTreeMap::new();

        for task in self.tasks.values() {
            if self.is_archived(&task.id) {
                continue;
            }
            let mut seen = HashSet::new();
            let unresolved: Vec<String> = task
                .blocked_by
                .iter()
                .chain(task.depends_on.iter())
                .filter(|id| !self.tasks.contains_key(id.as_str()))
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect();
            if !unresolved.is_empty() {
                missing.insert(task.id.clone(), unresolved);
            }
        }

        missing
    }

    /// Tasks that are not completed and whose blockers are all satisfied.
    ///
    /// A blocker is satisfied when it is in `completed_ids` or archived.
    /// Results are ordered by id.
    pub fn topological_ready_set(&self, completed_ids: &HashSet<String>) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| !self.is_done(task, completed_ids))
            .filter(|task| {
                task.blocked_by
                    .iter()
                    .all(|blocker| completed_ids.contains(blocker) || self.is_archived(blocker))
            })
            .collect()
    }

    /// Transitive closure around `task_id`. Unknown ids yield empty sets.
    pub fn compute_dependency_closure(&self, task_id: &str) -> DependencyClosure {
        let mut closure = DependencyClosure {
            task_id: task_id.to_string(),
            ..DependencyClosure::default()
        };
        if !self.tasks.contains_key(task_id) {
            return closure;
        }

        closure.blocking = self.reach(task_id, |id| self.blockers_of(id));
        closure.blocked = self.reach(task_id, |id| self.dependents_of(id));
        closure.related = self.reach(task_id, |id| {
            self.tasks
                .get(id)
                .map(|task| task.depends_on.as_slice())
                .unwrap_or(&[])
        });
        closure
    }

    /// Run cycle and missing-reference checks together.
    pub fn validate(&self) -> ValidationReport {
        let cycles = self.detect_cycles();
        let missing = self.missing_dependencies();

        let mut errors = Vec::new();
        for cycle in &cycles {
            let mut chain = cycle.clone();
            if let Some(first) = cycle.first() {
                chain.push(first.clone());
            }
            errors.push(format!("cycle detected: {}", chain.join(" -> ")));
        }
        for (task_id, ids) in &missing {
            for id in ids {
                errors.push(format!(
                    "task '{task_id}' references missing dependency '{id}'"
                ));
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            cycles,
            missing,
        }
    }

    /// Render the graph in Graphviz DOT form.
    ///
    /// Edges point from blocker to blocked task. Soft `depends_on` edges are
    /// drawn dashed when `include_soft` is set.
    pub fn export_dot(&self, include_soft: bool) -> String {
        let mut out = String::from("digraph tasks {\n");
        out.push_str("  rankdir=LR;\n");
        out.push_str("  node [shape=box];\n");

        for task in self.tasks.values() {
            let mut attrs = vec![format!(
                "label=\"{}\\n{}\"",
                dot_escape(&task.id),
                dot_escape(&task.title)
            )];
            if self.is_archived(&task.id) {
                attrs.push("style=dashed".to_string());
                attrs.push("color=gray".to_string());
            } else if task.status == TaskStatus::Completed {
                attrs.push("style=filled".to_string());
                attrs.push("fillcolor=lightgray".to_string());
            } else if task.status == TaskStatus::Blocked {
                attrs.push("color=red".to_string());
            }
            if task.unblocker {
                attrs.push("penwidth=2".to_string());
            }
            out.push_str(&format!(
                "  \"{}\" [{}];\n",
                dot_escape(&task.id),
                attrs.join(", ")
            ));
        }

        for task in self.tasks.values() {
            for blocker in &task.blocked_by {
                out.push_str(&format!(
                    "  \"{}\" -> \"{}\";\n",
                    dot_escape(blocker),
                    dot_escape(&task.id)
                ));
            }
            if include_soft {
                for dep in &task.depends_on {
                    out.push_str(&format!(
                        "  \"{}\" -> \"{}\" [style=dashed];\n",
                        dot_escape(dep),
                        dot_escape(&task.id)
                    ));
                }
            }
        }

        out.push_str("}\n");
        out
    }

    fn blockers_of(&self, id: &str) -> &[String] {
        self.tasks
            .get(id)
            .map(|task| task.blocked_by.as_slice())
            .unwrap_or(&[])
    }

    fn is_done(&self, task: &Task, completed_ids: &HashSet<String>) -> bool {
        task.status == TaskStatus::Completed
            || self.is_archived(&task.id)
            || completed_ids.contains(&task.id)
    }

    /// Breadth-first reach from `start` along `edges`, excluding `start` itself.
    fn reach<'a, F>(&'a self, start: &str, edges: F) -> BTreeSet<String>
    where
        F: Fn(&str) -> &'a [String],
    {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([start]);
        let mut visited: HashSet<&str> = HashSet::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in edges(current) {
                if visited.insert(next.as_str()) {
                    reached.insert(next.clone());
                    queue.push_back(next.as_str());
                }
            }
        }

        reached
    }
}

/// Rotate a cycle so its smallest id comes first; used to de-duplicate.
fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let Some(min_index) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(index, _)| index)
    else {
        return Vec::new();
    };
    cycle[min_index..]
        .iter()
        .chain(cycle[..min_index].iter())
        .cloned()
        .collect()
}

fn dot_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
