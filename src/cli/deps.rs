//! tg deps command implementation

use serde::Serialize;

use crate::error::{Error, Result};
use crate::graph::DependencyClosure;
use crate::output::HumanReport;

use super::{CommonOptions, Session};

/// Options for the deps command
pub struct DepsOptions {
    pub id: String,
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct DepsReport<'a> {
    #[serde(flatten)]
    closure: &'a DependencyClosure,
    blocked_by: &'a [String],
    dependents: &'a [String],
    missing: Vec<String>,
}

pub fn run(options: DepsOptions) -> Result<()> {
    let session = Session::open(&options.common)?;
    let graph = &session.graph;
    let task = graph
        .get(&options.id)
        .ok_or_else(|| Error::TaskNotFound(options.id.clone()))?;

    let closure = graph.compute_dependency_closure(&task.id);
    let missing: Vec<String> = closure
        .blocking
        .iter()
        .chain(closure.related.iter())
        .filter(|id| graph.get(id).is_none())
        .cloned()
        .collect();

    let mut human = HumanReport::new(format!("Dependencies of {}", task.id));
    human.fact("blocked by", join_or_none(task.blocked_by.iter()));
    human.fact("waits on", join_or_none(closure.blocking.iter()));
    human.fact("blocks", join_or_none(closure.blocked.iter()));
    if !closure.related.is_empty() {
        human.fact("related", join_or_none(closure.related.iter()));
    }
    for id in &missing {
        human.warn(format!("{id} is not a known task"));
    }
    session.report_warnings(&mut human);

    let report = DepsReport {
        closure: &closure,
        blocked_by: &task.blocked_by,
        dependents: graph.dependents_of(&task.id),
        missing,
    };
    options.common.printer("deps").success(&report, &human)
}

fn join_or_none<'a>(ids: impl Iterator<Item = &'a String>) -> String {
    let joined = ids.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}
