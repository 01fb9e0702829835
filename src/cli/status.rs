//! tg status command implementation
//!
//! Applies a lifecycle transition to one active task file.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::output::HumanReport;
use crate::task::TaskStatus;

use super::{CommonOptions, Session};

/// Options for the status command
pub struct StatusOptions {
    pub id: String,
    pub status: TaskStatus,
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct StatusReport {
    id: String,
    from: TaskStatus,
    to: TaskStatus,
    changed: bool,
    path: PathBuf,
}

pub fn run(options: StatusOptions) -> Result<()> {
    let session = Session::open(&options.common)?;
    let task = session
        .graph
        .get(&options.id)
        .ok_or_else(|| Error::TaskNotFound(options.id.clone()))?;

    let changed = task.status != options.status;
    if changed {
        session.loader.rewrite_status(task, options.status)?;
    } else if session.graph.is_archived(&task.id) {
        return Err(Error::ArchivedTask(task.id.clone()));
    }

    let header = if changed {
        format!("{}: {} -> {}", task.id, task.status, options.status)
    } else {
        format!("{} is already {}", task.id, task.status)
    };
    let mut human = HumanReport::new(header);
    human.fact("path", task.path.display());
    if changed && options.status == TaskStatus::Completed {
        human.hint("tg next");
    }

    let report = StatusReport {
        id: task.id.clone(),
        from: task.status,
        to: options.status,
        changed,
        path: task.path.clone(),
    };
    options.common.printer("status").success(&report, &human)
}
