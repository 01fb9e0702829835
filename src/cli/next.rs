//! tg next command implementation

use serde::Serialize;

use crate::error::{Error, Result};
use crate::output::HumanReport;
use crate::picker::TaskPicker;
use crate::task::TaskStatus;

use super::{ranked_line, CommonOptions, RankedSummary, Session};

/// Options for the next command
pub struct NextOptions {
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct NextReport {
    task: Option<RankedSummary>,
    ready_count: usize,
}

pub fn run(options: NextOptions) -> Result<()> {
    let session = Session::open(&options.common)?;

    let validation = session.graph.validate();
    if !validation.valid {
        return Err(Error::GraphInvalid {
            report: Box::new(validation),
            skipped: session.report.skipped.clone(),
        });
    }

    let completed = session.graph.completed_ids();
    let picker = TaskPicker::new(&session.graph);
    let picked = picker.pick_next_task(&completed);
    let ready_count = picker.list_tasks(None, false).len();

    let mut human = match &picked {
        Some(ranked) => {
            let mut human = HumanReport::new(format!("Next task: {}", ranked_line(ranked)));
            human.fact("reason", ranked.reason);
            human.fact("path", ranked.task.path.display());
            if ranked.task.status == TaskStatus::Todo {
                human.hint(format!("tg status {} in_progress", ranked.task.id));
            }
            human
        }
        None => HumanReport::new("No task is ready"),
    };
    human.fact("ready", ready_count);
    session.report_warnings(&mut human);

    let report = NextReport {
        task: picked.as_ref().map(RankedSummary::from),
        ready_count,
    };
    options.common.printer("next").success(&report, &human)
}
