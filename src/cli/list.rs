//! tg list command implementation

use serde::Serialize;

use crate::error::Result;
use crate::output::HumanReport;
use crate::picker::TaskPicker;
use crate::task::TaskStatus;

use super::{ranked_line, CommonOptions, RankedSummary, Session};

/// Options for the list command
pub struct ListOptions {
    pub status: Option<TaskStatus>,
    pub unblockers: bool,
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct ListReport {
    total: usize,
    tasks: Vec<RankedSummary>,
}

pub fn run(options: ListOptions) -> Result<()> {
    let session = Session::open(&options.common)?;
    let ranked = TaskPicker::new(&session.graph).list_tasks(options.status, options.unblockers);

    let header = if ranked.is_empty() {
        "No ready tasks".to_string()
    } else {
        format!("Ready tasks ({})", ranked.len())
    };
    let mut human = HumanReport::new(header);
    for task in &ranked {
        human.line(ranked_line(task));
    }
    session.report_warnings(&mut human);

    let report = ListReport {
        total: ranked.len(),
        tasks: ranked.iter().map(RankedSummary::from).collect(),
    };
    options.common.printer("list").success(&report, &human)
}
