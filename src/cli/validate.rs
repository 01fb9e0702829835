//! tg validate command implementation
//!
//! An invalid graph fails with exit code 3. Human output still prints the
//! full report first; JSON output carries it in the error details.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::SkippedFile;
use crate::error::{Error, Result};
use crate::output::HumanReport;

use super::{CommonOptions, Session};

/// Options for the validate command
pub struct ValidateOptions {
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct ValidateReport<'a> {
    valid: bool,
    tasks: usize,
    archived: usize,
    errors: &'a [String],
    cycles: &'a [Vec<String>],
    missing: &'a BTreeMap<String, Vec<String>>,
    skipped: &'a [SkippedFile],
}

pub fn run(options: ValidateOptions) -> Result<()> {
    let session = Session::open(&options.common)?;
    let validation = session.graph.validate();
    let printer = options.common.printer("validate");

    let header = if validation.valid {
        "Task graph is valid".to_string()
    } else {
        format!("Task graph is invalid ({} problem(s))", validation.errors.len())
    };
    let mut human = HumanReport::new(header);
    human.fact("tasks", session.graph.len());
    human.fact("archived", session.report.archived_count);
    human.fact("cycles", validation.cycles.len());
    human.fact("missing", validation.missing.values().map(Vec::len).sum::<usize>());
    for error in &validation.errors {
        human.line(error.clone());
    }
    session.report_warnings(&mut human);

    if validation.valid || !printer.json() {
        let report = ValidateReport {
            valid: validation.valid,
            tasks: session.graph.len(),
            archived: session.report.archived_count,
            errors: &validation.errors,
            cycles: &validation.cycles,
            missing: &validation.missing,
            skipped: &session.report.skipped,
        };
        printer.success(&report, &human)?;
    }

    if validation.valid {
        Ok(())
    } else {
        Err(Error::GraphInvalid {
            report: Box::new(validation),
            skipped: session.report.skipped,
        })
    }
}
