//! tg graph command implementation

use serde::Serialize;

use crate::error::Result;
use crate::output::HumanReport;

use super::{CommonOptions, Session};

/// Options for the graph command
pub struct GraphOptions {
    pub soft: bool,
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct GraphReport {
    nodes: usize,
    dot: String,
}

pub fn run(options: GraphOptions) -> Result<()> {
    let session = Session::open(&options.common)?;
    let dot = session.graph.export_dot(options.soft);

    let printer = options.common.printer("graph");
    if printer.json() {
        let mut human = HumanReport::default();
        session.report_warnings(&mut human);
        let report = GraphReport {
            nodes: session.graph.len(),
            dot,
        };
        return printer.success(&report, &human);
    }

    // DOT is the payload, so it is printed even with --quiet.
    print!("{dot}");
    for warning in session.warnings() {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
