//! Human and JSON rendering for tg commands.
//!
//! Every command builds a serializable payload plus a [`HumanReport`] and
//! hands both to a [`Printer`]. With `--json` the payload is wrapped in a
//! versioned envelope on stdout; otherwise the report is rendered as text and
//! warnings go to stderr.

use serde::Serialize;

use crate::error::{exit_codes, Error, Result};

pub const SCHEMA_VERSION: &str = "taskgraph.v1";

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Text form of a command result: a headline, `key: value` facts, free
/// lines, warnings and follow-up commands.
#[derive(Debug, Clone, Default)]
pub struct HumanReport {
    headline: String,
    facts: Vec<(String, String)>,
    lines: Vec<String>,
    warnings: Vec<String>,
    hints: Vec<String>,
}

impl HumanReport {
    pub fn new(headline: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            ..Self::default()
        }
    }

    pub fn fact(&mut self, key: impl Into<String>, value: impl ToString) {
        self.facts.push((key.into(), value.to_string()));
    }

    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn hint(&mut self, command: impl Into<String>) {
        self.hints.push(command.into());
    }

    /// Rendered stdout text. Warnings are not included.
    pub fn render(&self) -> String {
        let width = self.facts.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        let mut out = self.headline.clone();
        for (key, value) in &self.facts {
            out.push_str(&format!("\n  {key:<width$}  {value}"));
        }
        if !self.lines.is_empty() {
            out.push('\n');
            for line in &self.lines {
                out.push_str(&format!("\n  {line}"));
            }
        }
        for hint in &self.hints {
            out.push_str(&format!("\n\nnext: {hint}"));
        }
        out
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

/// Writes one command's result to stdout/stderr.
#[derive(Debug, Clone)]
pub struct Printer {
    command: String,
    options: OutputOptions,
}

impl Printer {
    pub fn new(command: impl Into<String>, options: OutputOptions) -> Self {
        Self {
            command: command.into(),
            options,
        }
    }

    pub fn json(&self) -> bool {
        self.options.json
    }

    pub fn success<T: Serialize>(&self, data: &T, human: &HumanReport) -> Result<()> {
        if self.options.json {
            return self.print_envelope(Envelope {
                schema_version: SCHEMA_VERSION,
                command: &self.command,
                status: "success",
                data: Some(data),
                error: None,
                warnings: &human.warnings,
                next_steps: &human.hints,
            });
        }

        for warning in &human.warnings {
            eprintln!("warning: {warning}");
        }
        if !self.options.quiet {
            println!("{}", human.render());
        }
        Ok(())
    }

    pub fn failure(&self, err: &Error) -> Result<()> {
        let hints = error_hints(&self.command, err);
        if self.options.json {
            return self.print_envelope::<()>(Envelope {
                schema_version: SCHEMA_VERSION,
                command: &self.command,
                status: "error",
                data: None,
                error: Some(ErrorBody {
                    message: err.to_string(),
                    code: err.exit_code(),
                    kind: error_kind(err),
                    details: err.details(),
                }),
                warnings: &[],
                next_steps: &hints,
            });
        }

        eprintln!("error: {err}");
        for hint in &hints {
            eprintln!("hint: {hint}");
        }
        Ok(())
    }

    fn print_envelope<T: Serialize>(&self, envelope: Envelope<'_, T>) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        Ok(())
    }
}

/// Best-effort command name for error envelopes, read before clap runs.
pub fn infer_command_name_from_args() -> String {
    command_name_from(std::env::args().skip(1))
}

fn command_name_from(args: impl IntoIterator<Item = String>) -> String {
    let mut args = args.into_iter();
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--repo" || arg == "--status" {
            args.next();
        } else if !arg.starts_with('-') {
            positional.push(arg);
        }
    }

    match positional.as_slice() {
        [] => "tg".to_string(),
        [cache, sub, ..] if cache == "cache" => format!("cache {sub}"),
        [command, ..] => command.clone(),
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        exit_codes::USER_ERROR => "user_error",
        exit_codes::GRAPH_INVALID => "graph_invalid",
        _ => "operation_failed",
    }
}

fn error_hints(command: &str, err: &Error) -> Vec<String> {
    let hint = match err {
        // `validate` already printed every problem.
        Error::GraphInvalid { .. } if command == "validate" => return Vec::new(),
        Error::GraphInvalid { .. } => "tg validate".to_string(),
        Error::DuplicateTaskId { second, .. } => {
            format!("rename the id in {}", second.display())
        }
        Error::TaskNotFound(_) => "tg list".to_string(),
        Error::InvalidTransition { .. } => "allowed: draft->todo, todo->in_progress|blocked, \
             in_progress->completed|blocked|todo, blocked->todo|in_progress"
            .to_string(),
        Error::InvalidConfig(_) => "fix .taskgraph.toml then retry".to_string(),
        Error::LockFailed(_) => "retry, or pass --no-cache".to_string(),
        _ => return Vec::new(),
    };
    vec![hint]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ValidationReport;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn invalid_graph() -> Error {
        Error::GraphInvalid {
            report: Box::new(ValidationReport {
                valid: false,
                errors: vec!["cycle detected: A -> A".into()],
                cycles: vec![vec!["A".into()]],
                ..ValidationReport::default()
            }),
            skipped: Vec::new(),
        }
    }

    #[test]
    fn command_name_skips_flags() {
        assert_eq!(command_name_from(args(&["--json", "next"])), "next");
        assert_eq!(command_name_from(args(&["cache", "-q", "clear"])), "cache clear");
        assert_eq!(command_name_from(args(&["--repo", "/tmp/x", "list"])), "list");
        assert_eq!(command_name_from(args(&["-v"])), "tg");
    }

    #[test]
    fn report_aligns_facts_and_lists_hints() {
        let mut report = HumanReport::new("Next task: T-1");
        report.fact("reason", "unblocker");
        report.fact("ready", 3);
        report.line("T-1 [P0] todo");
        report.warn("skipped tasks/bad.yaml");
        report.hint("tg status T-1 in_progress");

        assert_eq!(
            report.render(),
            "Next task: T-1\n  reason  unblocker\n  ready   3\n\n  T-1 [P0] todo\n\nnext: tg status T-1 in_progress"
        );
    }

    #[test]
    fn error_kinds_follow_exit_codes() {
        assert_eq!(error_kind(&invalid_graph()), "graph_invalid");
        assert_eq!(error_kind(&Error::TaskNotFound("x".into())), "user_error");
        assert_eq!(
            error_kind(&Error::LockFailed("index.json.lock".into())),
            "operation_failed"
        );
    }

    #[test]
    fn validate_does_not_point_back_at_itself() {
        assert!(error_hints("validate", &invalid_graph()).is_empty());
        assert_eq!(error_hints("next", &invalid_graph()), vec!["tg validate"]);
    }
}
