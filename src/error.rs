//! Error types for taskgraph
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, bad config, duplicate ids, invalid transition)
//! - 3: Invalid task graph (cycles or missing dependencies)
//! - 4: Operation failed (IO, serialization, lock contention)

use std::path::PathBuf;
use thiserror::Error;

use crate::cache::SkippedFile;
use crate::graph::ValidationReport;

/// Exit codes for the tg CLI
pub mod exit_codes {
    pub const USER_ERROR: i32 = 2;
    pub const GRAPH_INVALID: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for taskgraph operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task id '{id}' in {first} and {second}")]
    DuplicateTaskId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid status transition for task '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Task '{0}' is archived and cannot be modified")]
    ArchivedTask(String),

    // Graph findings (exit code 3)
    #[error("Task graph is invalid ({} problem(s))", report.errors.len())]
    GraphInvalid {
        report: Box<ValidationReport>,
        skipped: Vec<SkippedFile>,
    },

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::DuplicateTaskId { .. }
            | Error::InvalidTransition { .. }
            | Error::ArchivedTask(_) => exit_codes::USER_ERROR,

            Error::GraphInvalid { .. } => exit_codes::GRAPH_INVALID,

            Error::Io(_)
            | Error::Json(_)
            | Error::Yaml(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::DuplicateTaskId { id, first, second } => Some(serde_json::json!({
                "id": id,
                "first": first.to_string_lossy(),
                "second": second.to_string_lossy(),
            })),
            Error::InvalidTransition { id, from, to } => Some(serde_json::json!({
                "id": id,
                "from": from,
                "to": to,
            })),
            Error::TaskNotFound(id) | Error::ArchivedTask(id) => {
                Some(serde_json::json!({ "id": id }))
            }
            Error::GraphInvalid { report, skipped } => Some(serde_json::json!({
                "problems": report.errors.len(),
                "errors": report.errors,
                "cycles": report.cycles,
                "missing": report.missing,
                "skipped": skipped,
            })),
            Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path.to_string_lossy() }))
            }
            Error::InvalidConfig(message) => Some(serde_json::json!({ "message": message })),
            _ => None,
        }
    }
}

/// Result type alias for taskgraph operations
pub type Result<T> = std::result::Result<T, Error>;

