//! taskgraph - Task Dependency Graph Library
//!
//! This library provides the core functionality for the tg CLI tool:
//! validating a backlog of task files and deciding what to work on next.
//!
//! # Core Concepts
//!
//! - **Tasks**: one YAML file per task with status, priority and edges
//! - **Hard dependencies** (`blocked_by`): gate readiness, checked for cycles
//! - **Soft dependencies** (`depends_on`): provenance only
//! - **Archive**: tasks stored under the archive directory count as completed
//! - **Unblockers**: tasks that outrank every non-unblocker when picking
//! - **Task index**: a versioned, lock-protected cache of parsed tasks
//!
//! # Module Organization
//!
//! - `task`: Task records, statuses, priorities and the YAML file shape
//! - `archive`: Path-based archive detection
//! - `graph`: Dependency graph, cycles, readiness, closures, DOT export
//! - `picker`: Ranking and next-task selection
//! - `fs`: Filesystem and clock seams with real and in-memory backends
//! - `lock`: File locking and atomic writes
//! - `cache`: Persisted task index with mtime and content invalidation
//! - `loader`: Task discovery and loading through the cache
//! - `config`: Configuration loading from `.taskgraph.toml`
//! - `error`: Error types and result aliases
//! - `output`: Human and JSON output for CLI commands
//! - `cli`: Command-line interface using clap

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod graph;
pub mod loader;
pub mod lock;
pub mod output;
pub mod picker;
pub mod task;

pub use error::{Error, Result};
pub use graph::{DependencyClosure, DependencyGraph, ValidationReport};
pub use picker::{PickReason, RankedTask, TaskPicker};
pub use task::{Priority, Task, TaskStatus};
