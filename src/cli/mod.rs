//! Command-line interface for tg
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::{Config, CONFIG_FILE_NAME};
use crate::error::{Error, Result};
use crate::fs::{RealFileSystem, SystemClock};
use crate::graph::DependencyGraph;
use crate::loader::{LoadOptions, LoadReport, TaskLoader};
use crate::output::{HumanReport, OutputOptions, Printer};
use crate::picker::{PickReason, RankedTask};
use crate::task::{Priority, TaskStatus};

mod cache;
mod deps;
mod graph;
mod list;
mod next;
mod status;
mod validate;

/// tg - task dependency graph
///
/// Validates a YAML task backlog, shows what is ready and picks the next
/// task to work on.
#[derive(Parser, Debug)]
#[command(name = "tg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the repository (defaults to current directory)
    #[arg(long, global = true, env = "TASKGRAPH_REPO")]
    pub repo: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Bypass the task index entirely
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Rebuild the task index before answering
    #[arg(long, global = true, conflicts_with = "no_cache")]
    pub refresh: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pick the next task to work on
    Next,

    /// List ready tasks in rank order
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Only unblocker tasks
        #[arg(long)]
        unblockers: bool,
    },

    /// Check the graph for cycles and missing dependencies
    Validate,

    /// Show what a task waits on and what waits on it
    Deps {
        /// Task id
        id: String,
    },

    /// Print the dependency graph in Graphviz DOT format
    Graph {
        /// Include soft `depends_on` edges
        #[arg(long)]
        soft: bool,
    },

    /// Move a task to a new status
    Status {
        /// Task id
        id: String,

        /// New status: draft, todo, in_progress, blocked, completed
        status: TaskStatus,
    },

    /// Task index maintenance
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show index location and provenance
    Status,

    /// Delete the index; the next command rebuilds it
    Clear,
}

/// Flags shared by every command.
#[derive(Debug, Clone)]
pub struct CommonOptions {
    pub repo: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub no_cache: bool,
    pub refresh: bool,
}

impl CommonOptions {
    pub fn printer(&self, command: &str) -> Printer {
        Printer::new(
            command,
            OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        )
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            use_cache: !self.no_cache,
            force_refresh: self.refresh,
        }
    }
}

impl Cli {
    fn common(&self) -> CommonOptions {
        CommonOptions {
            repo: self.repo.clone(),
            json: self.json,
            quiet: self.quiet,
            no_cache: self.no_cache,
            refresh: self.refresh,
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let common = self.common();
        match self.command {
            Commands::Next => next::run(next::NextOptions { common }),
            Commands::List { status, unblockers } => list::run(list::ListOptions {
                status,
                unblockers,
                common,
            }),
            Commands::Validate => validate::run(validate::ValidateOptions { common }),
            Commands::Deps { id } => deps::run(deps::DepsOptions { id, common }),
            Commands::Graph { soft } => graph::run(graph::GraphOptions { soft, common }),
            Commands::Status { id, status } => status::run(status::StatusOptions {
                id,
                status,
                common,
            }),
            Commands::Cache(cmd) => match cmd {
                CacheCommands::Status => cache::run_status(cache::CacheOptions { common }),
                CacheCommands::Clear => cache::run_clear(cache::CacheOptions { common }),
            },
        }
    }
}

/// Repo root from `--repo` or the working directory.
fn resolve_repo(repo: Option<&PathBuf>) -> Result<PathBuf> {
    let root = match repo {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "repository path is not a directory: {}",
            root.display()
        )));
    }
    Ok(root)
}

/// Loader for the repo. A present but invalid config file is an error here.
fn open_loader(common: &CommonOptions) -> Result<TaskLoader> {
    let root = resolve_repo(common.repo.as_ref())?;
    let config_path = root.join(CONFIG_FILE_NAME);
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };
    Ok(TaskLoader::new(
        root,
        Arc::new(RealFileSystem),
        Arc::new(SystemClock),
        config,
    ))
}

/// Everything a read command needs: the loader, the graph and load metadata.
struct Session {
    loader: TaskLoader,
    graph: DependencyGraph,
    report: LoadReport,
}

impl Session {
    fn open(common: &CommonOptions) -> Result<Self> {
        let loader = open_loader(common)?;
        let mut report = loader.load(common.load_options())?;
        let tasks = std::mem::take(&mut report.tasks);
        let graph = DependencyGraph::with_archive_matcher(tasks, &loader.archive_matcher())?;
        Ok(Self {
            loader,
            graph,
            report,
        })
    }

    /// Load warnings and skipped files, for human and JSON output alike.
    fn warnings(&self) -> Vec<String> {
        let mut warnings = self.report.warnings.clone();
        warnings.extend(self.report.skipped.iter().map(|file| {
            format!("skipped {}: {}", file.path.display(), file.reason)
        }));
        warnings
    }

    fn report_warnings(&self, human: &mut HumanReport) {
        for warning in self.warnings() {
            human.warn(warning);
        }
    }
}

/// Serializable view of a ranked task.
#[derive(Debug, Serialize)]
struct RankedSummary {
    id: String,
    title: String,
    status: TaskStatus,
    priority: Priority,
    effective_priority: Priority,
    reason: PickReason,
    unblocker: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    area: String,
    path: PathBuf,
}

impl From<&RankedTask<'_>> for RankedSummary {
    fn from(ranked: &RankedTask<'_>) -> Self {
        let task = ranked.task;
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            priority: task.priority,
            effective_priority: ranked.effective_priority,
            reason: ranked.reason,
            unblocker: task.unblocker,
            order: task.order,
            area: task.area.clone(),
            path: task.path.clone(),
        }
    }
}

/// One-line rendering used by `next` and `list`.
fn ranked_line(ranked: &RankedTask<'_>) -> String {
    let task = ranked.task;
    let mut line = format!("{} [{}] {}", task.id, ranked.effective_priority, task.status);
    if !task.title.is_empty() {
        line.push_str(&format!(" {}", task.title));
    }
    if task.unblocker {
        line.push_str(" (unblocker)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tg", "list", "--status", "in_progress", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::List { status, unblockers } => {
                assert_eq!(status, Some(TaskStatus::InProgress));
                assert!(!unblockers);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(Cli::try_parse_from(["tg", "status", "T-1", "closed"]).is_err());
    }

    #[test]
    fn refresh_conflicts_with_no_cache() {
        assert!(Cli::try_parse_from(["tg", "next", "--refresh", "--no-cache"]).is_err());
    }
}
