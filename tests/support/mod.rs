#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::Utc;
use tempfile::TempDir;

use taskgraph::task::{Priority, Task, TaskStatus};

/// A throwaway repository with a `tasks/` backlog.
pub struct TestBacklog {
    dir: TempDir,
}

impl TestBacklog {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        fs::create_dir_all(dir.path().join("tasks")).expect("create tasks dir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write `tasks/<name>.yaml`.
    pub fn write_task(&self, name: &str, yaml: &str) -> std::io::Result<PathBuf> {
        self.write_file(&format!("tasks/{name}.yaml"), yaml)
    }

    /// Write `tasks/archive/<name>.yaml`.
    pub fn write_archived(&self, name: &str, yaml: &str) -> std::io::Result<PathBuf> {
        self.write_file(&format!("tasks/archive/{name}.yaml"), yaml)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        self.write_file(".taskgraph.toml", contents)
    }

    pub fn read_file(&self, rel_path: &str) -> std::io::Result<String> {
        fs::read_to_string(self.dir.path().join(rel_path))
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.path().join(".taskgraph").join("index.json")
    }

    /// `tg` command rooted at this backlog.
    pub fn tg(&self) -> Command {
        let mut cmd = tg_cmd();
        cmd.current_dir(self.path());
        cmd
    }
}

pub fn tg_cmd() -> Command {
    let mut cmd = Command::cargo_bin("tg").expect("binary");
    cmd.env_remove("TASKGRAPH_REPO");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Builder for in-memory tasks in library-level tests.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: Task {
                id: id.to_string(),
                title: format!("Task {id}"),
                status: TaskStatus::Todo,
                priority: Priority::P2,
                area: String::new(),
                path: PathBuf::from(format!("tasks/{id}.yaml")),
                order: None,
                blocked_by: Vec::new(),
                depends_on: Vec::new(),
                unblocker: false,
                hash: String::new(),
                mtime: Utc::now(),
            },
        }
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.task.order = Some(order);
        self
    }

    pub fn unblocker(mut self) -> Self {
        self.task.unblocker = true;
        self
    }

    pub fn blocked_by(mut self, ids: &[&str]) -> Self {
        self.task.blocked_by = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.task.depends_on = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Store the task under the default archive directory.
    pub fn archived(mut self) -> Self {
        self.task.path = PathBuf::from(format!("tasks/archive/{}.yaml", self.task.id));
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}
