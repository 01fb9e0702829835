//! Task discovery and loading.
//!
//! Scans the active and archive roots for task files, goes through the index
//! cache when enabled and parses whatever the cache could not answer. Task
//! paths in the result are relative to the repository root.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::archive::ArchiveMatcher;
use crate::cache::{fingerprint, CacheStats, SkippedFile, TaskCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs::{compile_patterns, Clock, FileSystem};
use crate::task::{Task, TaskFile, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Go through the index cache (still subject to `cache.enabled`).
    pub use_cache: bool,
    /// Ignore the stored index and rebuild it.
    pub force_refresh: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Loaded tasks, ordered by path.
    pub tasks: Vec<Task>,
    pub archived_count: usize,
    pub skipped: Vec<SkippedFile>,
    /// Cache counters; `None` when the load bypassed the cache.
    pub stats: Option<CacheStats>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TaskLoader {
    repo_root: PathBuf,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl TaskLoader {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            fs,
            clock,
            config,
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn archive_matcher(&self) -> ArchiveMatcher {
        self.config.archive_matcher()
    }

    /// Cache handle for the configured index file.
    pub fn cache(&self) -> TaskCache {
        TaskCache::new(
            self.repo_root.join(&self.config.cache.path),
            Arc::clone(&self.fs),
            Arc::clone(&self.clock),
        )
        .with_root(&self.repo_root)
        .with_lock_timeout_ms(self.config.cache.lock_timeout_ms)
        .with_archive_matcher(self.archive_matcher())
    }

    /// Task files under the active and archive roots, de-duplicated and sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let patterns = compile_patterns(&self.config.tasks.patterns)?;
        let mut files = BTreeSet::new();
        for root in [&self.config.tasks.root, &self.config.tasks.archive] {
            let root = self.repo_root.join(root);
            files.extend(self.fs.find_files(&root, &patterns)?);
        }
        debug!(files = files.len(), "discovered task files");
        Ok(files.into_iter().collect())
    }

    pub fn load(&self, options: LoadOptions) -> Result<LoadReport> {
        let files = self.discover()?;
        let mut warnings = Vec::new();

        if options.use_cache && self.config.cache.enabled {
            let cache = self.cache();
            match cache.refresh(&files, options.force_refresh, |path, data, hash, mtime| {
                self.parse_task(path, data, hash, mtime)
            }) {
                Ok(refreshed) => {
                    if refreshed.stats.rebuilt {
                        info!(tasks = refreshed.tasks.len(), "rebuilt task index");
                    }
                    return Ok(self.report(
                        refreshed.tasks,
                        refreshed.skipped,
                        Some(refreshed.stats),
                        warnings,
                    ));
                }
                Err(err) => {
                    warn!(error = %err, "task index unavailable; loading without cache");
                    warnings.push(format!("task index unavailable ({err}); loaded without cache"));
                }
            }
        }

        let (tasks, skipped) = self.load_uncached(&files);
        Ok(self.report(tasks, skipped, None, warnings))
    }

    /// Parse one task file into a task with a repo-relative path.
    pub fn parse_task(
        &self,
        path: &Path,
        data: &[u8],
        hash: String,
        mtime: DateTime<Utc>,
    ) -> Result<Task> {
        TaskFile::parse(data)?.into_task(self.relative_path(path), hash, mtime)
    }

    /// Absolute location of a loaded task's file.
    pub fn task_file_path(&self, task: &Task) -> PathBuf {
        self.repo_root.join(&task.path)
    }

    /// Rewrite a task file with a new status, keeping every other key.
    ///
    /// The transition is checked against the lifecycle rules first, and
    /// archived tasks are refused.
    pub fn rewrite_status(&self, task: &Task, status: TaskStatus) -> Result<PathBuf> {
        if self.archive_matcher().is_archived(&task.path) {
            return Err(Error::ArchivedTask(task.id.clone()));
        }
        let status = task.transition(status)?;

        let path = self.task_file_path(task);
        let mut file = TaskFile::parse(&self.fs.read(&path)?)?;
        file.status = status;
        self.fs.write_atomic(&path, file.to_yaml()?.as_bytes())?;
        info!(task = %task.id, status = %status, path = %path.display(), "updated task status");
        Ok(path)
    }

    fn load_uncached(&self, files: &[PathBuf]) -> (Vec<Task>, Vec<SkippedFile>) {
        let mut tasks = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();

        for path in files {
            let parsed = self.fs.modified(path).and_then(|mtime| {
                let data = self.fs.read(path)?;
                let hash = fingerprint(&data);
                self.parse_task(path, &data, hash, mtime)
            });
            match parsed {
                Ok(task) => tasks.push(task),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping task file");
                    skipped.push(SkippedFile {
                        path: path.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        (tasks, skipped)
    }

    fn report(
        &self,
        tasks: Vec<Task>,
        skipped: Vec<SkippedFile>,
        stats: Option<CacheStats>,
        warnings: Vec<String>,
    ) -> LoadReport {
        let matcher = self.archive_matcher();
        let archived_count = tasks
            .iter()
            .filter(|task| matcher.is_archived(&task.path))
            .count();
        let skipped = skipped
            .into_iter()
            .map(|file| SkippedFile {
                path: self.relative_path(&file.path),
                reason: file.reason,
            })
            .collect();

        LoadReport {
            tasks,
            archived_count,
            skipped,
            stats,
            warnings,
        }
    }

    fn relative_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.repo_root)
            .unwrap_or(path)
            .to_path_buf()
    }
}
