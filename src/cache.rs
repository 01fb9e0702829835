//! Persisted task index.
//!
//! The index maps each task file, by its path relative to the cache root, to
//! the parsed task plus the file's mtime and blake3 fingerprint. Keys do not
//! depend on how the root was spelled (`.`, relative or absolute). A file is re-parsed only when both its mtime and
//! its content changed; a touched-but-identical file is a hit with the new
//! mtime recorded. A missing, malformed or version-mismatched index is
//! rebuilt from scratch, never an error.
//!
//! Every read and write happens under `<index>.lock`. The lock wait is
//! bounded; a timeout surfaces as [`Error::LockFailed`] and callers fall
//! back to an uncached load.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::ArchiveMatcher;
use crate::error::{Error, Result};
use crate::fs::{Clock, FileSystem, HeldLock};
use crate::lock::{lock_path_for, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::Task;

/// Bumped whenever the on-disk index layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 2;

/// Hex blake3 digest of file contents.
pub fn fingerprint(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the cache root.
    pub path: PathBuf,
    pub hash: String,
    pub mtime: DateTime<Utc>,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIndex {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub archived_count: usize,
    /// Keyed by root-relative path with `/` separators.
    pub entries: BTreeMap<String, IndexEntry>,
}

/// Counters for one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub removed: usize,
    /// No usable index existed (or a rebuild was forced).
    pub rebuilt: bool,
}

/// A task file that could not be turned into a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of [`TaskCache::refresh`].
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub index: TaskIndex,
    /// Tasks in the order of the input file list.
    pub tasks: Vec<Task>,
    pub skipped: Vec<SkippedFile>,
    pub stats: CacheStats,
}

/// Index cache bound to one index file.
#[derive(Debug, Clone)]
pub struct TaskCache {
    path: PathBuf,
    lock_path: PathBuf,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    lock_timeout_ms: u64,
    archive: ArchiveMatcher,
}

impl TaskCache {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        Self {
            lock_path: lock_path_for(&path),
            path,
            root: PathBuf::new(),
            fs,
            clock,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            archive: ArchiveMatcher::default(),
        }
    }

    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    /// Directory that entry keys are relative to. Files outside it are keyed
    /// by their full path.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_archive_matcher(mut self, archive: ArchiveMatcher) -> Self {
        self.archive = archive;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<Box<dyn HeldLock>> {
        self.fs.lock(&self.lock_path, self.lock_timeout_ms).map_err(|err| {
            if matches!(err, Error::LockFailed(_)) {
                warn!(
                    path = %self.lock_path.display(),
                    timeout_ms = self.lock_timeout_ms,
                    "timed out waiting for index lock"
                );
            }
            err
        })
    }

    /// Read the persisted index, if there is a usable one.
    pub fn load(&self) -> Result<Option<TaskIndex>> {
        let _lock = self.lock()?;
        Ok(self.read_index())
    }

    /// Remove the index file. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        let _lock = self.lock()?;
        if !self.fs.exists(&self.path) {
            return Ok(false);
        }
        self.fs.remove_file(&self.path)?;
        info!(path = %self.path.display(), "cleared task index");
        Ok(true)
    }

    /// Bring the index in line with `files`, parsing only what changed.
    ///
    /// `parse` turns `(path, contents, fingerprint, mtime)` into a task.
    /// Files that cannot be read or parsed are skipped and reported. The
    /// index is written back only when something changed.
    pub fn refresh<F>(&self, files: &[PathBuf], force: bool, mut parse: F) -> Result<Refreshed>
    where
        F: FnMut(&Path, &[u8], String, DateTime<Utc>) -> Result<Task>,
    {
        let _lock = self.lock()?;

        let previous = if force { None } else { self.read_index() };
        let mut stats = CacheStats {
            rebuilt: previous.is_none(),
            ..CacheStats::default()
        };
        let cached: HashMap<&str, &IndexEntry> = previous
            .iter()
            .flat_map(|index| index.entries.iter())
            .map(|(key, entry)| (key.as_str(), entry))
            .collect();

        let mut tasks = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();
        let mut entries: BTreeMap<String, IndexEntry> = BTreeMap::new();
        let mut dirty = stats.rebuilt;

        for path in files {
            let mtime = match self.fs.modified(path) {
                Ok(mtime) => mtime,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable task file");
                    skipped.push(SkippedFile {
                        path: path.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let key = self.entry_key(path);
            let entry = cached.get(key.as_str()).copied();

            let (task, hash) = match entry {
                Some(entry) if entry.mtime == mtime => {
                    debug!(path = %path.display(), "index hit");
                    stats.hits += 1;
                    (entry.task.clone(), entry.hash.clone())
                }
                _ => {
                    let data = match self.fs.read(path) {
                        Ok(data) => data,
                        Err(err) => {
                            warn!(path = %path.display(), error = %err, "skipping unreadable task file");
                            skipped.push(SkippedFile {
                                path: path.clone(),
                                reason: err.to_string(),
                            });
                            continue;
                        }
                    };
                    let hash = fingerprint(&data);
                    dirty = true;

                    match entry {
                        Some(entry) if entry.hash == hash => {
                            debug!(path = %path.display(), "index hit after touch");
                            stats.hits += 1;
                            let mut task = entry.task.clone();
                            task.mtime = mtime;
                            (task, hash)
                        }
                        _ => {
                            debug!(path = %path.display(), "index miss");
                            stats.misses += 1;
                            match parse(path, &data, hash.clone(), mtime) {
                                Ok(task) => (task, hash),
                                Err(err) => {
                                    warn!(path = %path.display(), error = %err, "skipping unparsable task file");
                                    skipped.push(SkippedFile {
                                        path: path.clone(),
                                        reason: err.to_string(),
                                    });
                                    continue;
                                }
                            }
                        }
                    }
                }
            };

            entries.insert(
                key.clone(),
                IndexEntry {
                    path: PathBuf::from(&key),
                    hash,
                    mtime,
                    task: task.clone(),
                },
            );
            tasks.push(task);
        }

        if let Some(previous) = &previous {
            let current: HashSet<String> = files.iter().map(|path| self.entry_key(path)).collect();
            stats.removed = previous
                .entries
                .keys()
                .filter(|key| !current.contains(*key))
                .count();
            if stats.removed > 0 {
                dirty = true;
            }
        }

        let archived_count = tasks
            .iter()
            .filter(|task| self.archive.is_archived(&task.path))
            .count();
        let index = match previous {
            Some(previous) if !dirty => previous,
            _ => TaskIndex {
                version: CACHE_FORMAT_VERSION,
                generated_at: self.clock.now(),
                archived_count,
                entries,
            },
        };

        if dirty {
            self.write_index(&index)?;
        }

        debug!(
            hits = stats.hits,
            misses = stats.misses,
            removed = stats.removed,
            rebuilt = stats.rebuilt,
            skipped = skipped.len(),
            "refreshed task index"
        );
        Ok(Refreshed {
            index,
            tasks,
            skipped,
            stats,
        })
    }

    /// Stable key for a task file: root-relative, `.` segments dropped.
    fn entry_key(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut key = String::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::RootDir => key.push('/'),
                other => {
                    if !key.is_empty() && !key.ends_with('/') {
                        key.push('/');
                    }
                    key.push_str(&other.as_os_str().to_string_lossy());
                }
            }
        }
        key
    }

    fn read_index(&self) -> Option<TaskIndex> {
        if !self.fs.exists(&self.path) {
            return None;
        }
        let data = match self.fs.read(&self.path) {
            Ok(data) => data,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "cannot read task index; rebuilding");
                return None;
            }
        };
        let index: TaskIndex = match serde_json::from_slice(&data) {
            Ok(index) => index,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "task index is malformed; rebuilding");
                return None;
            }
        };
        if index.version != CACHE_FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                found = index.version,
                expected = CACHE_FORMAT_VERSION,
                "task index version mismatch; rebuilding"
            );
            return None;
        }
        Some(index)
    }

    fn write_index(&self, index: &TaskIndex) -> Result<()> {
        let data = serde_json::to_vec_pretty(index)?;
        self.fs.write_atomic(&self.path, &data)?;
        info!(
            path = %self.path.display(),
            entries = index.entries.len(),
            "wrote task index"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{default_mtime, FixedClock, MemoryFileSystem};
    use crate::task::TaskFile;

    const INDEX: &str = "/repo/.taskgraph/index.json";

    fn setup() -> (MemoryFileSystem, TaskCache) {
        let fs = MemoryFileSystem::new();
        let cache = TaskCache::new(
            INDEX,
            Arc::new(fs.clone()),
            Arc::new(FixedClock(default_mtime())),
        )
        .with_root("/repo");
        (fs, cache)
    }

    fn parse(path: &Path, data: &[u8], hash: String, mtime: DateTime<Utc>) -> Result<Task> {
        TaskFile::parse(data)?.into_task(path.to_path_buf(), hash, mtime)
    }

    fn paths(raw: &[&str]) -> Vec<PathBuf> {
        raw.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn first_refresh_rebuilds_and_writes() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        fs.add_file("/repo/tasks/archive/b.yaml", "id: B\nstatus: completed\n");

        let files = paths(&["/repo/tasks/a.yaml", "/repo/tasks/archive/b.yaml"]);
        let refreshed = cache.refresh(&files, false, parse).unwrap();

        assert!(refreshed.stats.rebuilt);
        assert_eq!(refreshed.stats.misses, 2);
        assert_eq!(refreshed.tasks.len(), 2);
        assert_eq!(refreshed.index.archived_count, 1);
        assert_eq!(refreshed.index.entries["tasks/a.yaml"].hash, fingerprint(b"id: A\n"));
        assert_eq!(fs.write_count(), 1);

        let stored = cache.load().unwrap().unwrap();
        assert_eq!(stored, refreshed.index);
    }

    #[test]
    fn unchanged_files_hit_without_writing() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        let files = paths(&["/repo/tasks/a.yaml"]);
        cache.refresh(&files, false, parse).unwrap();

        let refreshed = cache
            .refresh(&files, false, |_, _, _, _| panic!("should not parse"))
            .unwrap();
        assert_eq!(refreshed.stats.hits, 1);
        assert_eq!(refreshed.stats.misses, 0);
        assert!(!refreshed.stats.rebuilt);
        assert_eq!(fs.write_count(), 1);
    }

    #[test]
    fn touched_identical_file_is_hit_with_new_mtime() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        let files = paths(&["/repo/tasks/a.yaml"]);
        cache.refresh(&files, false, parse).unwrap();

        let later = default_mtime() + chrono::Duration::seconds(30);
        fs.touch("/repo/tasks/a.yaml", later);
        let refreshed = cache
            .refresh(&files, false, |_, _, _, _| panic!("should not parse"))
            .unwrap();

        assert_eq!(refreshed.stats.hits, 1);
        assert_eq!(refreshed.index.entries["tasks/a.yaml"].mtime, later);
        assert_eq!(refreshed.tasks[0].mtime, later);
        assert_eq!(fs.write_count(), 2);
    }

    #[test]
    fn changed_content_is_reparsed() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\ntitle: old\n");
        let files = paths(&["/repo/tasks/a.yaml"]);
        cache.refresh(&files, false, parse).unwrap();

        let later = default_mtime() + chrono::Duration::seconds(30);
        fs.add_file_at("/repo/tasks/a.yaml", "id: A\ntitle: new\n", later);
        let refreshed = cache.refresh(&files, false, parse).unwrap();

        assert_eq!(refreshed.stats.misses, 1);
        assert_eq!(refreshed.tasks[0].title, "new");
        assert_eq!(refreshed.index.entries["tasks/a.yaml"].task.title, "new");
    }

    #[test]
    fn removed_files_are_dropped() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        fs.add_file("/repo/tasks/b.yaml", "id: B\n");
        cache
            .refresh(&paths(&["/repo/tasks/a.yaml", "/repo/tasks/b.yaml"]), false, parse)
            .unwrap();

        fs.remove("/repo/tasks/b.yaml");
        let refreshed = cache
            .refresh(&paths(&["/repo/tasks/a.yaml"]), false, parse)
            .unwrap();
        assert_eq!(refreshed.stats.removed, 1);
        assert!(!refreshed.index.entries.contains_key("tasks/b.yaml"));
    }

    #[test]
    fn keys_ignore_how_the_root_is_spelled() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        fs.add_file("./tasks/a.yaml", "id: A\n");
        let clock = Arc::new(FixedClock(default_mtime()));
        let absolute = TaskCache::new(INDEX, Arc::new(fs.clone()), clock.clone()).with_root("/repo");
        let dotted = TaskCache::new(INDEX, Arc::new(fs.clone()), clock).with_root(".");

        absolute
            .refresh(&paths(&["/repo/tasks/a.yaml"]), false, parse)
            .unwrap();
        let refreshed = dotted
            .refresh(&paths(&["./tasks/a.yaml"]), false, |_, _, _, _| {
                panic!("should not parse")
            })
            .unwrap();

        assert_eq!(refreshed.stats.hits, 1);
        assert_eq!(refreshed.stats.removed, 0);
        assert_eq!(fs.write_count(), 1);
        assert!(refreshed.index.entries.contains_key("tasks/a.yaml"));
    }

    #[test]
    fn duplicate_ids_settle_in_the_index() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        fs.add_file("/repo/tasks/a-copy.yaml", "id: A\n");
        let files = paths(&["/repo/tasks/a-copy.yaml", "/repo/tasks/a.yaml"]);

        let first = cache.refresh(&files, false, parse).unwrap();
        assert_eq!(first.index.entries.len(), 2);
        assert_eq!(first.tasks.len(), 2);

        let second = cache
            .refresh(&files, false, |_, _, _, _| panic!("should not parse"))
            .unwrap();
        assert_eq!(second.stats.hits, 2);
        assert_eq!(second.tasks.len(), 2);
        assert_eq!(fs.write_count(), 1);
    }

    #[test]
    fn malformed_or_stale_index_is_rebuilt() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        let files = paths(&["/repo/tasks/a.yaml"]);

        fs.add_file(INDEX, "{ not json");
        assert!(cache.load().unwrap().is_none());
        assert!(cache.refresh(&files, false, parse).unwrap().stats.rebuilt);

        let mut index = cache.load().unwrap().unwrap();
        index.version = CACHE_FORMAT_VERSION + 1;
        fs.add_file(INDEX, serde_json::to_vec(&index).unwrap());
        assert!(cache.load().unwrap().is_none());
        assert!(cache.refresh(&files, false, parse).unwrap().stats.rebuilt);
    }

    #[test]
    fn force_rebuilds_a_good_index() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        let files = paths(&["/repo/tasks/a.yaml"]);
        cache.refresh(&files, false, parse).unwrap();

        let refreshed = cache.refresh(&files, true, parse).unwrap();
        assert!(refreshed.stats.rebuilt);
        assert_eq!(refreshed.stats.misses, 1);
    }

    #[test]
    fn unparsable_files_are_skipped() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        fs.add_file("/repo/tasks/bad.yaml", "id: [unterminated\n");

        let refreshed = cache
            .refresh(&paths(&["/repo/tasks/a.yaml", "/repo/tasks/bad.yaml"]), false, parse)
            .unwrap();
        assert_eq!(refreshed.tasks.len(), 1);
        assert_eq!(refreshed.skipped.len(), 1);
        assert_eq!(refreshed.skipped[0].path, PathBuf::from("/repo/tasks/bad.yaml"));
    }

    #[test]
    fn held_lock_fails_fast() {
        let (fs, cache) = setup();
        let _held = fs.hold_lock(lock_path_for(INDEX)).unwrap();

        assert!(matches!(cache.load(), Err(Error::LockFailed(_))));
        assert!(matches!(
            cache.refresh(&[], false, parse),
            Err(Error::LockFailed(_))
        ));
        assert_eq!(fs.write_count(), 0);
    }

    #[test]
    fn clear_removes_index() {
        let (fs, cache) = setup();
        fs.add_file("/repo/tasks/a.yaml", "id: A\n");
        cache
            .refresh(&paths(&["/repo/tasks/a.yaml"]), false, parse)
            .unwrap();

        assert!(cache.clear().unwrap());
        assert!(!fs.exists(Path::new(INDEX)));
        assert!(!cache.clear().unwrap());
    }
}
