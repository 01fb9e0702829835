//! Filesystem and clock seams.
//!
//! The loader and cache only touch the outside world through [`FileSystem`]
//! and [`Clock`], so tests can run against [`MemoryFileSystem`] with
//! controlled mtimes and lock contention.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};
use crate::lock::{self, FileLock};

mod memory;

pub use memory::{default_mtime, MemoryFileSystem, MemoryLock};

/// Marker for a held lock; dropping it releases the lock.
pub trait HeldLock: Debug + Send {}

impl HeldLock for FileLock {}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn modified(&self, path: &Path) -> Result<DateTime<Utc>>;
    fn exists(&self, path: &Path) -> bool;

    /// Files under `root` whose root-relative path matches any pattern.
    ///
    /// A missing root yields no files. Results are sorted.
    fn find_files(&self, root: &Path, patterns: &[Pattern]) -> Result<Vec<PathBuf>>;

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Take an exclusive lock on `path`, waiting at most `timeout_ms`.
    fn lock(&self, path: &Path, timeout_ms: u64) -> Result<Box<dyn HeldLock>>;
}

/// Source of "now" for index timestamps.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compile glob patterns, reporting the first bad one as a config error.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw).map_err(|e| {
                Error::InvalidConfig(format!("invalid file pattern '{raw}': {e}"))
            })
        })
        .collect()
}

/// Match a root-relative path (with `/` separators) against any pattern.
pub(crate) fn matches_any(relative: &Path, patterns: &[Pattern]) -> bool {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    patterns
        .iter()
        .any(|pattern| pattern.matches_with(&relative, MATCH_OPTIONS))
}

/// Implementation backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn find_files(&self, root: &Path, patterns: &[Pattern]) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() || path.is_file() {
                    let relative = path.strip_prefix(root).unwrap_or(&path);
                    if matches_any(relative, patterns) {
                        found.push(path);
                    }
                }
            }
        }

        found.sort();
        Ok(found)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        lock::write_atomic(path, data)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(fs::remove_file(path)?)
    }

    fn lock(&self, path: &Path, timeout_ms: u64) -> Result<Box<dyn HeldLock>> {
        Ok(Box::new(FileLock::acquire(path, timeout_ms)?))
    }
}
