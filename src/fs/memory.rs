//! In-memory filesystem for tests.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use glob::Pattern;

use super::{matches_any, FileSystem, HeldLock};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, MemoryFile>,
    locks: HashSet<PathBuf>,
    writes: usize,
}

/// Shared in-memory filesystem. Clones see the same files.
///
/// Locks never wait: a held lock makes [`FileSystem::lock`] fail at once
/// with [`Error::LockFailed`], as a real lock would after its timeout.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<State>>,
}

/// Lock handle from [`MemoryFileSystem`]; releases on drop.
#[derive(Debug)]
pub struct MemoryLock {
    path: PathBuf,
    state: Arc<Mutex<State>>,
}

impl HeldLock for MemoryLock {}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        lock_state(&self.state).locks.remove(&self.path);
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn not_found(path: &Path) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    ))
}

/// Modification time given to files added without one.
pub fn default_mtime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Add or replace a file with the default mtime.
    pub fn add_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        self.add_file_at(path, data, default_mtime());
    }

    /// Add or replace a file with an explicit mtime.
    pub fn add_file_at(
        &self,
        path: impl AsRef<Path>,
        data: impl Into<Vec<u8>>,
        modified: DateTime<Utc>,
    ) {
        self.state().files.insert(
            path.as_ref().to_path_buf(),
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
    }

    /// Change a file's mtime without touching its content.
    pub fn touch(&self, path: impl AsRef<Path>, modified: DateTime<Utc>) {
        if let Some(file) = self.state().files.get_mut(path.as_ref()) {
            file.modified = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state().files.remove(path.as_ref());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state()
            .files
            .get(path.as_ref())
            .map(|file| file.data.clone())
    }

    /// Number of `write_atomic` calls so far.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Hold a lock from outside, as a competing process would.
    pub fn hold_lock(&self, path: impl AsRef<Path>) -> Option<MemoryLock> {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state();
        if !state.locks.insert(path.clone()) {
            return None;
        }
        Some(MemoryLock {
            path,
            state: Arc::clone(&self.state),
        })
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.contents(path).ok_or_else(|| not_found(path))
    }

    fn modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        self.state()
            .files
            .get(path)
            .map(|file| file.modified)
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    fn find_files(&self, root: &Path, patterns: &[Pattern]) -> Result<Vec<PathBuf>> {
        let state = self.state();
        Ok(state
            .files
            .keys()
            .filter(|path| {
                path.strip_prefix(root)
                    .map(|relative| matches_any(relative, patterns))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.writes += 1;
        state.files.insert(
            path.to_path_buf(),
            MemoryFile {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.state()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn lock(&self, path: &Path, _timeout_ms: u64) -> Result<Box<dyn HeldLock>> {
        self.hold_lock(path)
            .map(|lock| Box::new(lock) as Box<dyn HeldLock>)
            .ok_or_else(|| Error::LockFailed(path.to_path_buf()))
    }
}
