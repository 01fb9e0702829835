//! Archive detection.
//!
//! Completed tasks are moved into an archive directory and become immutable
//! history. A task is considered archived purely from the shape of its path:
//! the configured archive location must appear as whole path segments with
//! at least one more segment below it. This is a heuristic; if the storage
//! layout changes, this predicate is the only thing that needs to follow.

use std::path::Path;

/// Default archive location, relative to the repository root.
pub const DEFAULT_ARCHIVE_DIR: &str = "tasks/archive";

/// Matches task paths that live under the archive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMatcher {
    segments: Vec<String>,
}

impl ArchiveMatcher {
    pub fn new(archive_dir: impl AsRef<Path>) -> Self {
        Self {
            segments: normalized_segments(&archive_dir.as_ref().to_string_lossy()),
        }
    }

    /// Whether `path` points at something stored under the archive directory.
    ///
    /// Works for absolute and repo-relative paths with either separator.
    pub fn is_archived(&self, path: impl AsRef<Path>) -> bool {
        if self.segments.is_empty() {
            return false;
        }
        let path_segments = normalized_segments(&path.as_ref().to_string_lossy());
        let width = self.segments.len();
        if path_segments.len() <= width {
            return false;
        }

        // The archive dir must be followed by at least one more segment.
        path_segments[..path_segments.len() - 1]
            .windows(width)
            .any(|window| window == self.segments.as_slice())
    }
}

impl Default for ArchiveMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_DIR)
    }
}

/// Archive check against the default archive location.
pub fn is_archived(path: impl AsRef<Path>) -> bool {
    ArchiveMatcher::default().is_archived(path)
}

fn normalized_segments(raw: &str) -> Vec<String> {
    raw.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(str::to_string)
        .collect()
}
