//! tg cache command implementation

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::output::HumanReport;

use super::{open_loader, CommonOptions};

/// Options for the cache subcommands
pub struct CacheOptions {
    pub common: CommonOptions,
}

#[derive(Serialize)]
struct CacheStatusReport {
    path: PathBuf,
    enabled: bool,
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_at: Option<DateTime<Utc>>,
    entries: usize,
    archived: usize,
}

#[derive(Serialize)]
struct CacheClearReport {
    path: PathBuf,
    removed: bool,
}

pub fn run_status(options: CacheOptions) -> Result<()> {
    let loader = open_loader(&options.common)?;
    let cache = loader.cache();
    let index = cache.load()?;

    let report = CacheStatusReport {
        path: cache.path().to_path_buf(),
        enabled: loader.config().cache.enabled,
        present: index.is_some(),
        version: index.as_ref().map(|index| index.version),
        generated_at: index.as_ref().map(|index| index.generated_at),
        entries: index.as_ref().map_or(0, |index| index.entries.len()),
        archived: index.as_ref().map_or(0, |index| index.archived_count),
    };

    let mut human = HumanReport::new(if report.present {
        "Task index present"
    } else {
        "No usable task index"
    });
    human.fact("path", report.path.display());
    human.fact("enabled", report.enabled);
    if let Some(generated_at) = report.generated_at {
        human.fact("generated", generated_at.to_rfc3339());
        human.fact("entries", report.entries);
        human.fact("archived", report.archived);
    } else {
        human.hint("tg list --refresh");
    }

    options.common.printer("cache status").success(&report, &human)
}

pub fn run_clear(options: CacheOptions) -> Result<()> {
    let loader = open_loader(&options.common)?;
    let cache = loader.cache();
    let removed = cache.clear()?;

    let report = CacheClearReport {
        path: cache.path().to_path_buf(),
        removed,
    };
    let human = HumanReport::new(if removed {
        format!("Removed {}", report.path.display())
    } else {
        format!("No index at {}", report.path.display())
    });
    options.common.printer("cache clear").success(&report, &human)
}
