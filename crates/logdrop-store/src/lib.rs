//! logdrop Store - On-disk stages of the pipeline
//!
//! - [`CacheDirectory`]: shared pool, one file per pending message
//! - [`StagingArea`]: one worker's private claim directory, entered by atomic rename
//! - [`LogStore`]: append-only `YYYYMMDD-LL-facility` files
//! - [`LogQuery`]: read-side counting over finished log files
//!
//! No locks are taken anywhere: ownership of a message moves with its file.

mod cache;
mod query;
mod staging;
mod sweep;
mod writer;

pub use cache::CacheDirectory;
pub use query::LogQuery;
pub use staging::{ClaimError, StagedEntry, StagingArea};
pub use sweep::{sweep_stale_days, SweepReport};
pub use writer::{AppendError, AppendSession, LogStore};

use std::fs;
use std::path::Path;

/// File names in a directory, skipping dotfiles and anything that is not a regular file
pub(crate) fn list_file_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        // An entry may vanish between listing and stat when another worker claims it
        match entry.file_type() {
            Ok(t) if t.is_file() => names.push(name),
            _ => {}
        }
    }
    names.sort();
    Ok(names)
}
