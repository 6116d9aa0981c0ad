//! Removal of stale staging directories
//!
//! Only empty directories are ever removed (`remove_dir` refuses anything
//! else), so staged messages of a crashed worker stay on disk until an
//! operator deals with them.

use logdrop_core::{Day, Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Directories deleted
    pub removed: Vec<PathBuf>,
    /// Stale directories kept because they still hold entries (or could not be removed)
    pub retained: Vec<PathBuf>,
}

/// Remove empty worker directories (and then day directories) at least `stale_after_days` old
///
/// Failure to list the staging root itself is an error; everything below it
/// is best-effort.
pub fn sweep_stale_days(staging_root: &Path, today: Day, stale_after_days: u32) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    // Nothing can be older than the start of the calendar
    let Some(cutoff) = today.minus_days(stale_after_days.saturating_sub(1)) else {
        return Ok(report);
    };

    let entries = fs::read_dir(staging_root).map_err(|e| Error::unreachable(staging_root, e))?;
    for entry in entries.flatten() {
        let Some(day) = entry
            .file_name()
            .to_str()
            .and_then(|n| n.parse::<Day>().ok())
        else {
            continue;
        };
        if day >= cutoff {
            continue;
        }
        sweep_day(&entry.path(), &mut report);
    }

    if !report.retained.is_empty() {
        warn!(
            "{} stale staging directories still hold entries: {:?}",
            report.retained.len(),
            report.retained
        );
    }
    Ok(report)
}

fn sweep_day(day_dir: &Path, report: &mut SweepReport) {
    match fs::read_dir(day_dir) {
        Ok(workers) => {
            for worker in workers.flatten() {
                remove_empty(&worker.path(), report);
            }
        }
        Err(e) => debug!("Cannot list {}: {}", day_dir.display(), e),
    }
    remove_empty(day_dir, report);
}

fn remove_empty(dir: &Path, report: &mut SweepReport) {
    match fs::remove_dir(dir) {
        Ok(()) => {
            debug!("Removed stale staging directory {}", dir.display());
            report.removed.push(dir.to_path_buf());
        }
        Err(e) => {
            debug!("Keeping {}: {}", dir.display(), e);
            report.retained.push(dir.to_path_buf());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(s: &str) -> Day {
        s.parse().unwrap()
    }

    #[test]
    fn test_removes_empty_stale_days() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("20240101/100-0")).unwrap();
        fs::create_dir_all(root.join("20240101/200-0")).unwrap();

        let report = sweep_stale_days(root, day("20240110"), 2).unwrap();

        assert!(!root.join("20240101").exists());
        assert_eq!(report.removed.len(), 3);
        assert!(report.retained.is_empty());
    }

    #[test]
    fn test_keeps_today_and_yesterday() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for d in ["20240108", "20240109", "20240110"] {
            fs::create_dir_all(root.join(d).join("1-0")).unwrap();
        }

        let report = sweep_stale_days(root, day("20240110"), 2).unwrap();

        assert!(!root.join("20240108").exists());
        assert!(root.join("20240109/1-0").exists());
        assert!(root.join("20240110/1-0").exists());
        assert_eq!(report.removed.len(), 2);
    }

    #[test]
    fn test_never_deletes_directories_with_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("20240101/100-0")).unwrap();
        fs::create_dir_all(root.join("20240101/200-0")).unwrap();
        let orphan = root.join("20240101/100-0/20240101-120000.000000-40-auth");
        fs::write(&orphan, b"unflushed\n").unwrap();

        let report = sweep_stale_days(root, day("20240110"), 2).unwrap();

        assert!(orphan.exists());
        assert!(!root.join("20240101/200-0").exists());
        assert_eq!(report.removed, vec![root.join("20240101/200-0")]);
        assert_eq!(
            report.retained,
            vec![root.join("20240101/100-0"), root.join("20240101")]
        );
    }

    #[test]
    fn test_ignores_foreign_names() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lost+found")).unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let report = sweep_stale_days(root, day("20240110"), 2).unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(root.join("lost+found").exists());
    }

    #[test]
    fn test_threshold_beyond_calendar_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("20240101/1-0")).unwrap();

        let report = sweep_stale_days(root, day("20240110"), u32::MAX).unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(root.join("20240101/1-0").exists());
    }

    #[test]
    fn test_longer_threshold() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("20240108")).unwrap();

        sweep_stale_days(root, day("20240110"), 3).unwrap();
        assert!(root.join("20240108").exists());

        sweep_stale_days(root, day("20240111"), 3).unwrap();
        assert!(!root.join("20240108").exists());
    }

    #[test]
    fn test_missing_root_is_unreachable() {
        let result = sweep_stale_days(Path::new("/nonexistent/staging"), day("20240110"), 2);
        assert!(matches!(result, Err(Error::Unreachable { .. })));
    }
}
