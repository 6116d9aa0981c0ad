//! Per-worker staging directories
//!
//! A worker claims a cache entry by renaming it into
//! `<staging>/<YYYYMMDD>/<worker-id>/`. Rename is atomic, so exactly one
//! worker wins each entry; the loser sees the source gone.
//!
//! Rename replaces an existing destination, and a cache name can be reused once
//! its first holder has been claimed. The destination is therefore always a
//! free name: the worker is the only writer of its own directory, so a name
//! found free stays free until the rename lands.

use logdrop_core::{CacheEntryName, Day, Error, Result, WorkerId};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cache::CacheDirectory;
use crate::list_file_names;

/// Failure to claim a cache entry
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// Another worker renamed the entry first, or it was never there
    #[error("Entry already claimed: {0}")]
    AlreadyClaimed(CacheEntryName),

    #[error("Failed to claim {name}: {source}")]
    Io {
        name: CacheEntryName,
        source: io::Error,
    },
}

/// A message owned by one worker, waiting to be appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    name: CacheEntryName,
    path: PathBuf,
}

impl StagedEntry {
    pub fn name(&self) -> &CacheEntryName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw content, exactly as the ingestion endpoint wrote it
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Delete the staged copy once its content is safely appended
    pub fn remove(&self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

/// One worker's private claim directory
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
    worker: WorkerId,
    day: Day,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>, worker: WorkerId, day: Day) -> Self {
        Self {
            root: root.into(),
            worker,
            day,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn day(&self) -> Day {
        self.day
    }

    /// `<staging>/<day>/<worker-id>/`
    pub fn dir(&self) -> PathBuf {
        Self::dir_for(&self.root, self.day, self.worker)
    }

    fn dir_for(root: &Path, day: Day, worker: WorkerId) -> PathBuf {
        root.join(day.to_string()).join(worker.to_string())
    }

    /// Create the staging directory if needed (idempotent)
    pub fn ensure(&self) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| Error::unreachable(dir, e))
    }

    /// Switch to a new day's directory, carrying over anything left in the old one
    ///
    /// Returns the number of entries carried over.
    pub fn roll_over(&mut self, today: Day) -> Result<usize> {
        if today == self.day {
            return Ok(0);
        }

        let old_dir = self.dir();
        self.day = today;
        self.ensure()?;
        let new_dir = self.dir();

        let leftovers = match list_file_names(&old_dir) {
            Ok(names) => names,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::unreachable(old_dir, e)),
        };

        let mut moved = 0;
        for file_name in &leftovers {
            let Ok(name) = file_name.parse::<CacheEntryName>() else {
                warn!("Leaving foreign file in staging: {}", old_dir.join(file_name).display());
                continue;
            };
            let carried = free_name(&new_dir, &name)
                .and_then(|to| fs::rename(old_dir.join(file_name), new_dir.join(to.to_string())));
            match carried {
                Ok(()) => moved += 1,
                Err(e) => warn!("Failed to carry {} into {}: {}", file_name, new_dir.display(), e),
            }
        }
        if moved > 0 {
            info!(
                "Worker {} carried {} staged entries into {}",
                self.worker,
                moved,
                new_dir.display()
            );
        }

        // Left in place if anything could not be moved; the stale sweep retries later
        if let Err(e) = fs::remove_dir(&old_dir) {
            debug!("Keeping {}: {}", old_dir.display(), e);
        }
        Ok(moved)
    }

    /// Atomically move a cache entry into this staging directory
    ///
    /// If an earlier entry of the same name is still staged, the claimed copy
    /// gets the next free `-NNNN` suffix instead of replacing it.
    pub fn try_claim(
        &self,
        cache: &CacheDirectory,
        name: &CacheEntryName,
    ) -> std::result::Result<StagedEntry, ClaimError> {
        let io_error = |source: io::Error| ClaimError::Io {
            name: name.clone(),
            source,
        };
        let dir = self.dir();
        let staged_name = free_name(&dir, name).map_err(io_error)?;
        let path = dir.join(staged_name.to_string());
        match fs::rename(cache.entry_path(name), &path) {
            Ok(()) => {
                if staged_name != *name {
                    debug!("Staged {} as {}", name, staged_name);
                }
                Ok(StagedEntry {
                    name: staged_name,
                    path,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ClaimError::AlreadyClaimed(name.clone())),
            Err(source) => Err(io_error(source)),
        }
    }

    /// Entries currently owned by this worker, oldest first
    pub fn list(&self) -> Result<Vec<StagedEntry>> {
        let dir = self.dir();
        let names = list_file_names(&dir).map_err(|e| Error::unreachable(&dir, e))?;
        Ok(names
            .into_iter()
            .filter_map(|n| match n.parse::<CacheEntryName>() {
                Ok(name) => Some(StagedEntry {
                    path: dir.join(&n),
                    name,
                }),
                Err(_) => {
                    warn!("Ignoring foreign file in staging: {}", dir.join(&n).display());
                    None
                }
            })
            .collect())
    }
}

/// First name at or after `name`'s disambiguator that nothing in `dir` occupies
fn free_name(dir: &Path, name: &CacheEntryName) -> io::Result<CacheEntryName> {
    for seq in name.seq..=CacheEntryName::MAX_SEQ {
        let candidate = name.with_seq(seq);
        match fs::symlink_metadata(dir.join(candidate.to_string())) {
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(candidate),
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free staging name for {}", name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logdrop_core::{Facility, Level, MessageRecord};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: CacheDirectory,
        staging_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let staging_root = dir.path().join("staging");
        fs::create_dir_all(&cache_dir).unwrap();
        Fixture {
            cache: CacheDirectory::new(cache_dir),
            staging_root,
            _dir: dir,
        }
    }

    fn store(cache: &CacheDirectory, at: &str) -> CacheEntryName {
        let record = MessageRecord::new(at.parse().unwrap(), Level::WARN, Facility::new("app").unwrap());
        cache.store(&record).unwrap()
    }

    fn day(s: &str) -> Day {
        s.parse().unwrap()
    }

    #[test]
    fn test_staging_dir_layout() {
        let area = StagingArea::new("/srv/staging", WorkerId::new(77, 0), day("20240101"));
        assert_eq!(area.dir(), PathBuf::from("/srv/staging/20240101/77-0"));
    }

    #[test]
    fn test_claim_moves_entry() {
        let f = fixture();
        let area = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240101"));
        area.ensure().unwrap();
        area.ensure().unwrap();

        let name = store(&f.cache, "20240101-010203.000004");
        let staged = area.try_claim(&f.cache, &name).unwrap();

        assert_eq!(staged.name(), &name);
        assert!(staged.path().exists());
        assert!(!f.cache.entry_path(&name).exists());
        assert_eq!(area.list().unwrap(), vec![staged]);
    }

    #[test]
    fn test_second_claim_is_already_claimed() {
        let f = fixture();
        let first = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240101"));
        let second = StagingArea::new(&f.staging_root, WorkerId::new(2, 0), day("20240101"));
        first.ensure().unwrap();
        second.ensure().unwrap();

        let name = store(&f.cache, "20240101-010203.000004");
        assert!(first.try_claim(&f.cache, &name).is_ok());
        assert!(matches!(
            second.try_claim(&f.cache, &name),
            Err(ClaimError::AlreadyClaimed(_))
        ));
        assert!(second.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted() {
        let f = fixture();
        let area = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240101"));
        area.ensure().unwrap();

        for at in ["20240101-030000.000000", "20240101-010000.000000", "20240101-020000.000000"] {
            let name = store(&f.cache, at);
            area.try_claim(&f.cache, &name).unwrap();
        }

        let hours: Vec<String> = area
            .list()
            .unwrap()
            .iter()
            .map(|e| e.name().received_at.to_string()[9..11].to_string())
            .collect();
        assert_eq!(hours, vec!["01", "02", "03"]);
    }

    #[test]
    fn test_roll_over_carries_leftovers() {
        let f = fixture();
        let mut area = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240101"));
        area.ensure().unwrap();
        let name = store(&f.cache, "20240101-235959.999999");
        area.try_claim(&f.cache, &name).unwrap();
        let old_dir = area.dir();

        assert_eq!(area.roll_over(day("20240101")).unwrap(), 0);
        assert_eq!(area.roll_over(day("20240102")).unwrap(), 1);

        assert_eq!(area.day(), day("20240102"));
        assert!(!old_dir.exists());
        let staged = area.list().unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].name(), &name);
    }

    #[test]
    fn test_claim_never_replaces_a_staged_entry() {
        let f = fixture();
        let area = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240101"));
        area.ensure().unwrap();

        let first = store(&f.cache, "20240101-120000.000000");
        let staged_first = area.try_claim(&f.cache, &first).unwrap();
        let second = store(&f.cache, "20240101-120000.000000");
        assert_eq!(second, first);
        fs::write(f.cache.entry_path(&second), b"second\n").unwrap();

        let staged_second = area.try_claim(&f.cache, &second).unwrap();
        assert_eq!(staged_second.name(), &first.with_seq(1));
        assert!(!staged_first.read().unwrap().is_empty());
        assert_eq!(staged_second.read().unwrap(), b"second\n");
        assert_eq!(area.list().unwrap(), vec![staged_first, staged_second]);
    }

    #[test]
    fn test_roll_over_never_replaces() {
        let f = fixture();
        let mut area = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240101"));
        area.ensure().unwrap();
        let name = store(&f.cache, "20240101-235959.999999");
        area.try_claim(&f.cache, &name).unwrap();

        let next = StagingArea::new(&f.staging_root, WorkerId::new(1, 0), day("20240102"));
        next.ensure().unwrap();
        fs::write(next.dir().join(name.to_string()), b"already here\n").unwrap();

        assert_eq!(area.roll_over(day("20240102")).unwrap(), 1);
        let names: Vec<CacheEntryName> = area.list().unwrap().iter().map(|e| e.name().clone()).collect();
        assert_eq!(names, vec![name.clone(), name.with_seq(1)]);
        assert_eq!(fs::read(next.dir().join(name.to_string())).unwrap(), b"already here\n");
    }

    #[test]
    fn test_list_unreachable() {
        let area = StagingArea::new("/nonexistent/staging", WorkerId::new(1, 0), day("20240101"));
        assert!(matches!(area.list(), Err(Error::Unreachable { .. })));
    }
}
