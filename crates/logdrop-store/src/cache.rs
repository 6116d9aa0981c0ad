//! Shared cache directory of pending messages

use logdrop_core::{constants::TEMP_PREFIX, CacheEntryName, Error, MessageRecord, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::list_file_names;

/// The shared pool of pending message files
///
/// Writers only ever create new names; readers only ever rename entries away.
#[derive(Debug, Clone)]
pub struct CacheDirectory {
    dir: PathBuf,
}

impl CacheDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of a named entry
    pub fn entry_path(&self, name: &CacheEntryName) -> PathBuf {
        self.dir.join(name.to_string())
    }

    /// Durably write one record as a new cache entry and return its name
    ///
    /// The content is written and synced under a hidden temp name first, then
    /// hard-linked into place. Linking never replaces an existing file, so a
    /// name collision is detected atomically and retried with a `-NNNN` suffix.
    pub fn store(&self, record: &MessageRecord) -> Result<CacheEntryName> {
        let line = record.to_line()?;
        let tmp_path = self.dir.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(line.as_bytes())?;
            file.sync_data()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::unreachable(&self.dir, e));
        }

        let result = self.link_unique(&tmp_path, record.entry_name());
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!("Failed to remove temp file {}: {}", tmp_path.display(), e);
        }
        result
    }

    fn link_unique(&self, tmp_path: &Path, base: CacheEntryName) -> Result<CacheEntryName> {
        for seq in 0..=CacheEntryName::MAX_SEQ {
            let name = base.with_seq(seq);
            match fs::hard_link(tmp_path, self.entry_path(&name)) {
                Ok(()) => {
                    if seq > 0 {
                        debug!("Cache name collision resolved as {}", name);
                    }
                    return Ok(name);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::IoError(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free cache name for {}", base),
        )))
    }

    /// Pending entries, oldest first
    ///
    /// Files whose names are not cache entry names (temp files, strays) are skipped.
    pub fn list(&self) -> Result<Vec<CacheEntryName>> {
        let names = list_file_names(&self.dir).map_err(|e| Error::unreachable(&self.dir, e))?;
        Ok(names
            .into_iter()
            .filter_map(|n| match n.parse::<CacheEntryName>() {
                Ok(name) => Some(name),
                Err(_) => {
                    debug!("Ignoring foreign file in cache: {}", n);
                    None
                }
            })
            .collect())
    }

    /// Number of pending entries
    pub fn pending(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Remove temp files abandoned by an ingestion process that died mid-write
    pub fn remove_stale_temps(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(|e| Error::unreachable(&self.dir, e))? {
            let Ok(entry) = entry else { continue };
            let is_temp = entry
                .file_name()
                .to_str()
                .map(|n| n.starts_with(TEMP_PREFIX))
                .unwrap_or(false);
            if !is_temp {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.map(|a| a >= max_age).unwrap_or(false) && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logdrop_core::{Facility, Level};
    use tempfile::TempDir;

    fn record(at: &str) -> MessageRecord {
        MessageRecord::new(at.parse().unwrap(), Level::ERROR, Facility::new("auth").unwrap())
            .with_message("login failed")
    }

    #[test]
    fn test_store_creates_one_entry() {
        let dir = TempDir::new().unwrap();
        let cache = CacheDirectory::new(dir.path());

        let name = cache.store(&record("20240101-120000.000000")).unwrap();
        assert_eq!(name.to_string(), "20240101-120000.000000-40-auth");

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);

        let content = fs::read_to_string(cache.entry_path(&name)).unwrap();
        assert!(content.starts_with("20240101-120000.000000 40 auth "));
        assert!(content.contains("login failed"));
    }

    #[test]
    fn test_store_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = CacheDirectory::new(dir.path());

        let first = cache.store(&record("20240101-120000.000000")).unwrap();
        let second = cache
            .store(&record("20240101-120000.000000").with_field("n", "2"))
            .unwrap();
        let third = cache.store(&record("20240101-120000.000000")).unwrap();

        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
        assert_eq!(third.seq, 2);
        assert_eq!(third.to_string(), "20240101-120000.000000-40-auth-0002");
        assert!(fs::read_to_string(cache.entry_path(&second)).unwrap().contains("\"n\":\"2\""));
        assert_eq!(cache.pending().unwrap(), 3);
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let cache = CacheDirectory::new(dir.path());

        cache.store(&record("20240102-000000.000000")).unwrap();
        cache.store(&record("20240101-000000.000000")).unwrap();
        fs::write(dir.path().join(".tmp-inflight"), b"partial").unwrap();
        fs::write(dir.path().join("README"), b"stray").unwrap();
        fs::create_dir(dir.path().join("20240101-000000.000001-40-auth")).unwrap();

        let names: Vec<String> = cache.list().unwrap().iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "20240101-000000.000000-40-auth".to_string(),
                "20240102-000000.000000-40-auth".to_string(),
            ]
        );
    }

    #[test]
    fn test_list_missing_directory_is_unreachable() {
        let cache = CacheDirectory::new("/nonexistent/logdrop/cache");
        assert!(matches!(cache.list(), Err(Error::Unreachable { .. })));
    }

    #[test]
    fn test_remove_stale_temps() {
        let dir = TempDir::new().unwrap();
        let cache = CacheDirectory::new(dir.path());
        fs::write(dir.path().join(".tmp-abandoned"), b"partial").unwrap();
        cache.store(&record("20240101-000000.000000")).unwrap();

        assert_eq!(cache.remove_stale_temps(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(cache.remove_stale_temps(Duration::ZERO).unwrap(), 1);
        assert!(!dir.path().join(".tmp-abandoned").exists());
        assert_eq!(cache.pending().unwrap(), 1);
    }
}
