//! Append-only log files

use logdrop_core::LogFileName;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use tracing::debug;

/// Failure to append one message to its log file
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("Failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Directory of `YYYYMMDD-LL-facility` files, only ever appended to
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    sync: bool,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sync: false,
        }
    }

    /// fsync each append before reporting it written
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn path_for(&self, name: &LogFileName) -> PathBuf {
        self.dir.join(name.to_string())
    }

    /// Start a pass; every file it opens is closed when the session drops
    pub fn session(&self) -> AppendSession<'_> {
        AppendSession {
            store: self,
            open: HashMap::new(),
        }
    }
}

/// Open append handles for one aggregation pass, keyed by destination
pub struct AppendSession<'a> {
    store: &'a LogStore,
    open: HashMap<LogFileName, File>,
}

impl AppendSession<'_> {
    /// Append one message body in a single `write`
    ///
    /// Appends from several workers to one file interleave only at record
    /// boundaries. A short write is an error: the fragment is closed with a
    /// newline so the retried record starts on its own line.
    pub fn append(&mut self, name: &LogFileName, content: &[u8]) -> Result<(), AppendError> {
        let sync = self.store.sync;
        let path = self.store.path_for(name);

        let file = match self.open.entry(name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|source| AppendError::Open {
                        path: path.clone(),
                        source,
                    })?;
                debug!("Opened log file {}", path.display());
                entry.insert(file)
            }
        };

        let written = write_record(file, content)
            .and_then(|()| if sync { file.sync_data() } else { Ok(()) });
        if let Err(source) = written {
            // A failed handle may be in an unknown state; reopen on next use
            self.open.remove(name);
            return Err(AppendError::Write { path, source });
        }
        Ok(())
    }
}

fn write_record(file: &mut File, content: &[u8]) -> io::Result<()> {
    let n = file.write(content)?;
    if n == content.len() {
        return Ok(());
    }
    if n > 0 && !content[..n].ends_with(b"\n") {
        let _ = file.write(b"\n");
    }
    Err(io::Error::new(
        ErrorKind::WriteZero,
        format!("short write: {} of {} bytes", n, content.len()),
    ))
}
