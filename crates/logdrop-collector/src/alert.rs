//! Operator alerts raised by the aggregation workers

use logdrop_core::{CacheEntryName, WorkerId};
use std::fmt;
use std::path::PathBuf;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Destination log file could not be opened; the entry stays staged
    Open,
    /// Staged entry could not be read
    Read,
    /// Append to the destination failed
    Write,
    /// Appended entry could not be deleted from staging (it will be appended again)
    Remove,
    /// Cache entry could not be moved into staging
    Claim,
    /// The worker stopped
    Fatal,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Open => "open",
            AlertKind::Read => "read",
            AlertKind::Write => "write",
            AlertKind::Remove => "remove",
            AlertKind::Claim => "claim",
            AlertKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure an operator should know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub worker: WorkerId,
    pub entry: Option<CacheEntryName>,
    pub path: Option<PathBuf>,
    pub error: String,
}

impl Alert {
    pub fn new(kind: AlertKind, worker: WorkerId, error: impl fmt::Display) -> Self {
        Self {
            kind,
            worker,
            entry: None,
            path: None,
            error: error.to_string(),
        }
    }

    pub fn with_entry(mut self, entry: &CacheEntryName) -> Self {
        self.entry = Some(entry.clone());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// One-line human readable form
    pub fn format_message(&self) -> String {
        let mut msg = format!("worker {} {} failure", self.worker, self.kind);
        if let Some(entry) = &self.entry {
            msg.push_str(&format!(" for {}", entry));
        }
        if let Some(path) = &self.path {
            msg.push_str(&format!(" at {}", path.display()));
        }
        msg.push_str(&format!(": {}", self.error));
        msg
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_message())
    }
}
