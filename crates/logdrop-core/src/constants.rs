//! Constants and default values for logdrop

use std::path::PathBuf;

/// Default logdrop home directory name
pub const LOGDROP_DIR: &str = ".logdrop";

/// Directory holding one file per pending message
pub const CACHE_DIR: &str = "cache";

/// Directory holding per-day, per-worker staging subdirectories
pub const STAGING_DIR: &str = "staging";

/// Directory holding the aggregated log files
pub const LOGS_DIR: &str = "logs";

/// Fixed resource path for message ingestion
pub const MESSAGES_ROUTE: &str = "/api/v1/messages";

/// Prefix of the read-side count route
pub const COUNTS_ROUTE: &str = "/api/v1/counts";

/// Prefix of the read-side line download route
pub const LINES_ROUTE: &str = "/api/v1/lines";

/// Content type accepted by the ingestion endpoint
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Default bind address for the ingestion server
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Default idle sleep between empty cache polls in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Staging days at least this old are swept
pub const DEFAULT_STALE_AFTER_DAYS: u32 = 2;

/// Upper bound on `stale_after_days` (about ten years)
pub const MAX_STALE_AFTER_DAYS: u32 = 3650;

/// Default number of aggregation workers per process
pub const DEFAULT_WORKERS: usize = 1;

/// Facility recorded when the producer sends none
pub const DEFAULT_FACILITY: &str = "unspecified";

/// Prefix of in-flight temp files inside the cache directory
pub const TEMP_PREFIX: &str = ".tmp-";

/// Config file names searched in the working directory (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    "logdrop.toml",
    "logdrop.yaml",
    "logdrop.yml",
    "logdrop.json",
];

/// Get the logdrop home directory
pub fn logdrop_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(LOGDROP_DIR))
        .unwrap_or_else(|| PathBuf::from(LOGDROP_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logdrop_home() {
        let home = logdrop_home();
        assert!(home.to_string_lossy().contains(".logdrop"));
    }
}
