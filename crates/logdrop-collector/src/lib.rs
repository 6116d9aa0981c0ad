//! logdrop aggregation workers
//!
//! A worker claims pending cache entries by renaming them into its own
//! staging directory, appends each into its `YYYYMMDD-LL-facility` log file
//! and deletes the staged copy. Workers share nothing but the filesystem:
//! any number may run, in one process or many.
//!
//! Failures that need an operator are reported through an [`AlertSink`].

mod alert;
mod error;
pub mod mock;
mod worker;

pub use alert::{Alert, AlertKind};
pub use error::{CollectorError, Result};
pub use worker::{Collector, CycleReport, WorkerState};

use async_trait::async_trait;
use tracing::error;

/// Trait for operator alert backends
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Alert sink that reports through the process log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        error!(
            kind = alert.kind.as_str(),
            worker = %alert.worker,
            "{}",
            alert.format_message()
        );
        Ok(())
    }
}
