//! Recording alert sink for tests

use crate::alert::{Alert, AlertKind};
use crate::error::{CollectorError, Result};
use crate::AlertSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// An alert sink that records every alert it is given
#[derive(Default, Clone)]
pub struct MockAlertSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
    call_count: Arc<AtomicUsize>,
    should_fail: bool,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every delivery fails
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }

    pub async fn was_kind_sent(&self, kind: AlertKind) -> bool {
        self.alerts.lock().await.iter().any(|a| a.kind == kind)
    }
}

#[async_trait]
impl AlertSink for MockAlertSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(CollectorError::alert("Mock failure"));
        }

        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}
