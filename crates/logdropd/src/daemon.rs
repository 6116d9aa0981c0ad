//! Main daemon orchestration

use anyhow::{Context, Result};
use logdrop_collector::{AlertSink, Collector, TracingAlertSink};
use logdrop_core::{Config, PipelinePaths, WorkerId};
use logdrop_web::{start_server, AppState};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Which components this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    pub serve: bool,
    pub collect: bool,
}

impl Roles {
    pub const ALL: Roles = Roles {
        serve: true,
        collect: true,
    };
}

/// Main daemon struct
pub struct Daemon {
    config: Config,
    paths: PipelinePaths,
    alerts: Arc<dyn AlertSink>,
}

impl Daemon {
    /// Create the directory layout and a daemon over it
    pub fn new(config: Config) -> Result<Self> {
        let paths = config.paths();
        paths
            .ensure()
            .context("Failed to create logdrop directories")?;
        info!(
            "Using cache {}, staging {}, logs {}",
            paths.cache_dir.display(),
            paths.staging_dir.display(),
            paths.log_dir.display()
        );

        Ok(Self {
            config,
            paths,
            alerts: Arc::new(TracingAlertSink),
        })
    }

    pub fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    /// One pass per configured worker, then return
    pub fn collect_once(&self) -> Result<usize> {
        let mut appended = 0;
        for index in 0..self.config.collector.workers {
            let mut collector = Collector::new(
                &self.paths,
                self.config.collector.clone(),
                WorkerId::current(index),
            );
            let report = collector.cycle()?;
            for alert in &report.alerts {
                warn!("{}", alert);
            }
            appended += report.appended;
        }
        Ok(appended)
    }

    /// Run until `shutdown` resolves or a component fails
    ///
    /// On the way out the server stops accepting and drains, and every
    /// worker finishes the pass it is in.
    pub async fn run<S>(self, roles: Roles, shutdown: S) -> Result<()>
    where
        S: std::future::Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks: JoinSet<(String, Result<()>)> = JoinSet::new();

        if roles.serve {
            let state = AppState::new(&self.paths, self.config.ingest.policy()?);
            let bind = self.config.server.bind.clone();
            let mut rx = stop_rx.clone();
            tasks.spawn(async move {
                let stopped = async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                };
                let result = start_server(&bind, state, stopped)
                    .await
                    .with_context(|| format!("Ingestion server on {} failed", bind));
                ("server".to_string(), result)
            });
        }

        if roles.collect {
            for index in 0..self.config.collector.workers {
                let worker = WorkerId::current(index);
                let collector = Collector::new(&self.paths, self.config.collector.clone(), worker);
                let rx = stop_rx.clone();
                let alerts = Arc::clone(&self.alerts);
                tasks.spawn(async move {
                    let result = collector.run(rx, alerts).await.map_err(anyhow::Error::from);
                    (format!("worker {}", worker), result)
                });
            }
        }

        info!("Daemon running");

        let mut failure = None;
        tokio::select! {
            _ = shutdown => {}
            Some(joined) = tasks.join_next() => {
                failure = finished(joined);
            }
        }

        let _ = stop_tx.send(true);
        while let Some(joined) = tasks.join_next().await {
            if let Some(e) = finished(joined) {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Log how a component ended; returns its error if it failed
fn finished(
    joined: std::result::Result<(String, Result<()>), tokio::task::JoinError>,
) -> Option<anyhow::Error> {
    match joined {
        Ok((name, Ok(()))) => {
            info!("{} stopped", name);
            None
        }
        Ok((name, Err(e))) => {
            error!("{} failed: {:#}", name, e);
            Some(e)
        }
        Err(e) => {
            error!("Component task aborted: {}", e);
            Some(e.into())
        }
    }
}
