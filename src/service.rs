use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use data_model::ReconciliationReport;
use fleet_api::{HttpFetcher, JsonFetcher, PushlogClient, QueueClient};
use tokio::signal;
use tracing::info;
use url::Url;

use crate::{
    config::FleetwatchConfig,
    crawler::{CrawlOptions, PushCrawler},
    devicepool::DevicepoolSource,
    fleet::{collector::WorkerObservationCollector, reconcile::reconcile, resolver},
    influx::InfluxReporter,
};

/// Arguments for one pending-jobs crawl, already validated by the caller.
pub struct PendingRun {
    pub projects: Vec<String>,
    pub platform_filter: Option<String>,
    pub pages: u64,
    pub page_size: u64,
    pub early_exit: bool,
}

pub struct WorkersRun {
    pub show_all: bool,
    pub force_update: bool,
    pub time_limit: Option<u64>,
    pub influx_logging: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The rendered operator report.
    Completed(String),
    Interrupted,
}

/// Wires configuration into the crawl and reconciliation engines and runs
/// one command, racing it against an interrupt.
pub struct Service {
    config: FleetwatchConfig,
    fetcher: Arc<dyn JsonFetcher>,
}

impl Service {
    pub fn new(config: FleetwatchConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.user_agent)?);
        Ok(Service { config, fetcher })
    }

    #[cfg(test)]
    pub fn with_fetcher(config: FleetwatchConfig, fetcher: Arc<dyn JsonFetcher>) -> Self {
        Service { config, fetcher }
    }

    pub async fn run_pending(&self, run: PendingRun) -> Result<RunOutcome> {
        let base_url =
            Url::parse(&self.config.pushlog.base_url).context("parsing pushlog base url")?;
        let crawler = PushCrawler::new(PushlogClient::new(self.fetcher.clone(), base_url));
        let options = CrawlOptions {
            pages: run.pages,
            page_size: run.page_size,
            early_exit: run.early_exit,
            platform_filter: run.platform_filter,
        };

        tokio::select! {
            report = crawler.crawl_projects(&run.projects, &options) => {
                Ok(RunOutcome::Completed(report.render()))
            }
            _ = shutdown_signal() => Ok(RunOutcome::Interrupted),
        }
    }

    pub async fn run_workers(&self, run: WorkersRun) -> Result<RunOutcome> {
        let report = tokio::select! {
            report = self.observe_and_reconcile(&run) => report?,
            _ = shutdown_signal() => return Ok(RunOutcome::Interrupted),
        };

        let rendered = report.render(run.show_all);
        if run.influx_logging {
            let Some(influx_config) = &self.config.influx else {
                anyhow::bail!("influx logging requested but no influx endpoint is configured");
            };
            let reporter = InfluxReporter::new(influx_config, &self.config.queue.provisioner)?;
            reporter.write_configured(&report).await?;
            if run.time_limit.is_some() {
                reporter.write_missing(&report).await?;
            }
        }

        Ok(RunOutcome::Completed(rendered))
    }

    async fn observe_and_reconcile(&self, run: &WorkersRun) -> Result<ReconciliationReport> {
        let source = DevicepoolSource::new(self.config.fleet_source.clone());
        let fleet_config = source.load_fleet_config(run.force_update).await?;
        let configured = resolver::resolve(&fleet_config);
        info!(queues = configured.len(), "resolved configured fleet");

        let base_url =
            Url::parse(&self.config.queue.base_url).context("parsing queue base url")?;
        let client = QueueClient::new(
            self.fetcher.clone(),
            base_url,
            &self.config.queue.provisioner,
            self.config.queue.max_worker_types,
            self.config.queue.max_workers,
        );
        let collector =
            WorkerObservationCollector::new(client, self.config.status_fetch_concurrency);
        let observation = collector.collect(&configured).await?;

        let alert_minutes = run.time_limit.unwrap_or(self.config.alert_minutes);
        Ok(reconcile(
            &configured,
            &observation,
            Utc::now(),
            alert_minutes,
            run.time_limit.is_some(),
        ))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("signal received, shutting down");
}
