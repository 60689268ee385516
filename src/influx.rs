use anyhow::{bail, Context, Result};
use data_model::{QueueId, ReconciliationReport};
use tracing::debug;
use url::Url;

use crate::config::InfluxConfig;

/// Writes per-queue worker gauges as InfluxDB line protocol over HTTP. The
/// operator turned export on, so a failed write is an error rather than a
/// skipped sample.
pub struct InfluxReporter {
    client: reqwest::Client,
    endpoint: Url,
    database: String,
    provisioner: String,
}

impl InfluxReporter {
    pub fn new(config: &InfluxConfig, provisioner: &str) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).context("parsing influx endpoint")?;
        Ok(InfluxReporter {
            client: reqwest::Client::new(),
            endpoint,
            database: config.database.clone(),
            provisioner: provisioner.to_string(),
        })
    }

    /// One `configured=` gauge per configured queue.
    pub async fn write_configured(&self, report: &ReconciliationReport) -> Result<()> {
        for (queue, count) in report.configured_counts() {
            self.write_line(line(&self.provisioner, &queue, "configured", count))
                .await?;
        }
        Ok(())
    }

    /// One `missing=` gauge per queue with full demand, counting workers
    /// that are stale or absent entirely.
    pub async fn write_missing(&self, report: &ReconciliationReport) -> Result<()> {
        for (queue, count) in report.missing_counts() {
            self.write_line(line(&self.provisioner, &queue, "missing", count))
                .await?;
        }
        Ok(())
    }

    async fn write_line(&self, line: String) -> Result<()> {
        let mut url = self
            .endpoint
            .join("write")
            .context("building influx write url")?;
        url.query_pairs_mut().append_pair("db", &self.database);
        debug!(line = %line, "writing influx line");
        let response = self
            .client
            .post(url)
            .body(line)
            .send()
            .await
            .context("posting to influx")?;
        if !response.status().is_success() {
            bail!("influx write failed with status {}", response.status());
        }
        Ok(())
    }
}

fn line(provisioner: &str, queue: &QueueId, field: &str, value: u64) -> String {
    format!(
        "workers,provisioner={},queue={} {}={}",
        escape_tag(provisioner),
        escape_tag(queue.get()),
        field,
        value
    )
}

/// Line-protocol tag values must escape commas, equals signs and spaces.
fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_formatting() {
        let queue = QueueId::new("gecko-t-ap-unit-p2".to_string());
        assert_eq!(
            line("proj-autophone", &queue, "configured", 12),
            "workers,provisioner=proj-autophone,queue=gecko-t-ap-unit-p2 configured=12"
        );
        assert_eq!(
            line("proj-autophone", &queue, "missing", 0),
            "workers,provisioner=proj-autophone,queue=gecko-t-ap-unit-p2 missing=0"
        );
    }

    #[test]
    fn test_tag_escaping() {
        let queue = QueueId::new("odd queue,with=chars".to_string());
        assert_eq!(
            line("proj autophone", &queue, "configured", 1),
            "workers,provisioner=proj\\ autophone,queue=odd\\ queue\\,with\\=chars configured=1"
        );
    }
}
