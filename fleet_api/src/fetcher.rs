use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::trace;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One JSON GET. Both upstream API families speak this shape; pagination
/// and retry policy live in the callers.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &Url) -> Result<serde_json::Value>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("error building http client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn fetch_json(&self, url: &Url) -> Result<serde_json::Value> {
        trace!(url = %url, "fetching");
        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("request to {} returned {}: {}", url, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("invalid json from {}", url))
    }
}
