use std::sync::Arc;

use anyhow::{Context, Result};
use data_model::{Job, Push};
use futures::StreamExt;
use serde::Deserialize;
use url::Url;

use crate::{fetcher::JsonFetcher, pages::offset_pages};

/// Jobs are drained with a fixed large page size; pushes page at whatever
/// size the crawler asks for.
const JOB_PAGE_SIZE: u64 = 2000;

#[derive(Debug, Deserialize)]
struct PushListing {
    results: Vec<Push>,
}

#[derive(Debug, Deserialize)]
struct JobListing {
    results: Vec<Job>,
}

/// Client for the push/job listing API family.
pub struct PushlogClient {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: Url,
}

impl PushlogClient {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, base_url: Url) -> Self {
        Self { fetcher, base_url }
    }

    /// One page of pushes, most recent first. `tochange` bounds the page to
    /// pushes at or older than that revision, which is how consecutive
    /// pages chain.
    pub async fn push_page(
        &self,
        project: &str,
        count: u64,
        tochange: Option<&str>,
    ) -> Result<Vec<Push>> {
        let mut url = self.base_url.clone();
        url.set_path(&format!("api/project/{}/push/", project));
        url.query_pairs_mut()
            .append_pair("full", "true")
            .append_pair("count", &count.to_string());
        if let Some(revision) = tochange {
            url.query_pairs_mut().append_pair("tochange", revision);
        }

        let page = self.fetcher.fetch_json(&url).await?;
        let listing: PushListing = serde_json::from_value(page)
            .with_context(|| format!("unexpected push listing shape for {}", project))?;
        Ok(listing.results)
    }

    /// Every job of one push, draining the offset-paged listing.
    pub async fn all_jobs(&self, project: &str, push_id: u64) -> Result<Vec<Job>> {
        let mut url = self.base_url.clone();
        url.set_path(&format!("api/project/{}/jobs/", project));
        url.query_pairs_mut()
            .append_pair("push_id", &push_id.to_string());

        let pages = offset_pages(self.fetcher.clone(), url, "results", JOB_PAGE_SIZE);
        futures::pin_mut!(pages);
        let mut jobs = Vec::new();
        while let Some(page) = pages.next().await {
            let listing: JobListing = serde_json::from_value(page?)
                .with_context(|| format!("unexpected job listing shape for push {}", push_id))?;
            jobs.extend(listing.results);
        }
        Ok(jobs)
    }
}
