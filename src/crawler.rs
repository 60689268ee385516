use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use data_model::{CrawlOutcome, CrawlResult, PendingReport, Push};
use fleet_api::PushlogClient;
use tracing::{debug, info, warn};

/// Knobs for one crawl invocation. Crawls never share state, every
/// invocation starts from an empty result.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub pages: u64,
    pub page_size: u64,
    pub early_exit: bool,
    pub platform_filter: Option<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        CrawlOptions {
            pages: 3,
            page_size: 20,
            early_exit: true,
            platform_filter: None,
        }
    }
}

pub struct PushCrawler {
    pushlog: PushlogClient,
}

impl PushCrawler {
    pub fn new(pushlog: PushlogClient) -> Self {
        PushCrawler { pushlog }
    }

    /// Crawls every requested project. A transport failure poisons only the
    /// project it happened in; the report carries an explicit failure marker
    /// for it and the remaining projects still get crawled.
    pub async fn crawl_projects(
        &self,
        projects: &[String],
        options: &CrawlOptions,
    ) -> PendingReport {
        let mut report = PendingReport {
            platform_filter: options.platform_filter.clone(),
            projects: BTreeMap::new(),
        };
        for project in projects {
            info!(project = %project, "crawling pending jobs");
            match self.crawl_project(project, options).await {
                Ok(result) => {
                    report
                        .projects
                        .insert(project.clone(), CrawlOutcome::Completed(result));
                }
                Err(err) => {
                    warn!(project = %project, "crawl failed: {:?}", err);
                    report.projects.insert(
                        project.clone(),
                        CrawlOutcome::Failed {
                            error: format!("{:#}", err),
                        },
                    );
                }
            }
        }
        report
    }

    /// Walks up to `pages` pages of pushes, newest first. Each page after the
    /// first is chained to the previous page's oldest revision via
    /// `tochange`, which is inclusive, so every request asks for one push
    /// more than the page size and already-seen ids are dropped. A response
    /// shorter than the request means history is exhausted.
    pub async fn crawl_project(
        &self,
        project: &str,
        options: &CrawlOptions,
    ) -> Result<CrawlResult> {
        let requested = options.page_size + 1;
        let mut result = CrawlResult::default();
        let mut seen_pushes: HashSet<u64> = HashSet::new();
        let mut tochange: Option<String> = None;

        for page in 0..options.pages {
            let raw = self
                .pushlog
                .push_page(project, requested, tochange.as_deref())
                .await?;
            let has_more = raw.len() as u64 == requested;
            let fresh: Vec<Push> = raw
                .into_iter()
                .filter(|push| !seen_pushes.contains(&push.id))
                .collect();
            let page_pushes: Vec<Push> = fresh
                .into_iter()
                .take(options.page_size as usize)
                .collect();
            if page_pushes.is_empty() {
                debug!(project = %project, page = page + 1, "no new pushes, stopping");
                break;
            }

            let mut page_pending = 0u64;
            for push in &page_pushes {
                seen_pushes.insert(push.id);
                result.pushes_inspected += 1;
                let jobs = self.pushlog.all_jobs(project, push.id).await?;
                for job in &jobs {
                    result.jobs_inspected += 1;
                    if job.is_pending()
                        && job.matches_platform(options.platform_filter.as_deref())
                    {
                        page_pending += 1;
                        result.record_pending(job.submit_timestamp);
                    }
                }
            }
            debug!(
                project = %project,
                page = page + 1,
                pending = page_pending,
                "processed push page"
            );

            if let Some(last) = page_pushes.last() {
                tochange = Some(last.revision.clone());
            }
            if !has_more {
                debug!(project = %project, "short push page, history exhausted");
                break;
            }
            if options.early_exit && page_pending == 0 && page + 1 < options.pages {
                debug!(project = %project, page = page + 1, "quiet page, exiting early");
                result.early_exited = true;
                break;
            }
        }
        Ok(result)
    }
}
