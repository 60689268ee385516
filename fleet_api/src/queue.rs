use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use data_model::{QueueId, TaskId, WorkerId};
use futures::StreamExt;
use serde::Deserialize;
use url::Url;

use crate::{fetcher::JsonFetcher, pages::token_pages};

#[derive(Debug, Deserialize)]
struct WorkerTypeListing {
    #[serde(rename = "workerTypes", default)]
    worker_types: Vec<WorkerTypeEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkerTypeEntry {
    #[serde(rename = "workerType")]
    worker_type: String,
}

#[derive(Debug, Deserialize)]
struct WorkerListing {
    #[serde(default)]
    workers: Vec<WorkerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerEntry {
    #[serde(rename = "workerId")]
    pub worker_id: WorkerId,
    /// Absent for a worker that has never claimed a task.
    #[serde(rename = "latestTask", default)]
    pub latest_task: Option<TaskRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskRef {
    #[serde(rename = "taskId")]
    pub task_id: TaskId,
}

#[derive(Debug, Deserialize)]
struct PendingListing {
    #[serde(rename = "pendingTasks")]
    pending_tasks: u64,
}

#[derive(Debug, Deserialize)]
struct TaskStatusEnvelope {
    status: TaskStatus,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    #[serde(default)]
    runs: Vec<TaskRun>,
}

#[derive(Debug, Deserialize)]
struct TaskRun {
    #[serde(default)]
    started: Option<DateTime<Utc>>,
}

/// Client for the worker/queue API family.
pub struct QueueClient {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: Url,
    provisioner: String,
    max_worker_types: u64,
    max_workers: u64,
}

impl QueueClient {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        base_url: Url,
        provisioner: &str,
        max_worker_types: u64,
        max_workers: u64,
    ) -> Self {
        Self {
            fetcher,
            base_url,
            provisioner: provisioner.to_string(),
            max_worker_types,
            max_workers,
        }
    }

    /// Runtime-known queue identifiers under the provisioner, across every
    /// continuation page.
    pub async fn worker_types(&self) -> Result<Vec<QueueId>> {
        let mut url = self.base_url.clone();
        url.set_path(&format!(
            "v1/provisioners/{}/worker-types",
            self.provisioner
        ));
        url.query_pairs_mut()
            .append_pair("limit", &self.max_worker_types.to_string());

        let pages = token_pages(self.fetcher.clone(), url);
        futures::pin_mut!(pages);
        let mut queues = Vec::new();
        while let Some(page) = pages.next().await {
            let listing: WorkerTypeListing =
                serde_json::from_value(page?).context("unexpected worker-type listing shape")?;
            queues.extend(
                listing
                    .worker_types
                    .into_iter()
                    .map(|entry| QueueId::new(entry.worker_type)),
            );
        }
        Ok(queues)
    }

    pub async fn pending_count(&self, queue: &QueueId) -> Result<u64> {
        let mut url = self.base_url.clone();
        url.set_path(&format!("v1/pending/{}/{}", self.provisioner, queue));
        let page = self.fetcher.fetch_json(&url).await?;
        let listing: PendingListing = serde_json::from_value(page)
            .with_context(|| format!("unexpected pending count shape for {}", queue))?;
        Ok(listing.pending_tasks)
    }

    /// One listing pass over a queue's registered workers. Spurious empty
    /// responses are the caller's problem; this issues exactly one pass.
    pub async fn workers(&self, queue: &QueueId) -> Result<Vec<WorkerEntry>> {
        let mut url = self.base_url.clone();
        url.set_path(&format!(
            "v1/provisioners/{}/worker-types/{}/workers",
            self.provisioner, queue
        ));
        url.query_pairs_mut()
            .append_pair("limit", &self.max_workers.to_string());

        let pages = token_pages(self.fetcher.clone(), url);
        futures::pin_mut!(pages);
        let mut workers = Vec::new();
        while let Some(page) = pages.next().await {
            let listing: WorkerListing = serde_json::from_value(page?)
                .with_context(|| format!("unexpected worker listing shape for {}", queue))?;
            workers.extend(listing.workers);
        }
        Ok(workers)
    }

    /// "started" of the most recent run of a task. A task that was
    /// rescheduled carries several runs; only the last one counts.
    pub async fn latest_run_started(&self, task: &TaskId) -> Result<Option<DateTime<Utc>>> {
        let mut url = self.base_url.clone();
        url.set_path(&format!("v1/task/{}/status", task));
        let page = self.fetcher.fetch_json(&url).await?;
        let envelope: TaskStatusEnvelope = serde_json::from_value(page)
            .with_context(|| format!("unexpected task status shape for {}", task))?;
        Ok(envelope.status.runs.last().and_then(|run| run.started))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_fetcher::ScriptedFetcher;

    fn client(fetcher: Arc<ScriptedFetcher>) -> QueueClient {
        QueueClient::new(
            fetcher,
            Url::parse("https://queue.example").unwrap(),
            "proj-autophone",
            50,
            50,
        )
    }

    #[tokio::test]
    async fn test_worker_types_accumulate_across_token_pages() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "https://queue.example/v1/provisioners/proj-autophone/worker-types?limit=50",
            json!({
                "workerTypes": [{"workerType": "gecko-t-ap-unit-p2"}],
                "continuationToken": "more",
            }),
        );
        fetcher.script(
            "https://queue.example/v1/provisioners/proj-autophone/worker-types?limit=50&continuationToken=more",
            json!({"workerTypes": [{"workerType": "gecko-t-ap-perf-g5"}]}),
        );

        let queues = client(fetcher.clone()).worker_types().await.unwrap();
        assert_eq!(
            queues,
            vec![
                QueueId::from("gecko-t-ap-unit-p2"),
                QueueId::from("gecko-t-ap-perf-g5"),
            ]
        );
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_pending_count() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "https://queue.example/v1/pending/proj-autophone/gecko-t-ap-unit-p2",
            json!({"pendingTasks": 7}),
        );

        let count = client(fetcher)
            .pending_count(&QueueId::from("gecko-t-ap-unit-p2"))
            .await
            .unwrap();
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn test_workers_parse_with_and_without_latest_task() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "https://queue.example/v1/provisioners/proj-autophone/worker-types/gecko-t-ap-unit-p2/workers?limit=50",
            json!({"workers": [
                {"workerId": "motog5-01", "latestTask": {"taskId": "abc123"}},
                {"workerId": "motog5-02"},
            ]}),
        );

        let workers = client(fetcher)
            .workers(&QueueId::from("gecko-t-ap-unit-p2"))
            .await
            .unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].worker_id, WorkerId::from("motog5-01"));
        assert_eq!(
            workers[0].latest_task.as_ref().map(|t| t.task_id.clone()),
            Some(TaskId::from("abc123"))
        );
        assert!(workers[1].latest_task.is_none());
    }

    #[tokio::test]
    async fn test_latest_run_started_uses_last_run() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "https://queue.example/v1/task/abc123/status",
            json!({"status": {"runs": [
                {"started": "2019-05-10T08:00:00Z"},
                {"started": "2019-05-10T10:30:00Z"},
            ]}}),
        );

        let started = client(fetcher)
            .latest_run_started(&TaskId::from("abc123"))
            .await
            .unwrap();
        assert_eq!(
            started.map(|t| t.to_rfc3339()),
            Some("2019-05-10T10:30:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_latest_run_not_started_yet() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            "https://queue.example/v1/task/queued1/status",
            json!({"status": {"runs": [{"scheduled": "2019-05-10T08:00:00Z"}]}}),
        );
        fetcher.script(
            "https://queue.example/v1/task/norun1/status",
            json!({"status": {"runs": []}}),
        );

        let client = client(fetcher);
        assert!(client
            .latest_run_started(&TaskId::from("queued1"))
            .await
            .unwrap()
            .is_none());
        assert!(client
            .latest_run_started(&TaskId::from("norun1"))
            .await
            .unwrap()
            .is_none());
    }
}
