use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use data_model::{ConfiguredWorkers, FleetObservation, QueueId, TaskId, WorkerId};
use fleet_api::{queue::WorkerEntry, QueueClient};
use futures::{stream, StreamExt};
use tracing::{debug, info};

/// A queue that reports pending work should never list zero workers; when it
/// does the listing is retried this many times before giving up.
const WORKER_LIST_ATTEMPTS: usize = 3;

/// Takes one snapshot of the runtime fleet: known queues, pending counts for
/// every configured queue, and live workers plus their last task start for
/// each queue that currently has demand.
pub struct WorkerObservationCollector {
    queue: QueueClient,
    status_concurrency: usize,
}

impl WorkerObservationCollector {
    pub fn new(queue: QueueClient, status_concurrency: usize) -> Self {
        WorkerObservationCollector {
            queue,
            status_concurrency,
        }
    }

    pub async fn collect(&self, configured: &ConfiguredWorkers) -> Result<FleetObservation> {
        let mut observation = FleetObservation::default();

        let worker_types = self.queue.worker_types().await?;
        observation.worker_types = worker_types.iter().cloned().collect();
        info!(
            worker_types = worker_types.len(),
            "observed runtime worker types"
        );

        for queue in configured.keys() {
            let pending = self.queue.pending_count(queue).await?;
            observation.pending_by_queue.insert(queue.clone(), pending);
        }

        for queue in &worker_types {
            if !configured.contains_key(queue) {
                debug!(queue = %queue, "worker type not in fleet config, skipping");
                continue;
            }
            if observation.pending_tasks(queue) == 0 {
                debug!(queue = %queue, "queue has no demand, not listing workers");
                continue;
            }

            let workers = self.list_workers_with_retry(queue).await?;
            let mut observed: BTreeSet<WorkerId> = BTreeSet::new();
            let mut latest_tasks: Vec<(WorkerId, TaskId)> = Vec::new();
            for worker in workers {
                if let Some(task) = worker.latest_task {
                    latest_tasks.push((worker.worker_id.clone(), task.task_id));
                }
                observed.insert(worker.worker_id);
            }
            observation.workers_by_queue.insert(queue.clone(), observed);

            // Last-started lookups dominate the request count, so they run
            // concurrently, a bounded number in flight at a time.
            let mut statuses = stream::iter(latest_tasks.into_iter().map(
                |(worker_id, task_id)| async move {
                    let started = self.queue.latest_run_started(&task_id).await?;
                    Ok::<_, anyhow::Error>((worker_id, started))
                },
            ))
            .buffer_unordered(self.status_concurrency);
            while let Some(fetched) = statuses.next().await {
                let (worker_id, started) = fetched?;
                if let Some(started) = started {
                    observation.last_started.insert(worker_id, started);
                }
            }
        }

        Ok(observation)
    }

    async fn list_workers_with_retry(&self, queue: &QueueId) -> Result<Vec<WorkerEntry>> {
        for attempt in 1..=WORKER_LIST_ATTEMPTS {
            let workers = self.queue.workers(queue).await?;
            if !workers.is_empty() {
                return Ok(workers);
            }
            debug!(
                queue = %queue,
                attempt,
                "queue with demand listed no workers"
            );
        }
        Err(anyhow!(
            "queue {} listed no workers after {} attempts",
            queue,
            WORKER_LIST_ATTEMPTS
        ))
    }
}
