use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use data_model::{
    ConfiguredWorkers, FleetObservation, QueueHealth, ReconciliationReport, WorkerLiveness,
};

/// Diffs the configured fleet against one runtime observation. Every
/// configured queue gets an entry; runtime queues outside the configured set
/// are not this tool's responsibility and are left out.
pub fn reconcile(
    configured: &ConfiguredWorkers,
    observation: &FleetObservation,
    now: DateTime<Utc>,
    alert_minutes: u64,
    explicit_limit: bool,
) -> ReconciliationReport {
    let mut report = ReconciliationReport {
        queues: BTreeMap::new(),
        alert_minutes,
        explicit_limit,
    };

    for (queue, workers) in configured {
        let pending_tasks = observation.pending_tasks(queue);
        let observed = observation
            .workers_by_queue
            .get(queue)
            .cloned()
            .unwrap_or_default();
        let missing = workers.difference(&observed).cloned().collect();

        let mut liveness = BTreeMap::new();
        if pending_tasks > 0 {
            for worker in workers {
                let classification = match observation.last_started.get(worker) {
                    Some(last_started) => {
                        let age_minutes =
                            now.signed_duration_since(*last_started).num_minutes();
                        if age_minutes >= alert_minutes as i64 {
                            WorkerLiveness::Stale {
                                last_started: *last_started,
                                age_minutes,
                            }
                        } else {
                            WorkerLiveness::Healthy {
                                last_started: *last_started,
                                age_minutes,
                            }
                        }
                    }
                    None => WorkerLiveness::NoData,
                };
                liveness.insert(worker.clone(), classification);
            }
        }

        report.queues.insert(
            queue.clone(),
            QueueHealth {
                pending_tasks,
                configured: workers.clone(),
                observed,
                missing,
                liveness,
            },
        );
    }

    report
}
