use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
};

use chrono::{DateTime, SecondsFormat, Utc};
use fleetwatch_utils::{get_epoch_time_in_secs, human_duration, secs_since};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct QueueId(String);

impl QueueId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QueueId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    /// Catch-all for states the upstream adds without notice. Only
    /// `pending` matters to the crawler.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Push {
    pub id: u64,
    pub revision: String,
    #[serde(default)]
    pub author: String,
    pub push_timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub job_type_name: String,
    pub state: JobState,
    pub submit_timestamp: u64,
}

impl Job {
    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    /// Case-sensitive substring match on the platform field. No filter
    /// matches everything.
    pub fn matches_platform(&self, filter: Option<&str>) -> bool {
        match filter {
            Some(f) => self.platform.contains(f),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CrawlResult {
    pub pending_count: u64,
    /// Epoch seconds of the oldest pending job seen so far. Once set it
    /// only moves backwards in time.
    pub oldest_pending_submit_ts: Option<u64>,
    pub jobs_inspected: u64,
    pub pushes_inspected: u64,
    pub early_exited: bool,
}

impl CrawlResult {
    pub fn record_pending(&mut self, submit_ts: u64) {
        self.pending_count += 1;
        self.oldest_pending_submit_ts = Some(match self.oldest_pending_submit_ts {
            Some(current) => current.min(submit_ts),
            None => submit_ts,
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CrawlOutcome {
    Completed(CrawlResult),
    Failed { error: String },
}

/// Per-project crawl results for one invocation, keyed by project name so
/// rendering is lexically ordered.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PendingReport {
    pub platform_filter: Option<String>,
    pub projects: BTreeMap<String, CrawlOutcome>,
}

impl PendingReport {
    pub fn grand_total(&self) -> u64 {
        self.projects
            .values()
            .map(|outcome| match outcome {
                CrawlOutcome::Completed(result) => result.pending_count,
                CrawlOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn render(&self) -> String {
        self.render_at(get_epoch_time_in_secs())
    }

    /// Ages are computed against `now_secs`, so they reflect the moment
    /// the report is rendered rather than when pages were fetched.
    pub fn render_at(&self, now_secs: u64) -> String {
        let filter_string = match &self.platform_filter {
            Some(f) => format!("'{}' ", f),
            None => String::new(),
        };

        let mut lines = vec!["-- summary".to_string()];
        for (project, outcome) in &self.projects {
            match outcome {
                CrawlOutcome::Completed(result) => {
                    let mut line = format!(
                        "{} project: pending {}tasks: {}",
                        project, filter_string, result.pending_count
                    );
                    if let Some(oldest) = result.oldest_pending_submit_ts {
                        line.push_str(&format!(
                            ", oldest pending submitted {} ago",
                            human_duration(secs_since(oldest, now_secs))
                        ));
                    }
                    lines.push(line);
                }
                CrawlOutcome::Failed { error } => {
                    lines.push(format!("{} project: crawl failed: {}", project, error));
                }
            }
        }
        if self.projects.len() > 1 {
            lines.push(format!(
                "total pending {}tasks: {}",
                filter_string,
                self.grand_total()
            ));
        }
        lines.join("\n")
    }
}

/// The declarative fleet document: device groups (group name -> worker
/// entries) and projects (project name -> queue binding). Shapes beyond
/// what the resolver consumes are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub device_groups: BTreeMap<String, Option<BTreeMap<String, serde_json::Value>>>,
    #[serde(default)]
    pub projects: BTreeMap<String, FleetProject>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetProject {
    #[serde(default)]
    pub additional_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub device_group_name: Option<String>,
}

/// queue id -> the worker identifiers that should exist for it.
pub type ConfiguredWorkers = BTreeMap<QueueId, BTreeSet<WorkerId>>;

/// Snapshot of the runtime fleet taken by one collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetObservation {
    pub worker_types: BTreeSet<QueueId>,
    pub pending_by_queue: BTreeMap<QueueId, u64>,
    pub workers_by_queue: BTreeMap<QueueId, BTreeSet<WorkerId>>,
    pub last_started: BTreeMap<WorkerId, DateTime<Utc>>,
}

impl FleetObservation {
    pub fn pending_tasks(&self, queue: &QueueId) -> u64 {
        self.pending_by_queue.get(queue).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, AsRefStr)]
pub enum WorkerLiveness {
    /// Configured but never observed with a started task this cycle.
    #[strum(serialize = "missing (no data)")]
    NoData,
    #[strum(serialize = "stale")]
    Stale {
        last_started: DateTime<Utc>,
        age_minutes: i64,
    },
    #[strum(serialize = "healthy")]
    Healthy {
        last_started: DateTime<Utc>,
        age_minutes: i64,
    },
}

impl WorkerLiveness {
    pub fn is_alert(&self) -> bool {
        matches!(self, WorkerLiveness::NoData | WorkerLiveness::Stale { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueHealth {
    pub pending_tasks: u64,
    pub configured: BTreeSet<WorkerId>,
    pub observed: BTreeSet<WorkerId>,
    /// configured minus observed; a worker present in `observed` never
    /// appears here.
    pub missing: BTreeSet<WorkerId>,
    /// Staleness classification per configured worker. Empty for queues
    /// with no pending tasks (idle and stuck are indistinguishable
    /// without demand).
    pub liveness: BTreeMap<WorkerId, WorkerLiveness>,
}

impl QueueHealth {
    /// Demand covers the configured fleet, so a worker without recent
    /// activity cannot be excused by an empty queue.
    pub fn has_full_demand(&self) -> bool {
        self.pending_tasks > 0 && self.pending_tasks >= self.configured.len() as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub queues: BTreeMap<QueueId, QueueHealth>,
    /// Active staleness threshold in minutes.
    pub alert_minutes: u64,
    /// True when the threshold was supplied explicitly; rendering then
    /// restricts the staleness section to workers at or past it.
    pub explicit_limit: bool,
}

impl ReconciliationReport {
    pub fn configured_counts(&self) -> BTreeMap<QueueId, u64> {
        self.queues
            .iter()
            .map(|(queue, health)| (queue.clone(), health.configured.len() as u64))
            .collect()
    }

    /// Stale-or-missing worker count per queue, for metrics export. Queues
    /// whose demand does not cover their configured fleet report zero.
    pub fn missing_counts(&self) -> BTreeMap<QueueId, u64> {
        self.queues
            .iter()
            .map(|(queue, health)| {
                let count = if health.has_full_demand() {
                    health.liveness.values().filter(|l| l.is_alert()).count() as u64
                } else {
                    0
                };
                (queue.clone(), count)
            })
            .collect()
    }

    pub fn render(&self, show_all: bool) -> String {
        let mut lines = Vec::new();
        self.render_missing(&mut lines, show_all);
        lines.push(String::new());
        self.render_staleness(&mut lines);
        lines.join("\n")
    }

    fn render_missing(&self, lines: &mut Vec<String>, show_all: bool) {
        lines.push("missing workers (present in config, but not observed):".to_string());
        let mut difference_found = false;
        for (queue, health) in &self.queues {
            if show_all {
                lines.push(format!("  {} ({} jobs):", queue, health.pending_tasks));
                lines.push(format!("    configured: {}", join_workers(&health.configured)));
                lines.push(format!("    observed: {}", join_workers(&health.observed)));
                if health.missing.is_empty() {
                    lines.push("    difference: none".to_string());
                } else {
                    difference_found = true;
                    lines.push(format!("    difference: {}", join_workers(&health.missing)));
                }
            } else if health.pending_tasks > 0 && !health.missing.is_empty() {
                difference_found = true;
                lines.push(format!("  {} ({} jobs):", queue, health.pending_tasks));
                lines.push(format!("    difference: {}", join_workers(&health.missing)));
            }
        }
        if !difference_found && !show_all {
            lines.push("  differences: none".to_string());
        }
    }

    fn render_staleness(&self, lines: &mut Vec<String>) {
        if self.explicit_limit {
            lines.push(format!(
                "minutes since last job started (showing only those started more than {}m ago):",
                self.alert_minutes
            ));
        } else {
            lines.push(format!(
                "minutes since last job started (showing all workers, WARN at {}m):",
                self.alert_minutes
            ));
        }

        for (queue, health) in &self.queues {
            if health.pending_tasks == 0 {
                continue;
            }
            lines.push(format!(
                "  {} ({} workers, {} jobs)",
                queue,
                health.configured.len(),
                health.pending_tasks
            ));
            for (worker, liveness) in &health.liveness {
                match liveness {
                    WorkerLiveness::NoData => {
                        lines.push(format!("    {}: missing! (no data)", worker));
                    }
                    WorkerLiveness::Stale {
                        last_started,
                        age_minutes,
                    } => {
                        let stamp = last_started.to_rfc3339_opts(SecondsFormat::Secs, true);
                        if self.explicit_limit {
                            lines.push(format!("    {}: {}: {}", worker, stamp, age_minutes));
                        } else {
                            lines.push(format!(
                                "    {}: {}: {} (WARN)",
                                worker, stamp, age_minutes
                            ));
                        }
                    }
                    WorkerLiveness::Healthy {
                        last_started,
                        age_minutes,
                    } => {
                        if !self.explicit_limit {
                            let stamp = last_started.to_rfc3339_opts(SecondsFormat::Secs, true);
                            lines.push(format!("    {}: {}: {}", worker, stamp, age_minutes));
                        }
                    }
                }
            }
        }
    }
}

fn join_workers(workers: &BTreeSet<WorkerId>) -> String {
    if workers.is_empty() {
        return "none".to_string();
    }
    workers
        .iter()
        .map(|w| w.get().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
