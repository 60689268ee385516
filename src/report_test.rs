#[cfg(test)]
mod tests {
    use std::{fs, path::Path, sync::Arc};

    use chrono::{Duration, Utc};
    use fleet_api::test_fetcher::ScriptedFetcher;
    use serde_json::json;

    use crate::{
        config::FleetwatchConfig,
        devicepool::LAST_UPDATED_MARKER,
        service::{PendingRun, RunOutcome, Service, WorkersRun},
    };

    const PUSH_BASE: &str = "https://pushlog.example";
    const QUEUE_BASE: &str = "https://queue.example";
    const QUEUE: &str = "gecko-t-ap-batt-g5";

    const FLEET_CONFIG: &str = r#"
device_groups:
  motog5-batt:
    motog5-01: null
    motog5-02: null
projects:
  test-g5:
    device_group_name: motog5-batt
    additional_parameters:
      TC_WORKER_TYPE: gecko-t-ap-batt-g5
"#;

    fn pending_config() -> FleetwatchConfig {
        let mut config = FleetwatchConfig::default();
        config.pushlog.base_url = PUSH_BASE.to_string();
        config
    }

    fn workers_config(checkout: &Path) -> FleetwatchConfig {
        let mut config = FleetwatchConfig::default();
        config.queue.base_url = QUEUE_BASE.to_string();
        config.fleet_source.checkout_dir = checkout.to_string_lossy().to_string();
        config
    }

    fn write_checkout(checkout: &Path) {
        fs::create_dir_all(checkout.join(".git")).unwrap();
        fs::create_dir_all(checkout.join("config")).unwrap();
        fs::write(checkout.join("config/config.yml"), FLEET_CONFIG).unwrap();
        fs::write(checkout.join(LAST_UPDATED_MARKER), b"").unwrap();
    }

    fn push_url(project: &str, count: u64) -> String {
        format!(
            "{}/api/project/{}/push/?full=true&count={}",
            PUSH_BASE, project, count
        )
    }

    fn jobs_url(project: &str, push_id: u64) -> String {
        format!(
            "{}/api/project/{}/jobs/?push_id={}&count=2000",
            PUSH_BASE, project, push_id
        )
    }

    fn worker_types_url() -> String {
        format!(
            "{}/v1/provisioners/proj-autophone/worker-types?limit=50",
            QUEUE_BASE
        )
    }

    fn pending_url(queue: &str) -> String {
        format!("{}/v1/pending/proj-autophone/{}", QUEUE_BASE, queue)
    }

    fn workers_url(queue: &str) -> String {
        format!(
            "{}/v1/provisioners/proj-autophone/worker-types/{}/workers?limit=50",
            QUEUE_BASE, queue
        )
    }

    fn status_url(task: &str) -> String {
        format!("{}/v1/task/{}/status", QUEUE_BASE, task)
    }

    async fn rendered_pending(service: &Service, run: PendingRun) -> String {
        match service.run_pending(run).await.unwrap() {
            RunOutcome::Completed(text) => text,
            RunOutcome::Interrupted => panic!("crawl interrupted"),
        }
    }

    async fn rendered_workers(service: &Service, run: WorkersRun) -> String {
        match service.run_workers(run).await.unwrap() {
            RunOutcome::Completed(text) => text,
            RunOutcome::Interrupted => panic!("reconciliation interrupted"),
        }
    }

    #[tokio::test]
    async fn test_pending_command_renders_operator_summary() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            &push_url("try", 3),
            json!({"results": [
                {"id": 11, "revision": "aaa111", "author": "dev@example.com", "push_timestamp": 1000},
                {"id": 12, "revision": "bbb222", "author": "dev@example.com", "push_timestamp": 1100},
            ]}),
        );
        fetcher.script(
            &jobs_url("try", 11),
            json!({"results": [
                {"state": "pending", "platform": "android-hw-g5", "job_type_name": "test-g5", "submit_timestamp": 900},
                {"state": "completed", "platform": "android-hw-g5", "job_type_name": "test-g5", "submit_timestamp": 910},
            ]}),
        );
        fetcher.script(
            &jobs_url("try", 12),
            json!({"results": [
                {"state": "completed", "platform": "android-hw-g5", "job_type_name": "test-g5", "submit_timestamp": 950},
            ]}),
        );
        fetcher.script_error(&push_url("autoland", 3), "dns failure");

        let service = Service::with_fetcher(pending_config(), fetcher.clone());
        let text = rendered_pending(
            &service,
            PendingRun {
                projects: vec!["try".to_string(), "autoland".to_string()],
                platform_filter: None,
                pages: 3,
                page_size: 2,
                early_exit: true,
            },
        )
        .await;

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "-- summary");
        assert!(lines[1].starts_with("autoland project: crawl failed:"));
        assert!(lines[1].contains("dns failure"));
        assert!(lines[2].starts_with("try project: pending tasks: 1, oldest pending submitted "));
        assert!(lines[2].ends_with(" ago"));
        assert_eq!(lines[3], "total pending tasks: 1");
        assert_eq!(lines.len(), 4);
        assert_eq!(fetcher.request_count(), 4);
    }

    #[tokio::test]
    async fn test_pending_platform_filter_is_reflected_in_summary() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            &push_url("try", 3),
            json!({"results": [
                {"id": 21, "revision": "ccc333", "author": "dev@example.com", "push_timestamp": 2000},
            ]}),
        );
        fetcher.script(
            &jobs_url("try", 21),
            json!({"results": [
                {"state": "pending", "platform": "android-hw-p2-unit", "job_type_name": "test-p2", "submit_timestamp": 1900},
                {"state": "pending", "platform": "android-hw-g5-unit", "job_type_name": "test-g5", "submit_timestamp": 1905},
            ]}),
        );

        let service = Service::with_fetcher(pending_config(), fetcher);
        let text = rendered_pending(
            &service,
            PendingRun {
                projects: vec!["try".to_string()],
                platform_filter: Some("p2".to_string()),
                pages: 3,
                page_size: 2,
                early_exit: true,
            },
        )
        .await;

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "-- summary");
        assert!(lines[1].starts_with("try project: pending 'p2' tasks: 1, oldest pending submitted "));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_workers_command_renders_missing_and_stale_workers() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("devicepool");
        write_checkout(&checkout);

        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            &worker_types_url(),
            json!({"workerTypes": [{"workerType": QUEUE}]}),
        );
        fetcher.script(&pending_url(QUEUE), json!({"pendingTasks": 3}));
        fetcher.script(
            &workers_url(QUEUE),
            json!({"workers": [
                {"workerId": "motog5-01", "latestTask": {"taskId": "task01"}},
            ]}),
        );
        fetcher.script(
            &status_url("task01"),
            json!({"status": {"runs": [{"started": "2019-05-10T10:30:00Z"}]}}),
        );

        let service = Service::with_fetcher(workers_config(&checkout), fetcher.clone());
        let text = rendered_workers(
            &service,
            WorkersRun {
                show_all: false,
                force_update: false,
                time_limit: None,
                influx_logging: false,
            },
        )
        .await;

        assert!(text.starts_with("missing workers (present in config, but not observed):\n"));
        assert!(text.contains("\n  gecko-t-ap-batt-g5 (3 jobs):\n    difference: motog5-02\n"));
        assert!(text.contains("minutes since last job started (showing all workers, WARN at 60m):"));
        assert!(text.contains("\n  gecko-t-ap-batt-g5 (2 workers, 3 jobs)\n"));
        assert!(text.contains("\n    motog5-01: 2019-05-10T10:30:00Z: "));
        assert!(text.contains("(WARN)"));
        assert!(text.contains("\n    motog5-02: missing! (no data)"));
        assert_eq!(fetcher.request_count(), 4);
    }

    #[tokio::test]
    async fn test_workers_command_with_explicit_limit_lists_only_stale() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("devicepool");
        write_checkout(&checkout);

        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            &worker_types_url(),
            json!({"workerTypes": [{"workerType": QUEUE}]}),
        );
        fetcher.script(&pending_url(QUEUE), json!({"pendingTasks": 2}));
        fetcher.script(
            &workers_url(QUEUE),
            json!({"workers": [
                {"workerId": "motog5-01", "latestTask": {"taskId": "task01"}},
                {"workerId": "motog5-02", "latestTask": {"taskId": "task02"}},
            ]}),
        );
        let recent = (Utc::now() - Duration::minutes(5)).to_rfc3339();
        fetcher.script(
            &status_url("task01"),
            json!({"status": {"runs": [{"started": recent}]}}),
        );
        fetcher.script(
            &status_url("task02"),
            json!({"status": {"runs": [{"started": "2019-05-10T10:30:00Z"}]}}),
        );

        let service = Service::with_fetcher(workers_config(&checkout), fetcher);
        let text = rendered_workers(
            &service,
            WorkersRun {
                show_all: false,
                force_update: false,
                time_limit: Some(30),
                influx_logging: false,
            },
        )
        .await;

        assert!(text.contains("  differences: none"));
        assert!(text
            .contains("minutes since last job started (showing only those started more than 30m ago):"));
        assert!(text.contains("\n    motog5-02: 2019-05-10T10:30:00Z: "));
        assert!(!text.contains("(WARN)"));
        assert!(!text.contains("motog5-01"));
    }

    #[tokio::test]
    async fn test_workers_influx_logging_requires_configured_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("devicepool");
        write_checkout(&checkout);

        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.script(
            &worker_types_url(),
            json!({"workerTypes": [{"workerType": QUEUE}]}),
        );
        fetcher.script(&pending_url(QUEUE), json!({"pendingTasks": 1}));
        fetcher.script(
            &workers_url(QUEUE),
            json!({"workers": [
                {"workerId": "motog5-01", "latestTask": {"taskId": "task01"}},
            ]}),
        );
        fetcher.script(
            &status_url("task01"),
            json!({"status": {"runs": [{"started": "2019-05-10T10:30:00Z"}]}}),
        );

        let service = Service::with_fetcher(workers_config(&checkout), fetcher);
        let err = service
            .run_workers(WorkersRun {
                show_all: false,
                force_update: false,
                time_limit: None,
                influx_logging: true,
            })
            .await
            .unwrap_err();

        assert!(err
            .to_string()
            .contains("influx logging requested but no influx endpoint is configured"));
    }
}
