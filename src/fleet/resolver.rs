use std::collections::{BTreeMap, BTreeSet};

use data_model::{ConfiguredWorkers, FleetConfig, QueueId, WorkerId};
use tracing::debug;

/// Device group families this tool manages. Other groups in the fleet config
/// belong to other tooling and are ignored.
const DEVICE_GROUP_PREFIXES: [&str; 2] = ["motog5", "pixel2"];
const PROJECT_SUFFIXES: [&str; 2] = ["p2", "g5"];
const WORKER_TYPE_PARAMETER: &str = "TC_WORKER_TYPE";

/// Links device groups to queue names through the projects that reference
/// them. Projects with incomplete wiring (no worker-type parameter, no device
/// group reference, or a reference to an unknown or empty group) are skipped
/// rather than treated as errors.
pub fn resolve(config: &FleetConfig) -> ConfiguredWorkers {
    let mut device_groups: BTreeMap<&str, BTreeSet<WorkerId>> = BTreeMap::new();
    for (name, devices) in &config.device_groups {
        if !DEVICE_GROUP_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            continue;
        }
        let Some(devices) = devices else {
            continue;
        };
        if devices.is_empty() {
            continue;
        }
        device_groups.insert(
            name.as_str(),
            devices
                .keys()
                .map(|device| WorkerId::new(device.clone()))
                .collect(),
        );
    }

    let mut configured = ConfiguredWorkers::new();
    for (project, settings) in &config.projects {
        if !PROJECT_SUFFIXES
            .iter()
            .any(|suffix| project.ends_with(suffix))
        {
            continue;
        }
        let Some(queue) = settings
            .additional_parameters
            .get(WORKER_TYPE_PARAMETER)
            .and_then(|value| value.as_str())
        else {
            debug!(project = %project, "project has no worker type parameter, skipping");
            continue;
        };
        let Some(group_name) = settings.device_group_name.as_deref() else {
            debug!(project = %project, "project names no device group, skipping");
            continue;
        };
        let Some(workers) = device_groups.get(group_name) else {
            debug!(
                project = %project,
                device_group = group_name,
                "project references an unknown device group, skipping"
            );
            continue;
        };
        configured.insert(QueueId::new(queue.to_string()), workers.clone());
    }
    configured
}
