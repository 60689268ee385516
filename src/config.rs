use std::env;

use anyhow::Result;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetwatchConfig {
    pub user_agent: String,
    pub alert_minutes: u64,
    pub status_fetch_concurrency: usize,
    pub pushlog: PushlogApiConfig,
    pub queue: QueueApiConfig,
    pub fleet_source: FleetSourceConfig,
    pub influx: Option<InfluxConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushlogApiConfig {
    pub base_url: String,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueApiConfig {
    pub base_url: String,
    pub provisioner: String,
    pub max_worker_types: u64,
    pub max_workers: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSourceConfig {
    pub repo_url: String,
    pub checkout_dir: String,
    pub refresh_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub endpoint: String,
    #[serde(default = "default_influx_database")]
    pub database: String,
}

fn default_influx_database() -> String {
    "capacity_testing".to_string()
}

impl Default for FleetwatchConfig {
    fn default() -> Self {
        FleetwatchConfig {
            user_agent: "fleetwatch (https://github.com/mozilla-platform-ops/android-tools)"
                .to_string(),
            alert_minutes: 60,
            status_fetch_concurrency: 4,
            pushlog: Default::default(),
            queue: Default::default(),
            fleet_source: Default::default(),
            influx: None,
        }
    }
}

impl Default for PushlogApiConfig {
    fn default() -> Self {
        PushlogApiConfig {
            base_url: "https://treeherder.mozilla.org".to_string(),
            projects: vec![
                "try".to_string(),
                "mozilla-inbound".to_string(),
                "autoland".to_string(),
                "mozilla-central".to_string(),
            ],
        }
    }
}

impl Default for QueueApiConfig {
    fn default() -> Self {
        QueueApiConfig {
            base_url: "https://queue.taskcluster.net".to_string(),
            provisioner: "proj-autophone".to_string(),
            max_worker_types: 50,
            max_workers: 50,
        }
    }
}

impl Default for FleetSourceConfig {
    fn default() -> Self {
        let checkout_dir = env::temp_dir().join("fleetwatch/mozilla-bitbar-devicepool");
        FleetSourceConfig {
            repo_url: "https://github.com/bclary/mozilla-bitbar-devicepool.git".to_string(),
            checkout_dir: checkout_dir.to_string_lossy().to_string(),
            refresh_after_secs: 300,
        }
    }
}

impl FleetwatchConfig {
    pub fn from_path(path: &str) -> Result<FleetwatchConfig> {
        let config_str = std::fs::read_to_string(path)?;
        let config: FleetwatchConfig = Figment::new().merge(Yaml::string(&config_str)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pushlog.projects.is_empty() {
            return Err(anyhow::anyhow!("no projects configured"));
        }
        if Url::parse(&self.pushlog.base_url).is_err() {
            return Err(anyhow::anyhow!(
                "invalid pushlog base url: {}",
                self.pushlog.base_url
            ));
        }
        if Url::parse(&self.queue.base_url).is_err() {
            return Err(anyhow::anyhow!(
                "invalid queue base url: {}",
                self.queue.base_url
            ));
        }
        if self.queue.provisioner.is_empty() {
            return Err(anyhow::anyhow!("provisioner must not be empty"));
        }
        if self.queue.max_worker_types == 0 || self.queue.max_workers == 0 {
            return Err(anyhow::anyhow!("queue listing limits must be non-zero"));
        }
        if self.fleet_source.refresh_after_secs == 0 {
            return Err(anyhow::anyhow!(
                "fleet source refresh window must be non-zero"
            ));
        }
        if self.alert_minutes == 0 {
            return Err(anyhow::anyhow!("alert_minutes must be positive"));
        }
        if self.status_fetch_concurrency == 0 {
            return Err(anyhow::anyhow!("status_fetch_concurrency must be non-zero"));
        }
        if let Some(influx) = &self.influx {
            if Url::parse(&influx.endpoint).is_err() {
                return Err(anyhow::anyhow!(
                    "invalid influx endpoint: {}",
                    influx.endpoint
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FleetwatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pushlog.projects.len(), 4);
        assert_eq!(config.queue.provisioner, "proj-autophone");
        assert_eq!(config.alert_minutes, 60);
        assert!(config.influx.is_none());
    }

    #[test]
    fn test_partial_yaml_merges_over_defaults() {
        let yaml = r#"
alert_minutes: 90
queue:
  provisioner: proj-test
influx:
  endpoint: http://localhost:8086
"#;
        let config: FleetwatchConfig = Figment::new()
            .merge(Yaml::string(yaml))
            .extract()
            .unwrap();
        assert_eq!(config.alert_minutes, 90);
        assert_eq!(config.queue.provisioner, "proj-test");
        assert_eq!(config.queue.max_workers, 50);
        assert_eq!(config.pushlog.projects[0], "try");
        let influx = config.influx.unwrap();
        assert_eq!(influx.endpoint, "http://localhost:8086");
        assert_eq!(influx.database, "capacity_testing");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = FleetwatchConfig::default();
        config.pushlog.projects.clear();
        assert!(config.validate().is_err());

        let mut config = FleetwatchConfig::default();
        config.queue.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = FleetwatchConfig::default();
        config.alert_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = FleetwatchConfig::default();
        config.influx = Some(InfluxConfig {
            endpoint: "nope".to_string(),
            database: "capacity_testing".to_string(),
        });
        assert!(config.validate().is_err());
    }
}
