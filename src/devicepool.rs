use std::path::Path;

use anyhow::{bail, Context, Result};
use data_model::FleetConfig;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::FleetSourceConfig;

/// Touched after every successful clone or pull; its mtime is the checkout's
/// age. Lives under .git/ so a hard reset never removes it.
pub(crate) const LAST_UPDATED_MARKER: &str = ".git/fleetwatch_last_updated";

/// Keeps a local checkout of the declarative fleet-config repository and
/// loads `config/config.yml` out of it.
pub struct DevicepoolSource {
    config: FleetSourceConfig,
}

impl DevicepoolSource {
    pub fn new(config: FleetSourceConfig) -> Self {
        DevicepoolSource { config }
    }

    pub async fn load_fleet_config(&self, force_update: bool) -> Result<FleetConfig> {
        self.clone_or_update(force_update).await?;
        let path = Path::new(&self.config.checkout_dir).join("config/config.yml");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading fleet config at {}", path.display()))?;
        let config: FleetConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing fleet config at {}", path.display()))?;
        Ok(config)
    }

    async fn clone_or_update(&self, force_update: bool) -> Result<()> {
        let checkout = Path::new(&self.config.checkout_dir);
        let marker = checkout.join(LAST_UPDATED_MARKER);

        if checkout.exists() {
            if !force_update && self.checkout_is_fresh(&marker) {
                debug!(
                    checkout = %checkout.display(),
                    "fleet config checkout is fresh, not updating"
                );
                return Ok(());
            }
            run_git(checkout, &["reset", "--hard"]).await?;
            if let Err(err) = run_git(checkout, &["pull", "--rebase"]).await {
                warn!(
                    checkout = %checkout.display(),
                    "pull failed, recloning: {:?}", err
                );
                tokio::fs::remove_dir_all(checkout)
                    .await
                    .context("removing broken checkout")?;
                self.clone_fresh(checkout).await?;
            }
        } else {
            self.clone_fresh(checkout).await?;
        }

        tokio::fs::write(&marker, b"")
            .await
            .context("touching checkout marker")?;
        Ok(())
    }

    fn checkout_is_fresh(&self, marker: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(marker) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match modified.elapsed() {
            Ok(elapsed) => elapsed.as_secs() < self.config.refresh_after_secs,
            Err(_) => true,
        }
    }

    async fn clone_fresh(&self, checkout: &Path) -> Result<()> {
        if let Some(parent) = checkout.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("creating checkout parent directory")?;
        }
        info!(repo = %self.config.repo_url, "cloning fleet config repository");
        let output = Command::new("git")
            .arg("clone")
            .arg(&self.config.repo_url)
            .arg(checkout)
            .output()
            .await
            .context("running git clone")?;
        if !output.status.success() {
            bail!(
                "git clone of {} failed: {}",
                self.config.repo_url,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

async fn run_git(checkout: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(checkout)
        .output()
        .await
        .with_context(|| format!("running git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn source_for(checkout: &Path, refresh_after_secs: u64) -> DevicepoolSource {
        DevicepoolSource::new(FleetSourceConfig {
            repo_url: "https://git.example/devicepool.git".to_string(),
            checkout_dir: checkout.to_string_lossy().to_string(),
            refresh_after_secs,
        })
    }

    fn write_checkout(checkout: &Path, config_yml: &str) {
        fs::create_dir_all(checkout.join(".git")).unwrap();
        fs::create_dir_all(checkout.join("config")).unwrap();
        fs::write(checkout.join("config/config.yml"), config_yml).unwrap();
        fs::write(checkout.join(LAST_UPDATED_MARKER), b"").unwrap();
    }

    #[tokio::test]
    async fn test_fresh_checkout_loads_without_git() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("devicepool");
        write_checkout(
            &checkout,
            r#"
device_groups:
  motog5-batt:
    motog5-01: null
projects:
  test-g5:
    device_group_name: motog5-batt
    additional_parameters:
      TC_WORKER_TYPE: gecko-t-ap-batt-g5
"#,
        );

        let source = source_for(&checkout, 300);
        let config = source.load_fleet_config(false).await.unwrap();

        assert_eq!(config.device_groups.len(), 1);
        assert_eq!(config.projects.len(), 1);
        assert!(config
            .projects
            .get("test-g5")
            .unwrap()
            .additional_parameters
            .contains_key("TC_WORKER_TYPE"));
    }

    #[tokio::test]
    async fn test_malformed_fleet_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let checkout = dir.path().join("devicepool");
        write_checkout(&checkout, "device_groups: [not, a, mapping]");

        let source = source_for(&checkout, 300);
        let err = source.load_fleet_config(false).await.unwrap_err();

        assert!(err.to_string().contains("parsing fleet config"));
    }

    #[test]
    fn test_missing_marker_means_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_for(dir.path(), 300);

        assert!(!source.checkout_is_fresh(&dir.path().join("no_such_marker")));
    }

    #[test]
    fn test_recent_marker_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        fs::write(&marker, b"").unwrap();

        let source = source_for(dir.path(), 300);
        assert!(source.checkout_is_fresh(&marker));
    }
}
