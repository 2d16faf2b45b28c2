//! Dependency installer backed by the system package manager.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use super::{on_path, run, run_checked};
use crate::provisioner::{ProvisionError, SystemInstaller};

const DOCKER: &str = "docker";
const DOCKER_COMPOSE: &str = "docker-compose";
const ZEROTIER: &str = "zerotier";
const ZEROTIER_INSTALL_URL: &str = "https://install.zerotier.com/";
const DOCKER_GROUP: &str = "docker";

/// Installs dependencies with `apt-get` (Linux) or `brew` (macOS) under `sudo`.
#[derive(Debug, Clone, Default)]
pub struct ShellInstaller;

impl ShellInstaller {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn docker_compose_available() -> bool {
        if on_path(DOCKER_COMPOSE).await {
            return true;
        }
        // Compose v2 ships as a docker plugin.
        run(DOCKER, &["compose", "version"])
            .await
            .is_ok_and(|output| output.status.success())
    }

    /// Run each command line in turn, stopping at the first failure.
    async fn install_steps(steps: &[Vec<&str>]) -> bool {
        for step in steps {
            let Some((program, args)) = step.split_first() else {
                continue;
            };
            if let Err(e) = run_checked(program, args).await {
                warn!(error = %e, "Install step failed");
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl SystemInstaller for ShellInstaller {
    async fn check_dependencies(&self) -> Result<Vec<(String, bool)>, ProvisionError> {
        Ok(vec![
            (DOCKER.to_string(), on_path(DOCKER).await),
            (
                DOCKER_COMPOSE.to_string(),
                Self::docker_compose_available().await,
            ),
            (ZEROTIER.to_string(), on_path("zerotier-cli").await),
        ])
    }

    async fn acquire_privilege(&self) -> Result<(), ProvisionError> {
        // Drop any cached timestamp so the operator authenticates this invocation.
        let _ = run("sudo", &["-k"]).await;
        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .await
            .map_err(|e| ProvisionError::PrivilegeDenied(e.to_string()))?;
        if !status.success() {
            return Err(ProvisionError::PrivilegeDenied(format!("sudo exited with {status}")));
        }
        Ok(())
    }

    async fn install_docker_tools(&self) -> bool {
        if cfg!(target_os = "macos") {
            return Self::install_steps(&[vec!["brew", "install", "--cask", "docker"]]).await;
        }

        let user = std::env::var("USER").unwrap_or_default();
        let mut steps = vec![
            vec!["sudo", "apt-get", "update"],
            vec!["sudo", "apt-get", "install", "-y", "docker.io", "docker-compose"],
        ];
        if !user.is_empty() {
            steps.push(vec!["sudo", "usermod", "-aG", DOCKER_GROUP, user.as_str()]);
        }
        let installed = Self::install_steps(&steps).await;
        if installed {
            info!("Installed docker tooling");
        }
        installed
    }

    async fn install_mesh_network_client(&self) -> bool {
        let script = format!("curl -s {ZEROTIER_INSTALL_URL} | sudo bash");
        Self::install_steps(&[vec!["sh", "-c", script.as_str()]]).await
    }

    fn is_privileged_package(&self, name: &str) -> bool {
        matches!(name, DOCKER | DOCKER_COMPOSE)
    }

    fn mesh_network_package(&self) -> &str {
        ZEROTIER
    }

    async fn already_in_privileged_group(&self) -> bool {
        match run("id", &["-nG"]).await {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .split_whitespace()
                .any(|group| group == DOCKER_GROUP),
            Err(e) => {
                warn!(error = %e, "Could not read group membership");
                false
            }
        }
    }

    fn requires_group_membership(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_packages_are_privileged() {
        let installer = ShellInstaller::new();
        assert!(installer.is_privileged_package("docker"));
        assert!(installer.is_privileged_package("docker-compose"));
        assert!(!installer.is_privileged_package("zerotier"));
        assert_eq!(installer.mesh_network_package(), "zerotier");
    }

    #[tokio::test]
    async fn test_check_reports_every_package() -> Result<(), ProvisionError> {
        let deps = ShellInstaller::new().check_dependencies().await?;
        let names: Vec<&str> = deps.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["docker", "docker-compose", "zerotier"]);
        Ok(())
    }
}
