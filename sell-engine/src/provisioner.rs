//! Dependency detection and installation.
//!
//! Dependencies are checked fresh on every call and never cached. Missing
//! dependencies are installed per group: the privileged/bridging group is one
//! atomic step with a single outcome, standalone packages get one step each.
//! After installing, the dependencies are checked again rather than trusting
//! the installer's own report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::progress::with_progress;

/// Provisioning errors.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    #[error("Dependency check failed: {0}")]
    CheckFailed(String),

    #[error("Privilege escalation failed: {0}")]
    PrivilegeDenied(String),
}

/// Installation group of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyGroup {
    /// Needs superuser rights and network bridging; installed as one step.
    #[serde(rename = "requires-superuser-and-bridging")]
    PrivilegedBridging,
    /// Installed on its own.
    #[serde(rename = "standalone")]
    Standalone,
}

impl std::fmt::Display for DependencyGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrivilegedBridging => write!(f, "requires-superuser-and-bridging"),
            Self::Standalone => write!(f, "standalone"),
        }
    }
}

/// A system dependency and whether it is currently installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyUnit {
    pub name: String,
    pub installed: bool,
    pub group: DependencyGroup,
}

/// Host package installer.
#[async_trait]
pub trait SystemInstaller: Send + Sync {
    /// Probe every dependency, returning `(name, installed)` pairs.
    async fn check_dependencies(&self) -> Result<Vec<(String, bool)>, ProvisionError>;

    /// Authorize privileged operations for the rest of this invocation.
    async fn acquire_privilege(&self) -> Result<(), ProvisionError>;

    /// Install the container tooling. Returns whether the installer reported success.
    async fn install_docker_tools(&self) -> bool;

    /// Install the mesh network client. Returns whether the installer reported success.
    async fn install_mesh_network_client(&self) -> bool;

    /// Whether a package belongs to the privileged/bridging group.
    fn is_privileged_package(&self, name: &str) -> bool;

    /// Name of the mesh network client package.
    fn mesh_network_package(&self) -> &str;

    /// Whether the current session can already use the privileged group.
    async fn already_in_privileged_group(&self) -> bool;

    /// Whether this platform grants container access through group membership.
    fn requires_group_membership(&self) -> bool;
}

/// Privileged session, authorized at most once per invocation.
#[derive(Default)]
pub struct PrivilegeSession {
    acquired: OnceCell<()>,
}

impl PrivilegeSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the session on first use and reuse it afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if privilege cannot be obtained. A later call retries.
    pub async fn ensure(&self, installer: &dyn SystemInstaller) -> Result<(), ProvisionError> {
        self.acquired
            .get_or_try_init(|| installer.acquire_privilege())
            .await
            .map(|_| ())
    }

    #[must_use]
    pub fn is_acquired(&self) -> bool {
        self.acquired.initialized()
    }
}

/// One installation step and what it reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallStep {
    /// Human label of the step, e.g. `Docker`.
    pub label: String,
    pub group: DependencyGroup,
    pub packages: Vec<String>,
    pub succeeded: bool,
    pub message: String,
}

/// Overall state after provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionStatus {
    /// Every dependency is installed and usable.
    Ready,
    /// Some dependencies are still missing.
    Partial,
    /// Installed, but the user must log out and back in before it is usable.
    NeedsLogout,
}

/// Result of a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    /// Steps attempted, in execution order.
    pub steps: Vec<InstallStep>,
    /// Dependencies as re-checked after installation.
    pub dependencies: Vec<DependencyUnit>,
    pub needs_logout: bool,
}

impl InstallReport {
    /// Dependencies still missing after installation.
    pub fn missing(&self) -> impl Iterator<Item = &DependencyUnit> {
        self.dependencies.iter().filter(|d| !d.installed)
    }

    #[must_use]
    pub fn status(&self) -> ProvisionStatus {
        if self.needs_logout {
            ProvisionStatus::NeedsLogout
        } else if self.missing().next().is_some() {
            ProvisionStatus::Partial
        } else {
            ProvisionStatus::Ready
        }
    }
}

/// Checks and installs host dependencies.
pub struct Provisioner {
    installer: Arc<dyn SystemInstaller>,
    privilege: PrivilegeSession,
}

impl Provisioner {
    pub fn new(installer: Arc<dyn SystemInstaller>) -> Self {
        Self {
            installer,
            privilege: PrivilegeSession::new(),
        }
    }

    /// The privilege session shared by every privileged step of this invocation.
    #[must_use]
    pub fn privilege(&self) -> &PrivilegeSession {
        &self.privilege
    }

    /// Probe dependencies and tag each with its group.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe itself cannot run.
    pub async fn check_dependencies(&self) -> Result<Vec<DependencyUnit>, ProvisionError> {
        let probed = self.installer.check_dependencies().await?;
        Ok(probed
            .into_iter()
            .map(|(name, installed)| {
                let group = if self.installer.is_privileged_package(&name) {
                    DependencyGroup::PrivilegedBridging
                } else {
                    DependencyGroup::Standalone
                };
                DependencyUnit {
                    name,
                    installed,
                    group,
                }
            })
            .collect())
    }

    /// Install the missing units and re-check.
    ///
    /// Individual step failures end up in the report; only a failing
    /// re-check is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the final dependency check cannot run.
    pub async fn install(&self, missing: &[DependencyUnit]) -> Result<InstallReport, ProvisionError> {
        let mut steps = Vec::new();

        let privileged: Vec<String> = missing
            .iter()
            .filter(|d| !d.installed && d.group == DependencyGroup::PrivilegedBridging)
            .map(|d| d.name.clone())
            .collect();
        if !privileged.is_empty() {
            steps.push(self.install_privileged_group(privileged).await);
        }

        for unit in missing
            .iter()
            .filter(|d| !d.installed && d.group == DependencyGroup::Standalone)
        {
            steps.push(self.install_standalone(&unit.name).await);
        }

        let dependencies = self.check_dependencies().await?;
        for dep in dependencies.iter().filter(|d| !d.installed) {
            warn!(package = %dep.name, "Dependency still missing after install");
        }

        let privileged_ready = dependencies
            .iter()
            .filter(|d| d.group == DependencyGroup::PrivilegedBridging)
            .all(|d| d.installed);
        let needs_logout = privileged_ready
            && self.installer.requires_group_membership()
            && !self.installer.already_in_privileged_group().await;
        if needs_logout {
            info!("Container tooling requires logging out and back in");
        }

        Ok(InstallReport {
            steps,
            dependencies,
            needs_logout,
        })
    }

    /// Check dependencies and install whatever is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency check cannot run.
    pub async fn ensure(&self) -> Result<InstallReport, ProvisionError> {
        let dependencies = self.check_dependencies().await?;
        if dependencies.iter().all(|d| d.installed) {
            let needs_logout = self.installer.requires_group_membership()
                && !self.installer.already_in_privileged_group().await;
            return Ok(InstallReport {
                steps: Vec::new(),
                dependencies,
                needs_logout,
            });
        }
        self.install(&dependencies).await
    }

    async fn install_privileged_group(&self, packages: Vec<String>) -> InstallStep {
        let label = "Docker".to_string();
        if let Err(e) = self.privilege.ensure(self.installer.as_ref()).await {
            warn!(error = %e, "Skipping privileged install");
            return InstallStep {
                label,
                group: DependencyGroup::PrivilegedBridging,
                packages,
                succeeded: false,
                message: e.to_string(),
            };
        }

        info!(packages = ?packages, "Installing container tooling");
        let succeeded =
            with_progress("Installing Docker Tools", self.installer.install_docker_tools()).await;
        if !succeeded {
            warn!("Container tooling install failed");
        }
        InstallStep {
            label,
            group: DependencyGroup::PrivilegedBridging,
            packages,
            succeeded,
            message: installed_message(succeeded),
        }
    }

    async fn install_standalone(&self, name: &str) -> InstallStep {
        let step = |succeeded: bool, message: String| InstallStep {
            label: name.to_string(),
            group: DependencyGroup::Standalone,
            packages: vec![name.to_string()],
            succeeded,
            message,
        };

        if name != self.installer.mesh_network_package() {
            warn!(package = %name, "No installer available");
            return step(false, "No installer available".to_string());
        }

        if let Err(e) = self.privilege.ensure(self.installer.as_ref()).await {
            warn!(package = %name, error = %e, "Skipping install");
            return step(false, e.to_string());
        }

        info!(package = %name, "Installing mesh network client");
        let label = format!("Installing {name}");
        let succeeded =
            with_progress(&label, self.installer.install_mesh_network_client()).await;
        if !succeeded {
            warn!(package = %name, "Install failed");
        }
        step(succeeded, installed_message(succeeded))
    }
}

fn installed_message(installed: bool) -> String {
    let message = if installed { "Installed" } else { "Not installed" };
    message.to_string()
}
