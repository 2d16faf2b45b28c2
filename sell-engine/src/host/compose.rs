//! Container runtime driven through the `docker compose` CLI.

use async_trait::async_trait;
use sell_client::{MarketplaceApi, PublishRequest};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{run, run_checked};
use crate::config::HostConfig;
use crate::lifecycle::{InfrastructureStatus, PrimitiveResult, RuntimeError, RuntimeManager};
use crate::publication::{report_publish_result, HostAddress, PublishListener};

const ROUTER: &str = "router";
const PAYMENTS: &str = "payments";

/// Runs services as containers of one compose project.
#[derive(Debug, Clone)]
pub struct ComposeRuntime {
    compose_file: PathBuf,
    project: String,
}

impl ComposeRuntime {
    pub fn new(compose_file: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            compose_file: compose_file.into(),
            project: project.into(),
        }
    }

    pub fn from_config(host: &HostConfig) -> Self {
        Self::new(host.compose_file.clone(), host.name.clone())
    }

    /// Full argument list for a `docker compose` subcommand.
    fn compose_args<'a>(&'a self, file: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["compose", "-f", file, "-p", self.project.as_str()];
        args.extend_from_slice(rest);
        args
    }

    async fn compose(&self, rest: &[&str]) -> Result<std::process::Output, RuntimeError> {
        let file = self.compose_file.to_string_lossy();
        let args = self.compose_args(&file, rest);
        run_checked("docker", &args).await
    }

    async fn primitive(&self, service: &str, rest: &[&str]) -> PrimitiveResult {
        let mut args = rest.to_vec();
        args.push(service);
        match self.compose(&args).await {
            Ok(_) => PrimitiveResult::ok(),
            Err(e) => {
                warn!(service = %service, error = %e, "Compose command failed");
                failure_result(&e)
            }
        }
    }
}

/// Carry what compose printed into the outcome message.
fn failure_result(error: &RuntimeError) -> PrimitiveResult {
    match error {
        RuntimeError::Failed { stderr, .. } if !stderr.is_empty() => {
            PrimitiveResult::failed(stderr.clone())
        }
        _ => PrimitiveResult::failed(error.to_string()),
    }
}

/// First IPv4 address assigned on any joined mesh network.
fn parse_mesh_address(listnetworks_json: &str) -> Option<String> {
    let networks: serde_json::Value = serde_json::from_str(listnetworks_json).ok()?;
    networks
        .as_array()?
        .iter()
        .filter_map(|network| network.get("assignedAddresses")?.as_array())
        .flatten()
        .filter_map(serde_json::Value::as_str)
        .map(|cidr| cidr.split('/').next().unwrap_or(cidr))
        .find(|addr| addr.parse::<std::net::Ipv4Addr>().is_ok())
        .map(str::to_string)
}

#[async_trait]
impl RuntimeManager for ComposeRuntime {
    async fn build(&self, service: &str) -> PrimitiveResult {
        self.primitive(service, &["build"]).await
    }

    async fn start(&self, service: &str) -> PrimitiveResult {
        self.primitive(service, &["up", "-d"]).await
    }

    async fn stop(&self, service: &str) -> PrimitiveResult {
        self.primitive(service, &["stop"]).await
    }

    async fn restart(&self, service: &str) -> PrimitiveResult {
        self.primitive(service, &["restart"]).await
    }

    async fn running_services(&self) -> Result<Vec<String>, RuntimeError> {
        let output = self
            .compose(&["ps", "--services", "--filter", "status=running"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_lowercase)
            .collect())
    }

    async fn infrastructure_status(&self) -> InfrastructureStatus {
        let runtime_up = run("docker", &["info"])
            .await
            .is_ok_and(|output| output.status.success());
        let running = if runtime_up {
            self.running_services().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not list running services");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        InfrastructureStatus {
            runtime_up,
            market_address: self.market_address().await,
            router: running.iter().any(|s| s == ROUTER),
            payments: running.iter().any(|s| s == PAYMENTS),
        }
    }

    async fn market_address(&self) -> Option<String> {
        match run_checked("zerotier-cli", &["-j", "listnetworks"]).await {
            Ok(output) => parse_mesh_address(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                warn!(error = %e, "Mesh network address unavailable");
                None
            }
        }
    }

    async fn publish_service(
        &self,
        service: &str,
        address: &HostAddress,
        client: &dyn MarketplaceApi,
        listener: &mut dyn PublishListener,
    ) {
        let request = PublishRequest::for_service(service, &address.to_string());
        info!(service = %service, url = %request.app_url, "Publishing");
        let result = client.publish_app(&request).await;
        report_publish_result(service, result, listener);
    }
}
