//! Service lifecycle orchestration.
//!
//! The [`Orchestrator`] applies one [`Action`] to a batch of services. Every
//! requested name gets exactly one [`Outcome`], whether or not its primitive
//! succeeded, and a failure never stops the rest of the batch. Each service
//! gets exactly one runtime primitive call; failed primitives are not retried.
//!
//! Starts run in ascending ordering index so infrastructure comes up before
//! the services that depend on it. Ties keep request order.

use async_trait::async_trait;
use sell_client::MarketplaceApi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SellConfig;
use crate::publication::{HostAddress, PublishListener};
use crate::services::{Action, Outcome, Service, ServiceState};

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Result of one lifecycle primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveResult {
    pub succeeded: bool,
    /// Message from the runtime; the action's default message is used when absent.
    pub message: Option<String>,
}

impl PrimitiveResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            succeeded: true,
            message: None,
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: Some(message.into()),
        }
    }
}

/// Health of the shared infrastructure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureStatus {
    /// Container daemon or VM reachable.
    pub runtime_up: bool,
    /// Marketplace network address, when connected.
    pub market_address: Option<String>,
    /// Router container running.
    pub router: bool,
    /// Payments container running.
    pub payments: bool,
}

/// Container/VM backend that owns the services' durable state.
#[async_trait]
pub trait RuntimeManager: Send + Sync {
    async fn build(&self, service: &str) -> PrimitiveResult;

    async fn start(&self, service: &str) -> PrimitiveResult;

    async fn stop(&self, service: &str) -> PrimitiveResult;

    /// Stop then start, reported as one result.
    async fn restart(&self, service: &str) -> PrimitiveResult;

    /// Names of the services currently running.
    async fn running_services(&self) -> Result<Vec<String>, RuntimeError>;

    async fn infrastructure_status(&self) -> InfrastructureStatus;

    /// Address of this host on the marketplace network.
    async fn market_address(&self) -> Option<String>;

    /// Publish one service, reporting through exactly one listener callback.
    async fn publish_service(
        &self,
        service: &str,
        address: &HostAddress,
        client: &dyn MarketplaceApi,
        listener: &mut dyn PublishListener,
    );
}

/// Drives lifecycle transitions for the services of one invocation.
pub struct Orchestrator {
    runtime: Arc<dyn RuntimeManager>,
    services: Vec<Service>,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn RuntimeManager>, services: Vec<Service>) -> Self {
        Self { runtime, services }
    }

    pub fn from_config(config: &SellConfig, runtime: Arc<dyn RuntimeManager>) -> Self {
        Self::new(runtime, config.to_services())
    }

    /// Look up a service by name (case-insensitive).
    pub fn service(&self, name: &str) -> Option<&Service> {
        let name = name.to_lowercase();
        self.services.iter().find(|s| s.name == name)
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Names of services that reached `started` during this invocation.
    pub fn started_services(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|s| s.state == ServiceState::Started)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Apply `action` to every named service.
    ///
    /// Returns one outcome per requested name, duplicates included. Starts
    /// are attempted and reported in ordering-index order; every other action
    /// keeps request order.
    pub async fn transition(&mut self, names: &[String], action: Action) -> Vec<Outcome> {
        let mut plan: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        if action.is_ordered() {
            plan.sort_by_key(|name| self.service(name).map_or(u32::MAX, |s| s.order));
        }

        let mut outcomes = Vec::with_capacity(plan.len());
        for name in plan {
            let Some(index) = self.services.iter().position(|s| s.name == name) else {
                warn!(service = %name, action = %action, "Unknown service");
                outcomes.push(Outcome::failure(&name, "Unknown service"));
                continue;
            };

            info!(service = %name, action = %action, "Dispatching");
            let result = self.invoke(action, &name).await;
            let message = result.message.unwrap_or_else(|| {
                if result.succeeded {
                    action.success_message().to_string()
                } else {
                    action.failure_message().to_string()
                }
            });

            if result.succeeded {
                info!(service = %name, action = %action, "Succeeded");
            } else {
                warn!(service = %name, action = %action, message = %message, "Failed");
            }

            self.services[index].record(action, result.succeeded, &message);
            outcomes.push(Outcome {
                service: name,
                succeeded: result.succeeded,
                message,
            });
        }
        outcomes
    }

    async fn invoke(&self, action: Action, service: &str) -> PrimitiveResult {
        match action {
            Action::Build => self.runtime.build(service).await,
            Action::Start => self.runtime.start(service).await,
            Action::Stop => self.runtime.stop(service).await,
            Action::Restart => self.runtime.restart(service).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn orchestrator(runtime: Arc<FakeRuntime>) -> Orchestrator {
        Orchestrator::new(
            runtime,
            vec![
                Service::new("ping", 2),
                Service::new("router", 0),
                Service::new("payments", 1),
            ],
        )
    }

    #[tokio::test]
    async fn test_start_runs_in_ordering_index_order() {
        let runtime = Arc::new(FakeRuntime::default());
        let mut orchestrator = orchestrator(Arc::clone(&runtime));

        let outcomes = orchestrator
            .transition(&names(&["ping", "router", "payments"]), Action::Start)
            .await;

        let reported: Vec<&str> = outcomes.iter().map(|o| o.service.as_str()).collect();
        assert_eq!(reported, vec!["router", "payments", "ping"]);
        assert_eq!(
            runtime.calls(),
            vec![
                "start router".to_string(),
                "start payments".to_string(),
                "start ping".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let runtime = Arc::new(FakeRuntime::default().failing("payments"));
        let mut orchestrator = orchestrator(Arc::clone(&runtime));

        let outcomes = orchestrator
            .transition(&names(&["router", "payments", "ping"]), Action::Start)
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].succeeded);
        assert!(!outcomes[1].succeeded);
        assert_eq!(outcomes[1].message, "Failed to start");
        assert!(outcomes[2].succeeded);
        assert_eq!(runtime.calls().len(), 3);
        assert_eq!(
            orchestrator.service("payments").map(|s| s.state),
            Some(ServiceState::FailedToStart)
        );
    }

    #[tokio::test]
    async fn test_one_outcome_per_request_in_request_order() {
        let runtime = Arc::new(FakeRuntime::default().failing("router"));
        let mut orchestrator = orchestrator(Arc::clone(&runtime));
        let request = names(&["ping", "ghost", "router", "ping"]);

        for action in [Action::Build, Action::Stop, Action::Restart] {
            let outcomes = orchestrator.transition(&request, action).await;
            let reported: Vec<&str> = outcomes.iter().map(|o| o.service.as_str()).collect();
            assert_eq!(reported, vec!["ping", "ghost", "router", "ping"]);
        }
    }

    #[tokio::test]
    async fn test_unknown_service_invokes_nothing() {
        let runtime = Arc::new(FakeRuntime::default());
        let mut orchestrator = orchestrator(Arc::clone(&runtime));

        let outcomes = orchestrator.transition(&names(&["ghost"]), Action::Build).await;

        assert_eq!(outcomes, vec![Outcome::failure("ghost", "Unknown service")]);
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_message_wins_over_default() {
        let runtime = Arc::new(FakeRuntime::default().with_message("ping", "Port 8080 in use"));
        let mut orchestrator = orchestrator(Arc::clone(&runtime));

        let outcomes = orchestrator.transition(&names(&["ping"]), Action::Start).await;

        assert_eq!(outcomes[0].message, "Port 8080 in use");
        assert_eq!(
            orchestrator.service("ping").map(|s| s.message.as_str()),
            Some("Port 8080 in use")
        );
    }

    #[tokio::test]
    async fn test_restart_reports_single_outcome() {
        let runtime = Arc::new(FakeRuntime::default());
        let mut orchestrator = orchestrator(Arc::clone(&runtime));

        let outcomes = orchestrator.transition(&names(&["ping"]), Action::Restart).await;

        assert_eq!(outcomes, vec![Outcome::success("ping", "Restarted")]);
        assert_eq!(runtime.calls(), vec!["restart ping".to_string()]);
        assert_eq!(orchestrator.started_services(), vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_primitive_is_not_retried() {
        let runtime = Arc::new(FakeRuntime::default().failing("ping"));
        let mut orchestrator = orchestrator(Arc::clone(&runtime));

        orchestrator.transition(&names(&["ping"]), Action::Build).await;

        assert_eq!(runtime.calls(), vec!["build ping".to_string()]);
    }
}
