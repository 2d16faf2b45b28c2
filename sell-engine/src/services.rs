//! Service records, lifecycle states, actions and per-service outcomes.
//!
//! A [`Service`] is owned by the orchestrator for one command invocation. Its
//! state only reflects what happened during that invocation; the container
//! runtime keeps the durable picture.

use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;

/// The lifecycle state of a service within one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    /// Nothing has been attempted yet.
    #[default]
    Unknown,
    /// The service image was built.
    Built,
    /// The service is running.
    Started,
    /// The service was stopped.
    Stopped,
    /// Building failed.
    FailedToBuild,
    /// Starting failed.
    FailedToStart,
    /// Stopping failed.
    FailedToStop,
    /// Restarting failed.
    FailedToRestart,
}

impl ServiceState {
    /// Whether this is one of the failed-to-* states.
    #[must_use]
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            Self::FailedToBuild | Self::FailedToStart | Self::FailedToStop | Self::FailedToRestart
        )
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Built => write!(f, "built"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::FailedToBuild => write!(f, "failed-to-build"),
            Self::FailedToStart => write!(f, "failed-to-start"),
            Self::FailedToStop => write!(f, "failed-to-stop"),
            Self::FailedToRestart => write!(f, "failed-to-restart"),
        }
    }
}

/// A lifecycle action applied to a batch of services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Build,
    Start,
    Stop,
    Restart,
}

impl Action {
    /// State reached when the primitive succeeds.
    #[must_use]
    pub fn success_state(self) -> ServiceState {
        match self {
            Self::Build => ServiceState::Built,
            Self::Start | Self::Restart => ServiceState::Started,
            Self::Stop => ServiceState::Stopped,
        }
    }

    /// State reached when the primitive fails.
    #[must_use]
    pub fn failure_state(self) -> ServiceState {
        match self {
            Self::Build => ServiceState::FailedToBuild,
            Self::Start => ServiceState::FailedToStart,
            Self::Stop => ServiceState::FailedToStop,
            Self::Restart => ServiceState::FailedToRestart,
        }
    }

    /// Default outcome message on success.
    #[must_use]
    pub fn success_message(self) -> &'static str {
        match self {
            Self::Build => "Built",
            Self::Start => "Started",
            Self::Stop => "Stopped",
            Self::Restart => "Restarted",
        }
    }

    /// Default outcome message on failure.
    #[must_use]
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Build => "Failed to build",
            Self::Start => "Failed to start",
            Self::Stop => "Failed to stop",
            Self::Restart => "Failed to restart",
        }
    }

    /// Whether the batch runs in ascending ordering index rather than request order.
    #[must_use]
    pub fn is_ordered(self) -> bool {
        matches!(self, Self::Start)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

/// A service known to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Unique lowercase name.
    pub name: String,

    /// Human display name.
    pub display_name: String,

    /// Start ordering index.
    pub order: u32,

    /// State reached during this invocation.
    pub state: ServiceState,

    /// Last status message.
    pub message: String,
}

impl Service {
    /// Create a service in the `unknown` state.
    #[must_use]
    pub fn new(name: &str, order: u32) -> Self {
        let name = name.to_lowercase();
        Self {
            display_name: title_case(&name),
            name,
            order,
            state: ServiceState::Unknown,
            message: String::new(),
        }
    }

    /// Create a service from its manifest entry.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut service = Self::new(&config.name, config.order);
        if let Some(display_name) = &config.display_name {
            service.display_name = display_name.clone();
        }
        service
    }

    /// Record the result of an action.
    pub fn record(&mut self, action: Action, succeeded: bool, message: &str) {
        self.state = if succeeded {
            action.success_state()
        } else {
            action.failure_state()
        };
        self.message = message.to_string();
    }
}

/// Per-service result of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Service the outcome belongs to.
    pub service: String,

    /// Whether the step succeeded.
    pub succeeded: bool,

    /// Short human-readable message.
    pub message: String,
}

impl Outcome {
    #[must_use]
    pub fn success(service: &str, message: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            succeeded: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failure(service: &str, message: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            succeeded: false,
            message: message.into(),
        }
    }
}

/// Services every host runs, which are never published.
pub const INFRASTRUCTURE: [&str; 2] = ["router", "payments"];

/// Whether `name` is one of the shared infrastructure services.
#[must_use]
pub fn is_infrastructure(name: &str) -> bool {
    INFRASTRUCTURE
        .iter()
        .any(|infra| infra.eq_ignore_ascii_case(name))
}

/// Upper-case the first letter of each word.
#[must_use]
pub fn title_case(name: &str) -> String {
    name.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
