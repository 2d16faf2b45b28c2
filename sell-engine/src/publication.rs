//! Marketplace publication workflow.
//!
//! Whether a service is published is never stored. Each run lists every app
//! the identity has published (all pages), parses each listing URL back into
//! an `(address, port, service)` triple, and publishes only the started
//! services missing from that set. Listings whose URL does not match are
//! ignored.

use regex::Regex;
use sell_client::{ClientError, MarketplaceApi};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lifecycle::RuntimeManager;
use crate::progress::with_progress;

static APP_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(\d{1,3}(?:\.\d{1,3}){3}):(\d+)/(\w+)")
        .expect("app URL pattern is a valid regex")
});

/// Publication errors.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to list published apps: {0}")]
    Listing(#[from] ClientError),
}

/// Where this host's services are reachable on the marketplace network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress {
    pub address: String,
    pub port: u16,
}

impl HostAddress {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// The published identity a service on this host would have.
    #[must_use]
    pub fn app_for(&self, service: &str) -> PublishedApp {
        PublishedApp {
            address: self.address.clone(),
            port: self.port,
            service: service.to_lowercase(),
        }
    }
}

impl std::fmt::Display for HostAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A published listing, identified by address, port and service name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublishedApp {
    pub address: String,
    pub port: u16,
    pub service: String,
}

impl PublishedApp {
    /// Parse a listing URL such as `http://10.244.1.5:8080/ping/`.
    ///
    /// Returns `None` when the URL does not have the expected shape.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let captures = APP_URL.captures(url)?;
        let port = captures.get(2)?.as_str().parse().ok()?;
        Some(Self {
            address: captures.get(1)?.as_str().to_string(),
            port,
            service: captures.get(3)?.as_str().to_lowercase(),
        })
    }
}

impl std::fmt::Display for PublishedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.address, self.port, self.service)
    }
}

/// Fetch every app `publisher` has published, following all pages.
///
/// # Errors
///
/// Returns an error if any page cannot be fetched.
pub async fn fetch_published_apps(
    client: &dyn MarketplaceApi,
    publisher: &str,
) -> Result<HashSet<PublishedApp>, PublishError> {
    let first = client.get_published_apps(publisher, 0).await?;
    let mut apps = HashSet::new();
    if first.total_pages == 0 {
        return Ok(apps);
    }

    let mut listings = first.results;
    for page in 1..first.total_pages {
        let next = client.get_published_apps(publisher, page).await?;
        listings.extend(next.results);
    }

    for listing in listings {
        match PublishedApp::parse(&listing.app_url) {
            Some(app) => {
                apps.insert(app);
            }
            None => debug!(url = %listing.app_url, "Ignoring unrecognised listing"),
        }
    }
    Ok(apps)
}

/// How a single publish attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishStatus {
    Published,
    AlreadyPublished,
    FailedToPublish,
    UnknownError,
}

impl PublishStatus {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Published => "Published",
            Self::AlreadyPublished => "Endpoint already published",
            Self::FailedToPublish => "Failed to publish",
            Self::UnknownError => "An unknown error occurred",
        }
    }
}

/// Per-service publication outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub service: String,
    pub status: PublishStatus,
}

impl PublishOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == PublishStatus::Published
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        self.status.message()
    }
}

/// Receives the outcome of a publish attempt.
pub trait PublishListener: Send {
    fn on_published(&mut self, service: &str);

    fn on_already_published(&mut self, service: &str);

    fn on_failed(&mut self, service: &str);

    fn on_unknown_error(&mut self, service: &str);
}

/// Map the marketplace's answer to a publish request onto a listener callback.
pub fn report_publish_result(
    service: &str,
    result: sell_client::Result<()>,
    listener: &mut dyn PublishListener,
) {
    match result {
        Ok(()) => listener.on_published(service),
        Err(ClientError::Conflict(_)) => listener.on_already_published(service),
        Err(
            ClientError::AuthRejected { .. }
            | ClientError::NotAuthenticated
            | ClientError::Http { .. },
        ) => {
            listener.on_failed(service);
        }
        Err(e) => {
            warn!(service = %service, error = %e, "Unexpected publish error");
            listener.on_unknown_error(service);
        }
    }
}

/// Listener that records the first outcome reported per attempt.
#[derive(Debug, Default)]
struct OutcomeCollector {
    status: Option<PublishStatus>,
}

impl OutcomeCollector {
    fn report(&mut self, service: &str, status: PublishStatus) {
        if self.status.is_some() {
            warn!(service = %service, ?status, "Ignoring extra publish callback");
            return;
        }
        self.status = Some(status);
    }
}

impl PublishListener for OutcomeCollector {
    fn on_published(&mut self, service: &str) {
        self.report(service, PublishStatus::Published);
    }

    fn on_already_published(&mut self, service: &str) {
        self.report(service, PublishStatus::AlreadyPublished);
    }

    fn on_failed(&mut self, service: &str) {
        self.report(service, PublishStatus::FailedToPublish);
    }

    fn on_unknown_error(&mut self, service: &str) {
        self.report(service, PublishStatus::UnknownError);
    }
}

/// Yes/no confirmation from the operator.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Publishes started services that the marketplace does not list yet.
pub struct PublicationWorkflow {
    client: Arc<dyn MarketplaceApi>,
    runtime: Arc<dyn RuntimeManager>,
    confirm: Arc<dyn Confirm>,
    publisher: String,
}

impl PublicationWorkflow {
    pub fn new(
        client: Arc<dyn MarketplaceApi>,
        runtime: Arc<dyn RuntimeManager>,
        confirm: Arc<dyn Confirm>,
        publisher: impl Into<String>,
    ) -> Self {
        Self {
            client,
            runtime,
            confirm,
            publisher: publisher.into(),
        }
    }

    /// Started services not yet published at `host`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if the published listing cannot be fetched.
    pub async fn unpublished(
        &self,
        started: &[String],
        host: &HostAddress,
    ) -> Result<Vec<String>, PublishError> {
        let published = fetch_published_apps(self.client.as_ref(), &self.publisher).await?;
        let mut seen = HashSet::new();
        Ok(started
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| !published.contains(&host.app_for(s)))
            .filter(|s| seen.insert(s.clone()))
            .collect())
    }

    /// Publish every started service missing from the marketplace.
    ///
    /// Returns immediately, without prompting, when nothing is missing. A
    /// declined confirmation publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the published listing cannot be fetched.
    pub async fn diff_and_publish(
        &self,
        started: &[String],
        host: &HostAddress,
        assume_yes: bool,
    ) -> Result<Vec<PublishOutcome>, PublishError> {
        let missing = self.unpublished(started, host).await?;
        if missing.is_empty() {
            debug!("Nothing to publish");
            return Ok(Vec::new());
        }

        if !assume_yes
            && !self
                .confirm
                .confirm("Would you like to publish the successfully started services?")
        {
            info!("New services not published to the marketplace");
            return Ok(Vec::new());
        }

        Ok(with_progress("Publishing services", self.publish_all(&missing, host)).await)
    }

    async fn publish_all(&self, services: &[String], host: &HostAddress) -> Vec<PublishOutcome> {
        let mut outcomes = Vec::with_capacity(services.len());
        for service in services {
            let mut collector = OutcomeCollector::default();
            self.runtime
                .publish_service(service, host, self.client.as_ref(), &mut collector)
                .await;

            let status = collector.status.unwrap_or_else(|| {
                warn!(service = %service, "Publish reported no outcome");
                PublishStatus::UnknownError
            });
            info!(service = %service, ?status, "Publish finished");
            outcomes.push(PublishOutcome {
                service: service.clone(),
                status,
            });
        }
        outcomes
    }
}
