//! CLI commands and their handlers.
//!
//! Handlers return status lines instead of printing, so the binary decides how
//! to render them. Per-entity failures become failed lines; only invocation
//! level problems (unreadable ledger, missing credentials) are errors.

use clap::{Args, Parser, Subcommand};
use sell_client::MarketplaceApi;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::balance::{BalanceError, BalanceTarget, Reconciler, WalletProvider};
use crate::config::{ConfigError, SellConfig};
use crate::credentials::{Credentials, CredentialsError, PasswordPrompt, login_with_retry};
use crate::earnings::{EarningsError, EarningsStore};
use crate::lifecycle::{Orchestrator, RuntimeError, RuntimeManager};
use crate::provisioner::{ProvisionError, ProvisionStatus, Provisioner, SystemInstaller};
use crate::publication::{Confirm, HostAddress, PublicationWorkflow};
use crate::report::{self, StatusLine};
use crate::services::{Action, Outcome, is_infrastructure, title_case};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Earnings(#[from] EarningsError),

    #[error(transparent)]
    Balance(#[from] BalanceError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error("No marketplace credentials found at {0}")]
    MissingCredentials(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// sell - host monetized services on this machine
#[derive(Parser, Debug)]
#[command(name = "sell")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run in verbose mode (debug logging)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Services a lifecycle command applies to.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Service names
    pub services: Vec<String>,

    /// Every enabled service
    #[arg(long)]
    pub all: bool,
}

/// sell subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check and install missing dependencies
    Install,

    /// Build service images
    Build {
        #[command(flatten)]
        selection: Selection,
    },

    /// Start services, then offer to publish them
    Start {
        #[command(flatten)]
        selection: Selection,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,

        /// Do not publish started services
        #[arg(long)]
        no_publish: bool,
    },

    /// Stop services
    Stop {
        #[command(flatten)]
        selection: Selection,
    },

    /// Restart services
    Restart {
        #[command(flatten)]
        selection: Selection,
    },

    /// Publish running services that are not listed yet
    Publish {
        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show dependencies, infrastructure, services and earnings
    Status {
        /// Break earnings down by pool
        #[arg(long)]
        detail: bool,
    },

    /// Show earnings per service
    Earnings {
        /// Service names (default: every enabled service)
        services: Vec<String>,

        /// Break earnings down by pool
        #[arg(long)]
        detail: bool,
    },

    /// Show wallet balances
    Balance,
}

impl Command {
    /// The lifecycle action behind a command, if it has one.
    #[must_use]
    pub fn action(&self) -> Option<(Action, &Selection)> {
        match self {
            Self::Build { selection } => Some((Action::Build, selection)),
            Self::Start { selection, .. } => Some((Action::Start, selection)),
            Self::Stop { selection } => Some((Action::Stop, selection)),
            Self::Restart { selection } => Some((Action::Restart, selection)),
            Self::Install
            | Self::Publish { .. }
            | Self::Status { .. }
            | Self::Earnings { .. }
            | Self::Balance => None,
        }
    }
}

/// Collaborators for one invocation.
pub struct App {
    config: SellConfig,
    credentials: Option<Credentials>,
    runtime: Arc<dyn RuntimeManager>,
    marketplace: Arc<dyn MarketplaceApi>,
    earnings: Arc<dyn EarningsStore>,
    confirm: Arc<dyn Confirm>,
    password: Arc<dyn PasswordPrompt>,
    provisioner: Provisioner,
    reconciler: Reconciler,
    session: OnceCell<()>,
}

/// Everything [`App`] needs from the host.
pub struct Collaborators {
    pub runtime: Arc<dyn RuntimeManager>,
    pub installer: Arc<dyn SystemInstaller>,
    pub marketplace: Arc<dyn MarketplaceApi>,
    pub wallets: Arc<dyn WalletProvider>,
    pub earnings: Arc<dyn EarningsStore>,
    pub confirm: Arc<dyn Confirm>,
    pub password: Arc<dyn PasswordPrompt>,
}

impl App {
    pub fn new(
        config: SellConfig,
        credentials: Option<Credentials>,
        collaborators: Collaborators,
    ) -> Self {
        let reconciler = Reconciler::new(
            &config,
            Arc::clone(&collaborators.marketplace),
            collaborators.wallets,
        );
        Self {
            provisioner: Provisioner::new(collaborators.installer),
            reconciler,
            config,
            credentials,
            runtime: collaborators.runtime,
            marketplace: collaborators.marketplace,
            earnings: collaborators.earnings,
            confirm: collaborators.confirm,
            password: collaborators.password,
            session: OnceCell::new(),
        }
    }

    /// Run a command.
    ///
    /// # Errors
    ///
    /// Returns an error only for invocation-level failures.
    pub async fn execute(&self, command: &Command) -> Result<Vec<StatusLine>> {
        match command {
            Command::Install => self.handle_install().await,
            Command::Build { .. } | Command::Stop { .. } | Command::Restart { .. } => {
                let Some((action, selection)) = command.action() else {
                    return Ok(Vec::new());
                };
                self.handle_transition(action, selection).await
            }
            Command::Start {
                selection,
                yes,
                no_publish,
            } => self.handle_start(selection, *yes, *no_publish).await,
            Command::Publish { yes } => self.handle_publish(*yes).await,
            Command::Status { detail } => self.handle_status(*detail).await,
            Command::Earnings { services, detail } => {
                self.handle_earnings(services, *detail).await
            }
            Command::Balance => self.handle_balance().await,
        }
    }

    async fn handle_install(&self) -> Result<Vec<StatusLine>> {
        let provisioned = self.provisioner.ensure().await?;
        let mut lines = report::install_step_lines(&provisioned.steps);
        lines.extend(report::dependency_lines(&provisioned.dependencies));
        if provisioned.status() == ProvisionStatus::NeedsLogout {
            lines.push(logout_line());
        }
        Ok(lines)
    }

    /// Provision before a lifecycle action. Returns the lines to show and
    /// whether the action can go ahead.
    async fn prepare(&self) -> Result<(Vec<StatusLine>, bool)> {
        let provisioned = self.provisioner.ensure().await?;
        let mut lines = report::install_step_lines(&provisioned.steps);
        match provisioned.status() {
            ProvisionStatus::Ready => Ok((lines, true)),
            ProvisionStatus::Partial => {
                warn!("Continuing with missing dependencies");
                lines.extend(report::dependency_lines(&provisioned.dependencies));
                Ok((lines, true))
            }
            ProvisionStatus::NeedsLogout => {
                lines.push(logout_line());
                Ok((lines, false))
            }
        }
    }

    async fn handle_transition(
        &self,
        action: Action,
        selection: &Selection,
    ) -> Result<Vec<StatusLine>> {
        let (mut lines, proceed) = self.prepare().await?;
        if !proceed {
            return Ok(lines);
        }
        let mut orchestrator = Orchestrator::from_config(&self.config, Arc::clone(&self.runtime));
        let names = self.config.select(&selection.services, selection.all);
        let outcomes = orchestrator.transition(&names, action).await;
        lines.extend(report::outcome_lines(&outcomes));
        Ok(lines)
    }

    async fn handle_start(
        &self,
        selection: &Selection,
        yes: bool,
        no_publish: bool,
    ) -> Result<Vec<StatusLine>> {
        let (mut lines, proceed) = self.prepare().await?;
        if !proceed {
            return Ok(lines);
        }
        let mut orchestrator = Orchestrator::from_config(&self.config, Arc::clone(&self.runtime));
        let names = self.config.select(&selection.services, selection.all);
        let outcomes = orchestrator.transition(&names, Action::Start).await;
        lines.extend(report::outcome_lines(&outcomes));

        if no_publish {
            return Ok(lines);
        }
        let started: Vec<String> = orchestrator
            .started_services()
            .into_iter()
            .filter(|s| !is_infrastructure(s))
            .collect();
        if started.is_empty() {
            return Ok(lines);
        }
        lines.extend(self.publish(&started, yes).await);
        Ok(lines)
    }

    async fn handle_publish(&self, yes: bool) -> Result<Vec<StatusLine>> {
        let running: Vec<String> = self
            .runtime
            .running_services()
            .await?
            .into_iter()
            .filter(|s| !is_infrastructure(s))
            .collect();
        if running.is_empty() {
            return Ok(vec![StatusLine::new("Services", "None running", false)]);
        }
        Ok(self.publish(&running, yes).await)
    }

    /// Publish `started`. Failures become a failed "Publish" line so the
    /// lines already produced by the caller survive.
    async fn publish(&self, started: &[String], yes: bool) -> Vec<StatusLine> {
        let Some(address) = self.market_address().await else {
            return vec![StatusLine::new("Marketplace network", "Not connected", false)];
        };
        let host = HostAddress::new(address, self.config.host.server_port);

        let credentials = match self.login().await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Publishing skipped");
                return vec![StatusLine::new("Publish", e.to_string(), false)];
            }
        };
        let workflow = PublicationWorkflow::new(
            Arc::clone(&self.marketplace),
            Arc::clone(&self.runtime),
            Arc::clone(&self.confirm),
            credentials.username.clone(),
        );
        match workflow.diff_and_publish(started, &host, yes).await {
            Ok(outcomes) => report::publish_lines(&outcomes),
            Err(e) => {
                warn!(error = %e, "Publishing skipped");
                vec![StatusLine::new("Publish", e.to_string(), false)]
            }
        }
    }

    async fn handle_status(&self, detail: bool) -> Result<Vec<StatusLine>> {
        let dependencies = self.provisioner.check_dependencies().await?;
        let mut lines = report::dependency_lines(&dependencies);

        let infrastructure = self.runtime.infrastructure_status().await;
        lines.extend(report::infrastructure_lines(&infrastructure));

        let running = self.runtime.running_services().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not list running services");
            Vec::new()
        });
        let rate = self.reconciler.exchange_rate().await;
        let address = match &self.config.host.market_address {
            Some(address) => Some(address.clone()),
            None => infrastructure.market_address.clone(),
        };

        for name in self.application_services() {
            let is_running = running.iter().any(|r| r == &name);
            let outcome = if is_running {
                Outcome::success(&name, "Running")
            } else {
                Outcome::failure(&name, "Not running")
            };
            let record = self.earnings.get_earnings(&name)?;
            let mut line = if detail {
                let mut line = report::earnings_line(&name, &record, rate, true);
                line.message.insert(0, outcome.message.clone());
                line.state = Some(outcome.succeeded);
                line
            } else {
                report::service_status_line(&outcome, Some(&record), rate)
            };
            if is_running
                && let Some(address) = &address
                && let Some(usage) =
                    report::example_usage(&name, address, self.config.host.server_port)
            {
                line.message.push(format!("Usage: {usage}"));
            }
            lines.push(line);
        }
        Ok(lines)
    }

    async fn handle_earnings(&self, services: &[String], detail: bool) -> Result<Vec<StatusLine>> {
        let names = if services.is_empty() {
            self.application_services()
        } else {
            services.iter().map(|s| s.to_lowercase()).collect()
        };
        let rate = self.reconciler.exchange_rate().await;
        let mut lines = Vec::with_capacity(names.len());
        for name in names {
            let record = self.earnings.get_earnings(&name)?;
            lines.push(report::earnings_line(&name, &record, rate, detail));
        }
        Ok(lines)
    }

    async fn handle_balance(&self) -> Result<Vec<StatusLine>> {
        self.login().await?;
        let rate = self.reconciler.exchange_rate().await;
        let pass = self.reconciler.begin_pass().await?;

        let server = pass.balance(&BalanceTarget::Host).await;
        let mut lines = vec![report::balance_line("Server", &server, rate)];

        for service in &self.config.services {
            if !service.enabled || is_infrastructure(&service.name) {
                continue;
            }
            if service.wallet_mnemonic.is_none() {
                continue;
            }
            let balance = pass
                .balance(&BalanceTarget::Service(service.name.clone()))
                .await;
            lines.push(report::balance_line(
                &title_case(&service.name),
                &balance,
                rate,
            ));
        }
        Ok(lines)
    }

    /// Enabled services other than the shared infrastructure.
    fn application_services(&self) -> Vec<String> {
        self.config
            .enabled_service_names()
            .into_iter()
            .filter(|s| !is_infrastructure(s))
            .collect()
    }

    async fn market_address(&self) -> Option<String> {
        match &self.config.host.market_address {
            Some(address) => Some(address.clone()),
            None => self.runtime.market_address().await,
        }
    }

    /// Log in once per invocation.
    async fn login(&self) -> Result<&Credentials> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            CliError::MissingCredentials(self.config.host.credentials_path.display().to_string())
        })?;
        self.session
            .get_or_try_init(|| async {
                login_with_retry(self.marketplace.as_ref(), credentials, self.password.as_ref())
                    .await
            })
            .await?;
        info!(username = %credentials.username, "Marketplace session ready");
        Ok(credentials)
    }
}

fn logout_line() -> StatusLine {
    StatusLine::new(
        "Docker",
        "Log out and back in, then re-run this command",
        false,
    )
}
