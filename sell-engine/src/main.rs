//! sell - host monetized services on this machine.
//!
//! This is the main entry point, which:
//! - Loads configuration from TOML
//! - Loads the marketplace identity from the configured credentials file
//! - Wires the host collaborators (compose runtime, shell installer, prompts)
//! - Runs one command and prints one status line per entity

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sell_client::RestClient;
use sell_engine::cli::{App, Cli, Collaborators};
use sell_engine::config::SellConfig;
use sell_engine::credentials::Credentials;
use sell_engine::earnings::SqliteEarningsStore;
use sell_engine::host::{
    ComposeRuntime, DialoguerConfirm, DialoguerPassword, OfflineWallets, ShellInstaller,
};

/// Load configuration from file or use defaults.
fn load_config(path: Option<PathBuf>) -> Result<SellConfig> {
    let config_path = path.unwrap_or_else(|| {
        // Check for config in current directory first
        let local = PathBuf::from("sell.toml");
        if local.exists() {
            return local;
        }

        // Then check XDG config directory
        if let Some(dirs) = directories::ProjectDirs::from("io", "sell", "sell") {
            let xdg_config = dirs.config_dir().join("sell.toml");
            if xdg_config.exists() {
                return xdg_config;
            }
        }

        local
    });

    if !config_path.exists() {
        warn!(
            "No configuration at {}, using defaults",
            config_path.display()
        );
        return Ok(SellConfig::default());
    }

    info!("Loading configuration from {}", config_path.display());
    Ok(SellConfig::load(&config_path)?)
}

fn load_credentials(config: &SellConfig) -> Option<Credentials> {
    match Credentials::load(&config.host.credentials_path) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!(error = %e, "Marketplace credentials unavailable");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.clone()).context("Failed to load configuration")?;
    let credentials = load_credentials(&config);
    let username = credentials
        .as_ref()
        .map(|c| c.username.clone())
        .unwrap_or_default();

    let marketplace = RestClient::new(config.host.marketplace_url.clone(), username)
        .context("Failed to create marketplace client")?;
    let earnings = SqliteEarningsStore::new(&config.earnings.sqlite_path).with_context(|| {
        format!(
            "Failed to open earnings store at {}",
            config.earnings.sqlite_path.display()
        )
    })?;

    let collaborators = Collaborators {
        runtime: Arc::new(ComposeRuntime::from_config(&config.host)),
        installer: Arc::new(ShellInstaller::new()),
        marketplace: Arc::new(marketplace),
        wallets: Arc::new(OfflineWallets),
        earnings: Arc::new(earnings),
        confirm: Arc::new(DialoguerConfirm),
        password: Arc::new(DialoguerPassword),
    };
    let app = App::new(config, credentials, collaborators);

    let lines = app.execute(&cli.command).await?;
    for line in &lines {
        println!("{line}");
    }

    Ok(())
}
