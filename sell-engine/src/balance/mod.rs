//! Three-way balance reconciliation.
//!
//! A [`Balance`] splits money into the host-wide custodial buffer, the
//! on-chain balance of a wallet, and the sum of its ready payment channels.
//! Amounts stay integral in minor units; conversion to a display currency only
//! happens at presentation time through [`to_display_currency`].
//!
//! The buffer is fetched once per [`ReconcilePass`] and attributed to every
//! balance computed in that pass. Wallet and channel balances are always
//! queried live.

pub mod wallet;

pub use wallet::{ChannelClient, ChannelState, ChannelStatus, Wallet, WalletError, WalletProvider};

use sell_client::{ClientError, MarketplaceApi};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SellConfig;

/// Balance reconciliation errors.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Failed to fetch buffer balance: {0}")]
    Remote(#[from] ClientError),
}

/// Whose balance is being computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BalanceTarget {
    /// A service's own wallet.
    Service(String),
    /// The host (payments server) wallet.
    Host,
}

impl std::fmt::Display for BalanceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service(name) => write!(f, "{name}"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// What happened to the wallet half of a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletStatus {
    /// Wallet derived and queried.
    Live,
    /// No seed phrase configured; the target earns only into the buffer.
    NotConfigured,
    /// A seed phrase is configured but the wallet could not be derived or queried.
    Unavailable(String),
}

/// A reconciled balance, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub buffer: u64,
    pub onchain: u64,
    pub channels: u64,
    pub wallet: WalletStatus,
}

impl Balance {
    /// Balance with only a buffer component.
    #[must_use]
    pub fn buffer_only(buffer: u64, wallet: WalletStatus) -> Self {
        Self {
            buffer,
            onchain: 0,
            channels: 0,
            wallet,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.buffer
            .saturating_add(self.onchain)
            .saturating_add(self.channels)
    }

    /// Display-currency view, or `None` when no rate is available.
    #[must_use]
    pub fn display(&self, rate: Option<ExchangeRate>) -> Option<DisplayBalance> {
        let rate = rate?;
        Some(DisplayBalance {
            buffer: to_display_currency(self.buffer, rate),
            onchain: to_display_currency(self.onchain, rate),
            channels: to_display_currency(self.channels, rate),
            total: to_display_currency(self.total(), rate),
        })
    }
}

/// Display-currency value of one minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate(pub f64);

impl ExchangeRate {
    /// Accept only finite, non-negative rates.
    #[must_use]
    pub fn new(per_unit: f64) -> Option<Self> {
        (per_unit.is_finite() && per_unit >= 0.0).then_some(Self(per_unit))
    }
}

/// Convert an integral amount to the display currency.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_display_currency(amount: u64, rate: ExchangeRate) -> f64 {
    amount as f64 * rate.0
}

/// A balance converted for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayBalance {
    pub buffer: f64,
    pub onchain: f64,
    pub channels: f64,
    pub total: f64,
}

/// Computes balances for services and the host.
pub struct Reconciler {
    marketplace: Arc<dyn MarketplaceApi>,
    wallets: Arc<dyn WalletProvider>,
    service_seeds: HashMap<String, String>,
    host_seed: Option<String>,
}

impl Reconciler {
    /// Create a reconciler with the seed phrases from the manifest.
    pub fn new(
        config: &SellConfig,
        marketplace: Arc<dyn MarketplaceApi>,
        wallets: Arc<dyn WalletProvider>,
    ) -> Self {
        let service_seeds = config
            .services
            .iter()
            .filter_map(|s| {
                s.wallet_mnemonic
                    .as_ref()
                    .map(|seed| (s.name.clone(), seed.clone()))
            })
            .collect();
        Self {
            marketplace,
            wallets,
            service_seeds,
            host_seed: config.host_wallet_mnemonic().map(str::to_string),
        }
    }

    /// Look up the exchange rate. Failures are logged and yield `None`.
    pub async fn exchange_rate(&self) -> Option<ExchangeRate> {
        match self.marketplace.quote_bitcoin_price(1).await {
            Ok(quote) => {
                let rate = ExchangeRate::new(quote.price);
                if rate.is_none() {
                    warn!(price = quote.price, "Ignoring unusable exchange rate");
                }
                rate
            }
            Err(e) => {
                warn!(error = %e, "Exchange rate lookup failed");
                None
            }
        }
    }

    /// Start a reconciliation pass, fetching the buffer balance once.
    ///
    /// # Errors
    ///
    /// Returns an error if the marketplace cannot report the buffer.
    pub async fn begin_pass(&self) -> Result<ReconcilePass<'_>, BalanceError> {
        let summary = self.marketplace.get_earnings().await?;
        debug!(buffer = summary.total_earnings, "Fetched buffer balance");
        Ok(ReconcilePass {
            reconciler: self,
            buffer: summary.total_earnings,
        })
    }

    /// Compute a single balance in its own pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer balance cannot be fetched.
    pub async fn get_balance(&self, target: &BalanceTarget) -> Result<Balance, BalanceError> {
        let pass = self.begin_pass().await?;
        Ok(pass.balance(target).await)
    }

    fn seed_for(&self, target: &BalanceTarget) -> Option<&str> {
        match target {
            BalanceTarget::Service(name) => self
                .service_seeds
                .get(&name.to_lowercase())
                .map(String::as_str),
            BalanceTarget::Host => self.host_seed.as_deref(),
        }
    }
}

/// One reconciliation pass sharing a single buffer reading.
pub struct ReconcilePass<'a> {
    reconciler: &'a Reconciler,
    buffer: u64,
}

impl ReconcilePass<'_> {
    /// Buffer balance attributed to every target in this pass.
    #[must_use]
    pub fn buffer(&self) -> u64 {
        self.buffer
    }

    /// Compute the balance of a target. Wallet problems degrade to zero
    /// on-chain and channel balances.
    pub async fn balance(&self, target: &BalanceTarget) -> Balance {
        let seed = self
            .reconciler
            .seed_for(target)
            .map(str::trim)
            .filter(|seed| !seed.is_empty());
        let Some(seed) = seed else {
            debug!(target = %target, "No wallet configured");
            return Balance::buffer_only(self.buffer, WalletStatus::NotConfigured);
        };

        match self.wallet_balances(seed).await {
            Ok((onchain, channels)) => Balance {
                buffer: self.buffer,
                onchain,
                channels,
                wallet: WalletStatus::Live,
            },
            Err(e) => {
                warn!(target = %target, error = %e, "Wallet unavailable, reporting zero balances");
                Balance::buffer_only(self.buffer, WalletStatus::Unavailable(e.to_string()))
            }
        }
    }

    async fn wallet_balances(&self, seed: &str) -> Result<(u64, u64), WalletError> {
        let wallet = self.reconciler.wallets.import_wallet(seed)?;
        let onchain = wallet.total_balance().await?;

        let mut channels = wallet.channel_client();
        channels.sync().await?;
        let mut ready = 0u64;
        for url in channels.list_channels().await? {
            match channels.status(&url).await {
                Ok(status) if status.state.is_ready() => {
                    ready = ready.saturating_add(status.balance);
                }
                Ok(status) => debug!(url = %url, state = ?status.state, "Skipping channel"),
                Err(e) => warn!(url = %url, error = %e, "Channel status unavailable"),
            }
        }
        Ok((onchain, ready))
    }
}
