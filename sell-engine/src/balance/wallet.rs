//! Wallet and payment-channel collaborator contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Wallet backend errors.
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("Invalid seed phrase: {0}")]
    InvalidMnemonic(String),

    #[error("Wallet backend unavailable: {0}")]
    Unavailable(String),

    #[error("Wallet query failed: {0}")]
    Query(String),

    #[error("Channel query failed for {url}: {reason}")]
    Channel { url: String, reason: String },
}

/// Synchronized state of a payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Opening,
    Ready,
    Closing,
    Closed,
    Disputed,
}

impl ChannelState {
    /// Only ready channels can carry new payments.
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Balance and state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub balance: u64,
    pub state: ChannelState,
}

/// Derives wallets from seed phrases.
pub trait WalletProvider: Send + Sync {
    /// Derive a wallet from a seed phrase.
    fn import_wallet(&self, mnemonic: &str) -> Result<Arc<dyn Wallet>, WalletError>;
}

/// A derived wallet.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Confirmed plus unconfirmed on-chain balance.
    async fn total_balance(&self) -> Result<u64, WalletError>;

    /// Client for the channels funded by this wallet.
    fn channel_client(&self) -> Box<dyn ChannelClient>;
}

/// Payment-channel client bound to one wallet.
#[async_trait]
pub trait ChannelClient: Send {
    /// Refresh channel states from the remote side.
    async fn sync(&mut self) -> Result<(), WalletError>;

    /// URLs of every channel known to the wallet.
    async fn list_channels(&self) -> Result<Vec<String>, WalletError>;

    /// Current balance and state of one channel.
    async fn status(&self, url: &str) -> Result<ChannelStatus, WalletError>;
}
