//! Wallet provider used when no wallet backend is linked into the binary.

use std::sync::Arc;

use crate::balance::{Wallet, WalletError, WalletProvider};

/// Rejects every import, so configured wallets report as unavailable and
/// balances fall back to the buffer alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineWallets;

impl WalletProvider for OfflineWallets {
    fn import_wallet(&self, mnemonic: &str) -> Result<Arc<dyn Wallet>, WalletError> {
        let words = mnemonic.split_whitespace().count();
        if !matches!(words, 12 | 15 | 18 | 21 | 24) {
            return Err(WalletError::InvalidMnemonic(format!(
                "expected 12 to 24 words, got {words}"
            )));
        }
        Err(WalletError::Unavailable(
            "no wallet backend in this build".to_string(),
        ))
    }
}
